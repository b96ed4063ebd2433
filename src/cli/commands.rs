use clap::{Args, Parser, Subcommand, ValueEnum};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "conductor", version = VERSION, about = "Dispatch business tasks to resilient LLM-backed agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// YAML configuration file (defaults to ./conductor.yaml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// LLM provider override: anthropic, openai, local, scripted
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// LLM model override
    #[arg(long, global = true)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a task, routed automatically unless an agent type is given
    Run(RunArgs),
    /// Show which agent type a task would be routed to
    Route(RouteArgs),
    /// Run a configured workflow
    Workflow(WorkflowArgs),
    /// List agent types or show an agent's persisted state
    Agents(AgentsArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Task description
    #[arg(short, long)]
    pub task: String,

    /// Skip routing and use this agent type
    #[arg(long)]
    pub agent_type: Option<String>,

    /// Agent instance id
    #[arg(long, default_value = "default")]
    pub agent_id: String,

    /// Context as a JSON object
    #[arg(long)]
    pub context: Option<String>,
}

#[derive(Args, Clone)]
pub struct RouteArgs {
    /// Task description
    #[arg(short, long)]
    pub task: String,

    /// Context as a JSON object
    #[arg(long)]
    pub context: Option<String>,
}

#[derive(Args, Clone)]
pub struct WorkflowArgs {
    /// Name of a workflow from the configuration
    #[arg(short, long, conflicts_with = "file")]
    pub name: Option<String>,

    /// Load the workflow definition from a YAML file instead
    #[arg(short, long)]
    pub file: Option<String>,

    /// Initial workflow data as a JSON object
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Args, Clone)]
pub struct AgentsArgs {
    /// Agent type to inspect
    #[arg(long = "type", requires = "id")]
    pub agent_type: Option<String>,

    /// Agent instance id to inspect
    #[arg(long, requires = "agent_type")]
    pub id: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Configuration file to validate (or pass --config)
    pub path: Option<String>,
}
