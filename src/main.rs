use clap::Parser;
use conductor::cli::{self, Cli, Commands, GlobalOptions, LogFormat};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(!cli.no_color)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
    }

    let global = GlobalOptions::from_cli(&cli);
    let result = match cli.command {
        Commands::Run(args) => cli::run::handle_run(args, &global).await,
        Commands::Route(args) => cli::run::handle_route(args, &global).await,
        Commands::Workflow(args) => cli::workflow::handle_workflow(args, &global).await,
        Commands::Agents(args) => cli::agents::handle_agents(args, &global).await,
        Commands::Validate(args) => cli::validate::handle_validate(args, &global).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(cli::exit_code(&e));
    }
}
