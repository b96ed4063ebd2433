pub mod commands;
pub mod run;
pub mod workflow;
pub mod agents;
pub mod validate;

pub use commands::{Cli, Commands, LogFormat};

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{self, ConductorConfig};
use crate::errors::ConductorError;

const DEFAULT_CONFIG_FILE: &str = "conductor.yaml";

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl GlobalOptions {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            provider: cli.provider.clone(),
            model: cli.model.clone(),
        }
    }
}

/// Load the configuration named on the command line, `./conductor.yaml` when
/// present, or the defaults. Provider and model flags win over the file.
pub async fn load_config(global: &GlobalOptions) -> Result<ConductorConfig, ConductorError> {
    let mut config = match &global.config {
        Some(path) => config::parse_config(Path::new(path)).await?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            config::parse_config(&PathBuf::from(DEFAULT_CONFIG_FILE)).await?
        }
        None => {
            debug!("No configuration file, using defaults");
            ConductorConfig::default()
        }
    };
    if let Some(provider) = &global.provider {
        config.llm.provider = Some(provider.clone());
    }
    if let Some(model) = &global.model {
        config.llm.model = Some(model.clone());
    }
    Ok(config)
}

/// Parse a `--context`/`--data` argument. Absent means an empty object.
pub fn parse_json_object(arg: Option<&str>, flag: &str) -> Result<Map<String, Value>, ConductorError> {
    let Some(text) = arg else { return Ok(Map::new()) };
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ConductorError::Validation(format!("--{} must be a JSON object", flag))),
        Err(e) => Err(ConductorError::Validation(format!("--{} is not valid JSON: {}", flag, e))),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), ConductorError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Process exit code for an error that ended a command.
pub fn exit_code(error: &ConductorError) -> i32 {
    match error {
        ConductorError::Config(_) => 2,
        ConductorError::Validation(_) | ConductorError::UnknownAgentType(_) => 3,
        ConductorError::NoSuitableAgent(_) => 4,
        ConductorError::CircuitOpen { .. } => 5,
        ConductorError::WorkflowStep { source, .. } => exit_code(source),
        _ => 1,
    }
}
