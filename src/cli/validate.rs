use std::path::PathBuf;

use crate::cli::commands::ValidateArgs;
use crate::cli::GlobalOptions;
use crate::config;
use crate::errors::ConductorError;

pub async fn handle_validate(args: ValidateArgs, global: &GlobalOptions) -> Result<(), ConductorError> {
    let path = args.path.or_else(|| global.config.clone())
        .ok_or_else(|| ConductorError::Config("pass a configuration file to validate".into()))?;
    let config = config::parse_config(&PathBuf::from(&path)).await?;
    println!(
        "Configuration is valid: {} ({} workflow(s), persistence: {})",
        path,
        config.workflows.len(),
        config.persistence.backend
    );
    Ok(())
}
