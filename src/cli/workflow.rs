use std::path::Path;

use crate::cli::commands::WorkflowArgs;
use crate::cli::{load_config, parse_json_object, print_json, GlobalOptions};
use crate::dispatch::Dispatcher;
use crate::errors::ConductorError;
use crate::workflow::WorkflowDefinition;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn handle_workflow(args: WorkflowArgs, global: &GlobalOptions) -> Result<(), ConductorError> {
    let data = parse_json_object(args.data.as_deref(), "data")?;
    let config = load_config(global).await?;

    let definition = match (&args.name, &args.file) {
        (_, Some(file)) => {
            let text = tokio::fs::read_to_string(Path::new(file)).await?;
            WorkflowDefinition::from_yaml(&text)?
        }
        (Some(name), None) => config.workflow(name).cloned().ok_or_else(|| {
            ConductorError::Validation(format!("no workflow named '{}' in the configuration", name))
        })?,
        (None, None) => {
            return Err(ConductorError::Validation("pass --name or --file".into()));
        }
    };

    let dispatcher = Dispatcher::from_config(&config).await?;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling workflow");
            trigger.cancel();
        }
    });

    info!(workflow = %definition.name, steps = definition.steps.len(), "Running workflow");
    let outcome = dispatcher.run_workflow(&definition, data, cancel).await;
    interrupt.abort();
    dispatcher.close().await;

    let result = outcome?;
    print_json(&result)?;
    if result.success {
        Ok(())
    } else {
        Err(ConductorError::AgentFailure(format!(
            "workflow '{}' failed: {}",
            definition.name,
            result.error.unwrap_or_default()
        )))
    }
}
