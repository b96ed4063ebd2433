use crate::cli::commands::{RouteArgs, RunArgs};
use crate::cli::{load_config, parse_json_object, print_json, GlobalOptions};
use crate::dispatch::Dispatcher;
use crate::errors::ConductorError;
use tracing::info;

pub async fn handle_run(args: RunArgs, global: &GlobalOptions) -> Result<(), ConductorError> {
    let context = parse_json_object(args.context.as_deref(), "context")?;
    let config = load_config(global).await?;
    let dispatcher = Dispatcher::from_config(&config).await?;

    let run = async {
        match &args.agent_type {
            Some(agent_type) => {
                info!(agent_type = %agent_type, agent_id = %args.agent_id, "Invoking agent directly");
                let result = dispatcher.invoke(agent_type, &args.agent_id, &args.task, &context).await?;
                print_json(&result)
            }
            None => {
                let outcome = dispatcher.dispatch(&args.task, &context).await?;
                print_json(&outcome)
            }
        }
    };

    let result = tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => Err(ConductorError::Cancelled("interrupted".into())),
    };
    dispatcher.close().await;
    result
}

pub async fn handle_route(args: RouteArgs, global: &GlobalOptions) -> Result<(), ConductorError> {
    let context = parse_json_object(args.context.as_deref(), "context")?;
    let config = load_config(global).await?;
    let dispatcher = Dispatcher::from_config(&config).await?;
    let decision = dispatcher.route(&args.task, &context).await?;
    print_json(&decision)
}
