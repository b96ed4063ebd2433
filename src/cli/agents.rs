use crate::cli::commands::AgentsArgs;
use crate::cli::{load_config, print_json, GlobalOptions};
use crate::dispatch::Dispatcher;
use crate::errors::ConductorError;

pub async fn handle_agents(args: AgentsArgs, global: &GlobalOptions) -> Result<(), ConductorError> {
    let config = load_config(global).await?;
    let dispatcher = Dispatcher::from_config(&config).await?;
    let registry = dispatcher.registry();

    match (&args.agent_type, &args.id) {
        (Some(agent_type), Some(id)) => {
            if !registry.is_registered(agent_type) {
                return Err(ConductorError::UnknownAgentType(agent_type.clone()));
            }
            match registry.load_state(agent_type, id).await {
                Some(record) => print_json(&record),
                None => {
                    println!("No persisted state for {}:{}", agent_type, id);
                    Ok(())
                }
            }
        }
        _ => {
            let health = dispatcher.health().await;
            println!(
                "Store: {} ({})",
                health.store_backend,
                if health.store_reachable { "reachable" } else { "unreachable" }
            );
            println!("{:<12} {:<16} {:<28} DESCRIPTION", "TYPE", "NAME", "CAPABILITIES");
            for descriptor in registry.descriptors() {
                let capabilities = if descriptor.capabilities.is_empty() {
                    "-".to_string()
                } else {
                    descriptor.capabilities.join(",")
                };
                println!(
                    "{:<12} {:<16} {:<28} {}",
                    descriptor.agent_type, descriptor.display_name, capabilities, descriptor.description
                );
            }
            Ok(())
        }
    }
}
