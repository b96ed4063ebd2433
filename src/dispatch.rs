use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agents::{AgentRegistry, RegistryHealth};
use crate::audit::{JsonlTracer, Tracer};
use crate::config::{ConductorConfig, PersistenceConfig, StoreBackend};
use crate::errors::ConductorError;
use crate::llm::{create_provider, LLMProvider};
use crate::models::TaskResult;
use crate::persistence::{MemoryStore, SqliteStore, StateStore};
use crate::routing::{AgentRouter, RouteDecision};
use crate::workflow::{WorkflowDefinition, WorkflowResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub route: RouteDecision,
    pub result: TaskResult,
}

/// Entry point for callers: routes free-text tasks, invokes agents and runs
/// workflows against one shared registry.
pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    router: AgentRouter,
    tracer: Option<Arc<dyn Tracer>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>, router: AgentRouter) -> Self {
        Self { registry, router, tracer: None }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Wire provider, store, registry, router and tracer from configuration.
    pub async fn from_config(config: &ConductorConfig) -> Result<Self, ConductorError> {
        let llm: Arc<dyn LLMProvider> = Arc::from(create_provider(
            config.llm.provider(),
            config.llm.api_key.as_deref(),
            config.llm.model.as_deref(),
            config.llm.base_url.as_deref(),
        )?);
        Self::from_config_with_provider(config, llm).await
    }

    /// Like [`Dispatcher::from_config`] with an already constructed provider.
    pub async fn from_config_with_provider(
        config: &ConductorConfig,
        llm: Arc<dyn LLMProvider>,
    ) -> Result<Self, ConductorError> {
        let store = open_store(&config.persistence)?;

        let mut registry = AgentRegistry::new(llm.clone(), store)
            .with_state_ttl(config.persistence.ttl())
            .with_base_config(config.agents.agent_config(None));
        for agent_type in config.agents.overrides.keys() {
            registry = registry.with_type_config(agent_type, config.agents.agent_config(Some(agent_type)));
        }
        registry.register_builtin_types(&config.agents.enabled)?;
        let registry = Arc::new(registry);
        registry.init().await;

        let classifier = config.router.use_classifier.then_some(llm);
        let router = AgentRouter::new(registry.clone(), classifier)
            .with_default_agent_type(config.router.default_agent_type.clone());

        let mut dispatcher = Self::new(registry, router);
        if let Some(dir) = config.tracing.as_ref().and_then(|t| t.directory.as_deref()) {
            dispatcher = dispatcher.with_tracer(Arc::new(JsonlTracer::new(dir)));
        }
        Ok(dispatcher)
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &AgentRouter {
        &self.router
    }

    pub async fn route(&self, task: &str, context: &Map<String, Value>) -> Result<RouteDecision, ConductorError> {
        self.router.route(task, context).await
    }

    /// Route the task, then run it on the chosen type's default instance.
    pub async fn dispatch(&self, task: &str, context: &Map<String, Value>) -> Result<DispatchOutcome, ConductorError> {
        let route = self.router.route(task, context).await?;
        info!(agent_type = %route.agent_type, method = ?route.method, "Dispatching task");
        let result = self.invoke(&route.agent_type, "default", task, context).await?;
        Ok(DispatchOutcome { route, result })
    }

    /// Run a task on a specific agent instance and persist its state.
    pub async fn invoke(
        &self,
        agent_type: &str,
        agent_id: &str,
        task: &str,
        context: &Map<String, Value>,
    ) -> Result<TaskResult, ConductorError> {
        let agent = self.registry.get_or_create(agent_type, agent_id).await?;
        let result = agent.process(task, context).await;
        self.registry.save_state(&agent).await;
        result
    }

    pub async fn run_workflow(
        &self,
        definition: &WorkflowDefinition,
        data: Map<String, Value>,
        cancel: CancellationToken,
    ) -> Result<WorkflowResult, ConductorError> {
        let workflow = definition
            .build(self.registry.clone(), self.tracer.clone())?
            .with_cancel_token(cancel);
        let result = workflow.execute(data).await;
        for agent in self.registry.cached_agents() {
            self.registry.save_state(&agent).await;
        }
        if !result.success {
            warn!(workflow = %definition.name, error = ?result.error, "Workflow did not complete");
        }
        Ok(result)
    }

    pub async fn health(&self) -> RegistryHealth {
        self.registry.health().await
    }

    /// Persist every cached agent and empty the cache.
    pub async fn close(&self) {
        self.registry.close().await;
    }
}

fn open_store(config: &PersistenceConfig) -> Result<Option<Arc<dyn StateStore>>, ConductorError> {
    let store: Option<Arc<dyn StateStore>> = match config.backend {
        StoreBackend::Sqlite => {
            let path = config.path.as_deref().unwrap_or(PersistenceConfig::DEFAULT_PATH);
            Some(Arc::new(SqliteStore::open(path)?))
        }
        StoreBackend::Memory => Some(Arc::new(MemoryStore::new())),
        StoreBackend::None => None,
    };
    Ok(store)
}
