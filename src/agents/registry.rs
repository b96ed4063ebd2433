use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::errors::ConductorError;
use crate::llm::LLMProvider;
use crate::persistence::{PersistedAgentState, StateStore};
use super::agent::Agent;
use super::config::AgentConfig;
use super::domain::DOMAIN_TEMPLATES;
use super::logic::AgentLogic;
use super::state::AgentIdentity;

/// Retention window for persisted agent state.
pub const STATE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// What the registry knows about an agent type before any instance exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDescriptor {
    pub agent_type: String,
    pub display_name: String,
    pub description: String,
    pub capabilities: Vec<String>,
}

/// Builds the task logic for one registered agent type.
pub trait AgentConstructor: Send + Sync {
    fn descriptor(&self) -> AgentDescriptor;

    fn build(&self, config: &AgentConfig) -> Result<Box<dyn AgentLogic>, ConductorError>;
}

type LogicFactory = dyn Fn(&AgentConfig) -> Result<Box<dyn AgentLogic>, ConductorError> + Send + Sync;

/// Closure-backed [`AgentConstructor`] for types defined outside this crate.
pub struct AgentBlueprint {
    descriptor: AgentDescriptor,
    factory: Box<LogicFactory>,
}

impl AgentBlueprint {
    pub fn new<F>(agent_type: impl Into<String>, description: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&AgentConfig) -> Result<Box<dyn AgentLogic>, ConductorError> + Send + Sync + 'static,
    {
        let agent_type = agent_type.into();
        Self {
            descriptor: AgentDescriptor {
                display_name: agent_type.clone(),
                agent_type,
                description: description.into(),
                capabilities: Vec::new(),
            },
            factory: Box::new(factory),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.display_name = name.into();
        self
    }
}

impl AgentConstructor for AgentBlueprint {
    fn descriptor(&self) -> AgentDescriptor {
        self.descriptor.clone()
    }

    fn build(&self, config: &AgentConfig) -> Result<Box<dyn AgentLogic>, ConductorError> {
        (self.factory)(config)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryHealth {
    pub store_backend: String,
    pub store_reachable: bool,
    pub cached_agents: usize,
    pub registered_types: Vec<String>,
}

/// Creates, caches and persists agent instances keyed by `(type, id)`.
///
/// Creation is single-writer per key: concurrent callers for the same key all
/// wait on one construction and receive the same instance.
pub struct AgentRegistry {
    constructors: RwLock<BTreeMap<String, Arc<dyn AgentConstructor>>>,
    agents: DashMap<AgentIdentity, Arc<OnceCell<Arc<Agent>>>>,
    llm: Arc<dyn LLMProvider>,
    store: Option<Arc<dyn StateStore>>,
    state_ttl: Duration,
    base_config: Option<AgentConfig>,
    type_configs: HashMap<String, AgentConfig>,
}

impl AgentRegistry {
    pub fn new(llm: Arc<dyn LLMProvider>, store: Option<Arc<dyn StateStore>>) -> Self {
        Self {
            constructors: RwLock::new(BTreeMap::new()),
            agents: DashMap::new(),
            llm,
            store,
            state_ttl: STATE_TTL,
            base_config: None,
            type_configs: HashMap::new(),
        }
    }

    /// Registry with every built-in domain type registered.
    pub fn with_builtin_types(
        llm: Arc<dyn LLMProvider>,
        store: Option<Arc<dyn StateStore>>,
    ) -> Result<Self, ConductorError> {
        let registry = Self::new(llm, store);
        registry.register_builtin_types(&[])?;
        Ok(registry)
    }

    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Template every default config starts from. The id and name are
    /// replaced per instance.
    pub fn with_base_config(mut self, config: AgentConfig) -> Self {
        self.base_config = Some(config);
        self
    }

    pub fn with_type_config(mut self, agent_type: impl Into<String>, config: AgentConfig) -> Self {
        self.type_configs.insert(agent_type.into(), config);
        self
    }

    /// Register the built-in domain types. An empty `only` registers all.
    pub fn register_builtin_types(&self, only: &[String]) -> Result<(), ConductorError> {
        for name in only {
            if !DOMAIN_TEMPLATES.iter().any(|t| t.agent_type == name.as_str()) {
                return Err(ConductorError::UnknownAgentType(name.clone()));
            }
        }
        for template in DOMAIN_TEMPLATES {
            if only.is_empty() || only.iter().any(|n| n == template.agent_type) {
                self.register_type(Arc::new(*template))?;
            }
        }
        Ok(())
    }

    /// Add an agent type. The constructor must describe itself with a valid
    /// type name and description and must build logic from a default config.
    pub fn register_type(&self, constructor: Arc<dyn AgentConstructor>) -> Result<(), ConductorError> {
        let descriptor = constructor.descriptor();
        let name = descriptor.agent_type.as_str();

        let valid_name = name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
            && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid_name {
            return Err(ConductorError::Validation(format!(
                "agent type '{}' must be lowercase alphanumeric with '-' or '_'", name
            )));
        }
        if descriptor.description.trim().is_empty() {
            return Err(ConductorError::Validation(format!("agent type '{}' has no description", name)));
        }
        if let Err(e) = constructor.build(&AgentConfig::new("probe", &descriptor.display_name)) {
            return Err(ConductorError::Validation(format!(
                "agent type '{}' cannot build its logic: {}", name, e
            )));
        }

        let mut constructors = self.constructors.write();
        if constructors.contains_key(name) {
            return Err(ConductorError::Validation(format!("agent type '{}' is already registered", name)));
        }
        constructors.insert(name.to_string(), constructor);
        debug!(agent_type = %name, "Registered agent type");
        Ok(())
    }

    pub fn is_registered(&self, agent_type: &str) -> bool {
        self.constructors.read().contains_key(agent_type)
    }

    /// Registered type names, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }

    pub fn descriptor(&self, agent_type: &str) -> Option<AgentDescriptor> {
        self.constructors.read().get(agent_type).map(|c| c.descriptor())
    }

    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.constructors.read().values().map(|c| c.descriptor()).collect()
    }

    fn constructor(&self, agent_type: &str) -> Result<Arc<dyn AgentConstructor>, ConductorError> {
        self.constructors.read().get(agent_type).cloned()
            .ok_or_else(|| ConductorError::UnknownAgentType(agent_type.to_string()))
    }

    /// Config used when `create_agent` is called without one.
    pub fn default_config(&self, agent_type: &str, id: &str) -> AgentConfig {
        let display_name = self.descriptor(agent_type)
            .map(|d| d.display_name)
            .unwrap_or_else(|| agent_type.to_string());
        let mut config = self.type_configs.get(agent_type)
            .or(self.base_config.as_ref())
            .cloned()
            .unwrap_or_else(|| AgentConfig::new(id, &display_name));
        config.id = id.to_string();
        if config.name.trim().is_empty() {
            config.name = display_name;
        }
        config
    }

    /// Return the cached instance for `(agent_type, id)` or construct one,
    /// restoring persisted state when a record exists. `config` is ignored
    /// when the instance already exists.
    pub async fn create_agent(
        &self,
        agent_type: &str,
        id: &str,
        config: Option<AgentConfig>,
    ) -> Result<Arc<Agent>, ConductorError> {
        let constructor = self.constructor(agent_type)?;
        if id.trim().is_empty() {
            return Err(ConductorError::Validation("agent id must not be empty".into()));
        }

        let identity = AgentIdentity::new(agent_type, id);
        let cell = self.agents
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        let result = cell
            .get_or_try_init(|| self.construct(constructor, identity.clone(), config))
            .await
            .cloned();
        if result.is_err() {
            self.agents.remove_if(&identity, |_, c| Arc::ptr_eq(c, &cell) && !c.initialized());
        }
        result
    }

    pub fn get_agent(&self, agent_type: &str, id: &str) -> Option<Arc<Agent>> {
        self.agents
            .get(&AgentIdentity::new(agent_type, id))
            .and_then(|cell| cell.get().cloned())
    }

    pub async fn get_or_create(&self, agent_type: &str, id: &str) -> Result<Arc<Agent>, ConductorError> {
        if let Some(agent) = self.get_agent(agent_type, id) {
            return Ok(agent);
        }
        self.create_agent(agent_type, id, None).await
    }

    /// Every fully constructed cached instance.
    pub fn cached_agents(&self) -> Vec<Arc<Agent>> {
        self.agents.iter().filter_map(|entry| entry.value().get().cloned()).collect()
    }

    async fn construct(
        &self,
        constructor: Arc<dyn AgentConstructor>,
        identity: AgentIdentity,
        config: Option<AgentConfig>,
    ) -> Result<Arc<Agent>, ConductorError> {
        let defaults = config
            .unwrap_or_else(|| self.default_config(&identity.agent_type, &identity.instance_id));
        defaults.validate()?;

        let persisted = self.load_state(&identity.agent_type, &identity.instance_id).await;
        let config = match persisted.as_ref() {
            Some(record) => {
                let merged = defaults.merged_with_persisted(&record.config);
                match merged.validate() {
                    Ok(()) => merged,
                    Err(e) => {
                        warn!(agent = %identity, error = %e, "Persisted config invalid, using defaults");
                        defaults
                    }
                }
            }
            None => defaults,
        };

        let logic = constructor.build(&config)?;
        let agent = Agent::new(identity, config, logic, self.llm.clone());
        match persisted {
            Some(record) => {
                agent.restore(record.state, record.metrics);
                info!(agent = %agent.identity(), last_updated = %record.last_updated, "Restored agent state");
            }
            None => info!(agent = %agent.identity(), "Created agent"),
        }
        Ok(Arc::new(agent))
    }

    /// Read the persisted record for `(agent_type, id)`. Store failures and
    /// unreadable records are logged and read as absent.
    pub async fn load_state(&self, agent_type: &str, id: &str) -> Option<PersistedAgentState> {
        let store = self.store.as_ref()?;
        let key = AgentIdentity::new(agent_type, id).store_key();

        let bytes = match store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to load agent state");
                return None;
            }
        };

        match PersistedAgentState::from_bytes(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable agent state");
                None
            }
        }
    }

    /// Persist the agent's state, metrics and redacted config. Returns false
    /// instead of failing when there is no store or the store errors.
    pub async fn save_state(&self, agent: &Agent) -> bool {
        let Some(store) = self.store.as_ref() else {
            debug!(agent = %agent.identity(), "No state store configured, skipping save");
            return false;
        };

        let snapshot = agent.snapshot();
        let record = PersistedAgentState::new(
            agent.id(),
            agent.agent_type(),
            snapshot.state,
            snapshot.metrics,
            agent.config(),
        );
        let key = agent.identity().store_key();

        let bytes = match record.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize agent state");
                return false;
            }
        };

        match store.set(&key, bytes, self.state_ttl).await {
            Ok(()) => {
                debug!(key = %key, "Saved agent state");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to save agent state");
                false
            }
        }
    }

    /// Persist every cached instance, then drop it from the cache. Returns how
    /// many saves succeeded. Entries still under construction are left alone.
    pub async fn clear_all(&self) -> usize {
        let agents = self.cached_agents();
        let mut saved = 0;
        for agent in &agents {
            if self.save_state(agent).await {
                saved += 1;
            }
            self.agents.remove_if(agent.identity(), |_, cell| {
                cell.get().is_some_and(|cached| Arc::ptr_eq(cached, agent))
            });
        }
        info!(cached = agents.len(), saved, "Cleared agent cache");
        saved
    }

    pub async fn init(&self) -> RegistryHealth {
        let health = self.health().await;
        if self.store.is_some() && !health.store_reachable {
            warn!(backend = %health.store_backend, "State store unreachable, persistence will be skipped");
        } else {
            info!(
                backend = %health.store_backend,
                types = health.registered_types.len(),
                "Agent registry ready"
            );
        }
        health
    }

    pub async fn close(&self) {
        self.clear_all().await;
    }

    pub async fn health(&self) -> RegistryHealth {
        let (store_backend, store_reachable) = match &self.store {
            Some(store) => (store.backend_name().to_string(), store.ping().await),
            None => ("none".to_string(), false),
        };
        RegistryHealth {
            store_backend,
            store_reachable,
            cached_agents: self.agents.iter().filter(|e| e.value().initialized()).count(),
            registered_types: self.registered_types(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentMetrics, AgentState, TaskInvocation};
    use crate::llm::ScriptedProvider;
    use crate::persistence::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoLogic;

    #[async_trait]
    impl AgentLogic for EchoLogic {
        async fn run(&self, invocation: &TaskInvocation<'_>) -> Result<Map<String, Value>, ConductorError> {
            let mut out = Map::new();
            out.insert("echo".into(), Value::String(invocation.task.to_string()));
            Ok(out)
        }
    }

    fn registry(store: Option<Arc<dyn StateStore>>) -> AgentRegistry {
        AgentRegistry::with_builtin_types(Arc::new(ScriptedProvider::new()), store).unwrap()
    }

    fn memory_registry() -> (AgentRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (registry(Some(store.clone())), store)
    }

    #[tokio::test]
    async fn test_unknown_type_rejected() {
        let (reg, _) = memory_registry();
        let err = reg.create_agent("legal", "l1", None).await.err().unwrap();
        assert!(matches!(err, ConductorError::UnknownAgentType(t) if t == "legal"));
    }

    #[tokio::test]
    async fn test_create_then_get_returns_same_instance() {
        let (reg, _) = memory_registry();
        let created = reg.create_agent("sales", "s1", None).await.unwrap();
        let fetched = reg.get_agent("sales", "s1").unwrap();
        assert!(Arc::ptr_eq(&created, &fetched));
        assert!(reg.get_agent("sales", "s2").is_none());
    }

    #[tokio::test]
    async fn test_create_is_idempotent_and_keeps_first_config() {
        let (reg, _) = memory_registry();
        let mut first = AgentConfig::new("s1", "First");
        first.circuit_breaker_threshold = 7;
        let a = reg.create_agent("sales", "s1", Some(first)).await.unwrap();
        let b = reg.create_agent("sales", "s1", Some(AgentConfig::new("s1", "Second"))).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().name, "First");
        assert_eq!(b.config().circuit_breaker_threshold, 7);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_builds_once() {
        let builds = Arc::new(AtomicU32::new(0));
        let counter = builds.clone();
        let reg = Arc::new(AgentRegistry::new(Arc::new(ScriptedProvider::new()), None));
        reg.register_type(Arc::new(AgentBlueprint::new("echo", "Echoes tasks", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(EchoLogic) as Box<dyn AgentLogic>)
        }))).unwrap();
        // One build for the registration probe.
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move { reg.get_or_create("echo", "shared").await.unwrap() }));
        }
        let mut agents = Vec::new();
        for h in handles {
            agents.push(h.await.unwrap());
        }

        assert!(agents.iter().all(|a| Arc::ptr_eq(a, &agents[0])));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_save_and_restore_round_trip() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let first = registry(Some(store.clone()));
        let agent = first.create_agent("finance", "f1", None).await.unwrap();
        agent.execute("reconcile March", &Map::new()).await.unwrap();
        let before = agent.snapshot();
        assert!(first.save_state(&agent).await);

        let second = registry(Some(store));
        let restored = second.create_agent("finance", "f1", None).await.unwrap();
        let after = restored.snapshot();
        assert_eq!(after.state, before.state);
        assert_eq!(after.metrics, before.metrics);
        assert_eq!(after.metrics.success_count, 1);
    }

    #[tokio::test]
    async fn test_persisted_config_overlays_defaults() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let first = registry(Some(store.clone()));
        let mut tuned = AgentConfig::new("h1", "HR tuned");
        tuned.circuit_breaker_threshold = 9;
        let agent = first.create_agent("hr", "h1", Some(tuned)).await.unwrap();
        assert!(first.save_state(&agent).await);

        let second = registry(Some(store));
        let restored = second.create_agent("hr", "h1", None).await.unwrap();
        assert_eq!(restored.config().name, "HR tuned");
        assert_eq!(restored.config().circuit_breaker_threshold, 9);
    }

    #[tokio::test]
    async fn test_clear_all_persists_then_empties() {
        let (reg, store) = memory_registry();
        reg.create_agent("sales", "s1", None).await.unwrap();
        reg.create_agent("support", "default", None).await.unwrap();

        assert_eq!(reg.clear_all().await, 2);
        assert!(reg.get_agent("sales", "s1").is_none());
        assert_eq!(store.len(), 2);
        assert!(reg.load_state("sales", "s1").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_construction_leaves_no_entry() {
        let (reg, _) = memory_registry();
        let mut bad = AgentConfig::new("s1", "Sales");
        bad.circuit_breaker_threshold = 0;
        assert!(matches!(
            reg.create_agent("sales", "s1", Some(bad)).await,
            Err(ConductorError::Validation(_))
        ));
        assert!(!reg.agents.contains_key(&AgentIdentity::new("sales", "s1")));

        let agent = reg.create_agent("sales", "s1", None).await.unwrap();
        assert!(Arc::ptr_eq(&agent, &reg.get_agent("sales", "s1").unwrap()));
    }

    #[tokio::test]
    async fn test_clear_all_keeps_pending_entries() {
        let (reg, _) = memory_registry();
        reg.create_agent("sales", "s1", None).await.unwrap();
        let pending = AgentIdentity::new("sales", "pending");
        reg.agents.insert(pending.clone(), Arc::new(OnceCell::new()));

        assert_eq!(reg.clear_all().await, 1);
        assert!(reg.get_agent("sales", "s1").is_none());
        assert!(reg.agents.contains_key(&pending));
    }

    #[tokio::test]
    async fn test_save_soft_fails_when_store_down() {
        let (reg, store) = memory_registry();
        let agent = reg.create_agent("sales", "s1", None).await.unwrap();
        store.set_available(false);
        assert!(!reg.save_state(&agent).await);
        assert!(reg.load_state("sales", "s1").await.is_none());

        // Creation still works without the store.
        assert!(reg.create_agent("sales", "s2", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_no_store_makes_persistence_a_noop() {
        let reg = registry(None);
        let agent = reg.create_agent("sales", "s1", None).await.unwrap();
        assert!(!reg.save_state(&agent).await);
        let health = reg.health().await;
        assert_eq!(health.store_backend, "none");
        assert!(!health.store_reachable);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_ignored() {
        let (reg, store) = memory_registry();
        store.set("agent:sales:s1", b"{not json".to_vec(), STATE_TTL).await.unwrap();
        let agent = reg.create_agent("sales", "s1", None).await.unwrap();
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.metrics(), AgentMetrics::default());
    }

    #[test]
    fn test_register_type_contract_checks() {
        fn echo(_: &AgentConfig) -> Result<Box<dyn AgentLogic>, ConductorError> {
            Ok(Box::new(EchoLogic))
        }
        let reg = AgentRegistry::new(Arc::new(ScriptedProvider::new()), None);

        assert!(reg.register_type(Arc::new(AgentBlueprint::new("Bad Name", "x", echo)))
            .is_err());
        assert!(reg.register_type(Arc::new(AgentBlueprint::new("legal", "  ", echo)))
            .is_err());
        assert!(reg.register_type(Arc::new(AgentBlueprint::new("broken", "Always fails", |_| {
            Err(ConductorError::Internal("no model".into()))
        }))).is_err());

        reg.register_type(Arc::new(AgentBlueprint::new("legal", "Contracts", echo))).unwrap();
        let dup = reg.register_type(Arc::new(AgentBlueprint::new("legal", "Contracts", echo)));
        assert!(matches!(dup, Err(ConductorError::Validation(_))));
        assert_eq!(reg.registered_types(), vec!["legal"]);
    }

    #[test]
    fn test_register_subset_of_builtins() {
        let reg = AgentRegistry::new(Arc::new(ScriptedProvider::new()), None);
        reg.register_builtin_types(&["finance".to_string(), "hr".to_string()]).unwrap();
        assert_eq!(reg.registered_types(), vec!["finance", "hr"]);
        assert!(reg.register_builtin_types(&["legal".to_string()]).is_err());
    }

    #[test]
    fn test_default_config_uses_type_template() {
        let mut finance = AgentConfig::new("ignored", "");
        finance.retry_max_attempts = 5;
        let reg = registry(None).with_type_config("finance", finance);

        let config = reg.default_config("finance", "f9");
        assert_eq!(config.id, "f9");
        assert_eq!(config.name, "Finance agent");
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(reg.default_config("sales", "s1").retry_max_attempts, 3);
    }

    #[tokio::test]
    async fn test_health_reports_cache_and_types() {
        let (reg, _) = memory_registry();
        reg.create_agent("sales", "s1", None).await.unwrap();
        let health = reg.init().await;
        assert_eq!(health.store_backend, "memory");
        assert!(health.store_reachable);
        assert_eq!(health.cached_agents, 1);
        assert_eq!(health.registered_types.len(), 6);
    }
}
