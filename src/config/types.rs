use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agents::AgentConfig;
use crate::llm::GenerationOptions;
use crate::workflow::WorkflowDefinition;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ConductorConfig {
    #[serde(default)]
    pub llm: LLMConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub router: RouterConfig,
    pub tracing: Option<TracingConfig>,
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}

impl ConductorConfig {
    pub fn workflow(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.iter().find(|w| w.name == name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LLMConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl LLMConfig {
    pub const DEFAULT_PROVIDER: &'static str = "anthropic";

    pub fn provider(&self) -> &str {
        self.provider.as_deref().unwrap_or(Self::DEFAULT_PROVIDER)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
    /// Per-type settings laid over `defaults`.
    #[serde(default)]
    pub overrides: BTreeMap<String, AgentOverrides>,
    /// Built-in types to register. Empty registers all of them.
    #[serde(default)]
    pub enabled: Vec<String>,
}

impl AgentsConfig {
    /// Template config for `agent_type`, defaults with the type's overrides
    /// applied. The id is filled in per instance.
    pub fn agent_config(&self, agent_type: Option<&str>) -> AgentConfig {
        let mut config = AgentConfig::new("", "");
        self.defaults.apply(&mut config);
        if let Some(over) = agent_type.and_then(|t| self.overrides.get(t)) {
            over.apply(&mut config);
        }
        config
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AgentDefaults {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub llm: GenerationOptions,
}

impl AgentDefaults {
    fn apply(&self, config: &mut AgentConfig) {
        config.retry_max_attempts = self.retry.max_attempts;
        config.retry_base_delay_ms = self.retry.base_delay_ms;
        config.retry_max_delay_ms = self.retry.max_delay_ms;
        config.circuit_breaker_threshold = self.circuit_breaker.threshold;
        config.circuit_breaker_reset_secs = self.circuit_breaker.reset_secs;
        config.llm = self.llm.clone();
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 500 }
fn default_max_delay_ms() -> u64 { 10_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(default = "default_reset_secs")]
    pub reset_secs: f64,
}

fn default_threshold() -> u32 { 5 }
fn default_reset_secs() -> f64 { 60.0 }

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { threshold: default_threshold(), reset_secs: default_reset_secs() }
    }
}

/// Partial agent settings; unset fields keep the defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AgentOverrides {
    pub role: Option<String>,
    pub goal: Option<String>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub circuit_breaker_threshold: Option<u32>,
    pub circuit_breaker_reset_secs: Option<f64>,
    pub llm: Option<GenerationOptions>,
}

impl AgentOverrides {
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(role) = &self.role {
            config.role = role.clone();
        }
        if let Some(goal) = &self.goal {
            config.goal = goal.clone();
        }
        if let Some(v) = self.max_attempts {
            config.retry_max_attempts = v;
        }
        if let Some(v) = self.base_delay_ms {
            config.retry_base_delay_ms = v;
        }
        if let Some(v) = self.max_delay_ms {
            config.retry_max_delay_ms = v;
        }
        if let Some(v) = self.circuit_breaker_threshold {
            config.circuit_breaker_threshold = v;
        }
        if let Some(v) = self.circuit_breaker_reset_secs {
            config.circuit_breaker_reset_secs = v;
        }
        if let Some(llm) = &self.llm {
            config.llm = llm.or(&config.llm);
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    #[default]
    Memory,
    None,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Memory => "memory",
            StoreBackend::None => "none",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    pub path: Option<String>,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
}

fn default_ttl_days() -> u64 { 7 }

impl PersistenceConfig {
    pub const DEFAULT_PATH: &'static str = "./conductor-state.db";
    pub const MAX_TTL_DAYS: u64 = 3650;

    /// Lifetime of persisted agent records, clamped to `1..=MAX_TTL_DAYS` days.
    pub fn ttl(&self) -> Duration {
        let days = self.ttl_days.clamp(1, Self::MAX_TTL_DAYS);
        Duration::from_secs(days * 24 * 60 * 60)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { backend: StoreBackend::default(), path: None, ttl_days: default_ttl_days() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    #[serde(default = "default_agent_type")]
    pub default_agent_type: Option<String>,
    #[serde(default = "default_use_classifier")]
    pub use_classifier: bool,
}

fn default_agent_type() -> Option<String> { Some("support".to_string()) }
fn default_use_classifier() -> bool { true }

impl Default for RouterConfig {
    fn default() -> Self {
        Self { default_agent_type: default_agent_type(), use_classifier: default_use_classifier() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TracingConfig {
    pub directory: Option<String>,
}
