pub mod state;
pub mod config;
pub mod circuit;
pub mod logic;
pub mod agent;
pub mod domain;
pub mod registry;

pub use agent::{Agent, AgentSnapshot, ExecuteOptions, Execution, UpdateGuard, DEFAULT_OPERATION};
pub use circuit::{CircuitBreakerState, CircuitSnapshot};
pub use config::{AgentConfig, MAX_CIRCUIT_RESET_SECS};
pub use domain::{DomainTemplate, PromptAgent, DOMAIN_TEMPLATES};
pub use logic::{AgentLogic, Capability, TaskInvocation};
pub use registry::{AgentBlueprint, AgentConstructor, AgentDescriptor, AgentRegistry, RegistryHealth, STATE_TTL};
pub use state::{AgentIdentity, AgentMetrics, AgentState};
