use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::ConductorError;
use crate::llm::LLMProvider;
use super::config::AgentConfig;
use super::state::AgentIdentity;

/// Everything one attempt of an agent's task logic can see.
pub struct TaskInvocation<'a> {
    pub task: &'a str,
    pub context: &'a Map<String, Value>,
    pub identity: &'a AgentIdentity,
    pub config: &'a AgentConfig,
    pub llm: &'a dyn LLMProvider,
    /// 1-based attempt number within the current call.
    pub attempt: u32,
}

/// The task logic an agent wraps. Implementations make no retry or
/// breaker decisions; the agent's resilience wrapper owns those.
#[async_trait]
pub trait AgentLogic: Send + Sync {
    async fn run(&self, invocation: &TaskInvocation<'_>) -> Result<Map<String, Value>, ConductorError>;
}

/// A narrow, composable slice of domain behaviour an agent delegates to.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this capability should answer the task.
    fn claims(&self, task: &str) -> bool;

    async fn handle(&self, invocation: &TaskInvocation<'_>) -> Result<Map<String, Value>, ConductorError>;
}
