use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use regex::Regex;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agents::{AgentRegistry, ExecuteOptions};
use crate::errors::ConductorError;
use super::context::WorkflowContext;

/// What a step's logic gets to see.
pub struct StepInput<'a> {
    pub data: &'a Map<String, Value>,
    pub cancel: &'a CancellationToken,
    pub timeout: Option<Duration>,
}

/// Result of a step's logic. Object-shaped values are merged into the
/// workflow data.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub value: Value,
    pub metadata: Map<String, Value>,
}

impl StepOutput {
    pub fn new(value: Value) -> Self {
        Self { value, metadata: Map::new() }
    }
}

#[async_trait]
pub trait StepLogic: Send + Sync {
    async fn run(&self, input: &StepInput<'_>) -> Result<StepOutput, ConductorError>;
}

/// A named unit of work in a workflow.
pub struct WorkflowStep {
    name: String,
    logic: Box<dyn StepLogic>,
    timeout: Option<Duration>,
}

impl WorkflowStep {
    pub fn new(name: impl Into<String>, logic: impl StepLogic + 'static) -> Self {
        Self {
            name: name.into(),
            logic: Box::new(logic),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run the step against `ctx`, recording its outcome. A failure marks the
    /// record and the context failed and comes back wrapped with the step
    /// name.
    pub async fn execute(
        &self,
        step_id: &str,
        ctx: &mut WorkflowContext,
        cancel: &CancellationToken,
    ) -> Result<(), ConductorError> {
        let index = ctx.begin_step(step_id, &self.name);

        let result = {
            let input = StepInput {
                data: &ctx.data,
                cancel,
                timeout: self.timeout,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ConductorError::Cancelled(format!("step '{}' cancelled", self.name))),
                result = self.logic.run(&input) => result,
            }
        };

        match result {
            Ok(output) => {
                ctx.complete_step(index, output.value, output.metadata);
                Ok(())
            }
            Err(e) => {
                ctx.fail_step(index, &e);
                Err(ConductorError::in_step(&self.name, e))
            }
        }
    }
}

/// Resolves an agent through the registry and runs the interpolated task
/// against it, passing the workflow data as context.
pub struct AgentStep {
    registry: Arc<AgentRegistry>,
    agent_type: String,
    agent_id: String,
    task: String,
    output_key: Option<String>,
}

impl AgentStep {
    pub fn new(registry: Arc<AgentRegistry>, agent_type: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            registry,
            agent_type: agent_type.into(),
            agent_id: "default".to_string(),
            task: task.into(),
            output_key: None,
        }
    }

    pub fn with_agent_id(mut self, id: impl Into<String>) -> Self {
        self.agent_id = id.into();
        self
    }

    /// Store the agent output under `key` instead of merging its fields.
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }
}

#[async_trait]
impl StepLogic for AgentStep {
    async fn run(&self, input: &StepInput<'_>) -> Result<StepOutput, ConductorError> {
        let task = interpolate(&self.task, input.data)?;
        let agent = self.registry.get_or_create(&self.agent_type, &self.agent_id).await?;

        let mut options = ExecuteOptions::default().with_cancel(input.cancel.clone());
        options.timeout = input.timeout;
        debug!(agent = %agent.identity(), "Running agent step");
        let execution = agent.execute_with(&task, input.data, &options).await?;

        let value = match &self.output_key {
            Some(key) => {
                let mut wrapped = Map::new();
                wrapped.insert(key.clone(), Value::Object(execution.output));
                Value::Object(wrapped)
            }
            None => Value::Object(execution.output),
        };
        let mut metadata = Map::new();
        metadata.insert("agent_type".into(), json!(self.agent_type));
        metadata.insert("agent_id".into(), json!(self.agent_id));
        metadata.insert("attempts".into(), json!(execution.attempts));
        metadata.insert("elapsed_ms".into(), json!(execution.elapsed_ms));
        Ok(StepOutput { value, metadata })
    }
}

type StepFn = dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value, ConductorError>> + Send + Sync;

/// Step backed by a closure over a copy of the workflow data.
pub struct FnStep {
    f: Box<StepFn>,
}

impl FnStep {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value, ConductorError>> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl StepLogic for FnStep {
    async fn run(&self, input: &StepInput<'_>) -> Result<StepOutput, ConductorError> {
        let fut = (self.f)(input.data.clone());
        let value = match input.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                ConductorError::Timeout(format!("step exceeded {}ms", limit.as_millis()))
            })??,
            None => fut.await?,
        };
        Ok(StepOutput::new(value))
    }
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex")
});

/// Replace `{key}` placeholders with values from `data`. Strings are inserted
/// verbatim, other values as JSON. A missing key is a validation error.
pub fn interpolate(template: &str, data: &Map<String, Value>) -> Result<String, ConductorError> {
    if let Some(missing) = PLACEHOLDER.captures_iter(template)
        .filter_map(|c| c.get(1))
        .find(|m| !data.contains_key(m.as_str()))
    {
        return Err(ConductorError::Validation(format!(
            "task references missing key '{}'", missing.as_str()
        )));
    }

    Ok(PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
        match data.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }).into_owned())
}
