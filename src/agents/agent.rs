use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{with_retry, ConductorError};
use crate::llm::LLMProvider;
use crate::models::TaskResult;
use super::circuit::{CircuitBreakerState, CircuitSnapshot};
use super::config::AgentConfig;
use super::logic::{AgentLogic, TaskInvocation};
use super::state::{AgentIdentity, AgentMetrics, AgentState};

/// Breaker key used when the caller names no operation.
pub const DEFAULT_OPERATION: &str = "execute";

/// Per-call execution controls.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub operation: Option<String>,
    /// Limit applied to each attempt. Exceeding it is a transient failure.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl ExecuteOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn operation(&self) -> &str {
        self.operation.as_deref().unwrap_or(DEFAULT_OPERATION)
    }
}

/// A successful call through the resilience wrapper.
#[derive(Debug, Clone)]
pub struct Execution {
    pub output: Map<String, Value>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Consistent point-in-time view of an agent's state, metrics and breakers.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub identity: AgentIdentity,
    pub state: AgentState,
    pub metrics: AgentMetrics,
    pub last_error: Option<String>,
    pub in_flight: u32,
    pub circuits: Vec<CircuitSnapshot>,
}

struct AgentInner {
    state: AgentState,
    metrics: AgentMetrics,
    last_error: Option<String>,
    in_flight: u32,
    circuits: HashMap<String, CircuitBreakerState>,
}

/// Outcome of one call, whether or not the task logic succeeded.
struct CallOutcome {
    result: Result<Map<String, Value>, ConductorError>,
    attempts: u32,
    elapsed: Duration,
}

/// A stateful worker wrapping task logic with retry, circuit breaking and a
/// scoped `Processing` transition.
pub struct Agent {
    identity: AgentIdentity,
    config: AgentConfig,
    logic: Box<dyn AgentLogic>,
    llm: Arc<dyn LLMProvider>,
    inner: Mutex<AgentInner>,
}

impl Agent {
    pub fn new(
        identity: AgentIdentity,
        config: AgentConfig,
        logic: Box<dyn AgentLogic>,
        llm: Arc<dyn LLMProvider>,
    ) -> Self {
        Self {
            identity,
            config,
            logic,
            llm,
            inner: Mutex::new(AgentInner {
                state: AgentState::Idle,
                metrics: AgentMetrics::default(),
                last_error: None,
                in_flight: 0,
                circuits: HashMap::new(),
            }),
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn agent_type(&self) -> &str {
        &self.identity.agent_type
    }

    pub fn id(&self) -> &str {
        &self.identity.instance_id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> AgentState {
        self.inner.lock().state
    }

    pub fn metrics(&self) -> AgentMetrics {
        self.inner.lock().metrics.clone()
    }

    /// Read state, metrics and breakers in one lock acquisition. Never waits
    /// on a running task: the lock is only held for bookkeeping.
    pub fn snapshot(&self) -> AgentSnapshot {
        let inner = self.inner.lock();
        let reset = self.config.circuit_reset();
        let mut circuits: Vec<CircuitSnapshot> = inner.circuits.iter()
            .map(|(op, cb)| cb.snapshot(op, reset))
            .collect();
        circuits.sort_by(|a, b| a.operation.cmp(&b.operation));
        AgentSnapshot {
            identity: self.identity.clone(),
            state: inner.state,
            metrics: inner.metrics.clone(),
            last_error: inner.last_error.clone(),
            in_flight: inner.in_flight,
            circuits,
        }
    }

    /// Seed a freshly constructed agent from persisted state. A record saved
    /// mid-task comes back `Idle`: no task survives a restart.
    pub(crate) fn restore(&self, state: AgentState, metrics: AgentMetrics) {
        let mut inner = self.inner.lock();
        inner.state = match state {
            AgentState::Error => AgentState::Error,
            _ => AgentState::Idle,
        };
        inner.metrics = metrics;
    }

    pub async fn execute(
        &self,
        task: &str,
        context: &Map<String, Value>,
    ) -> Result<Execution, ConductorError> {
        self.execute_with(task, context, &ExecuteOptions::default()).await
    }

    /// Run the task logic through the resilience wrapper and surface the final
    /// error, if any, to the caller.
    pub async fn execute_with(
        &self,
        task: &str,
        context: &Map<String, Value>,
        options: &ExecuteOptions,
    ) -> Result<Execution, ConductorError> {
        let outcome = self.call(task, context, options).await?;
        outcome.result.map(|output| Execution {
            output,
            attempts: outcome.attempts,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
        })
    }

    pub async fn process(
        &self,
        task: &str,
        context: &Map<String, Value>,
    ) -> Result<TaskResult, ConductorError> {
        self.process_with(task, context, &ExecuteOptions::default()).await
    }

    /// Task invocation contract: agent-level failures are folded into the
    /// returned [`TaskResult`]; circuit-open, validation and cancellation
    /// errors are raised.
    pub async fn process_with(
        &self,
        task: &str,
        context: &Map<String, Value>,
        options: &ExecuteOptions,
    ) -> Result<TaskResult, ConductorError> {
        let outcome = self.call(task, context, options).await?;
        let elapsed_ms = outcome.elapsed.as_millis() as u64;
        let metadata = self.result_metadata(options.operation(), outcome.attempts);
        match outcome.result {
            Ok(output) => Ok(TaskResult::succeeded(output, metadata, elapsed_ms)),
            Err(e) if e.is_raised_directly() => Err(e),
            Err(e) => Ok(TaskResult::failed(e.to_string(), metadata, elapsed_ms)),
        }
    }

    async fn call(
        &self,
        task: &str,
        context: &Map<String, Value>,
        options: &ExecuteOptions,
    ) -> Result<CallOutcome, ConductorError> {
        let operation = options.operation();
        let guard = self.enter(operation)?;
        debug!(agent = %self.identity, operation, "Task started");

        let label = format!("{}/{}", self.identity, operation);
        let policy = self.config.retry_policy();
        let outcome = with_retry(&label, &policy, |attempt| {
            self.attempt(task, context, options, attempt)
        }).await;

        let elapsed = guard.started.elapsed();
        match &outcome.result {
            Ok(_) => {
                guard.succeed();
                info!(
                    agent = %self.identity,
                    operation,
                    attempts = outcome.attempts,
                    duration_ms = elapsed.as_millis() as u64,
                    "Task completed"
                );
            }
            Err(e) => {
                guard.fail(e);
                warn!(
                    agent = %self.identity,
                    operation,
                    attempts = outcome.attempts,
                    error = %e,
                    "Task failed"
                );
            }
        }

        Ok(CallOutcome {
            result: outcome.result,
            attempts: outcome.attempts,
            elapsed,
        })
    }

    async fn attempt(
        &self,
        task: &str,
        context: &Map<String, Value>,
        options: &ExecuteOptions,
        attempt: u32,
    ) -> Result<Map<String, Value>, ConductorError> {
        if options.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(ConductorError::Cancelled(format!("{} cancelled before attempt {}", self.identity, attempt)));
        }

        let invocation = TaskInvocation {
            task,
            context,
            identity: &self.identity,
            config: &self.config,
            llm: self.llm.as_ref(),
            attempt,
        };
        let run = self.logic.run(&invocation);
        let timed = async {
            match options.timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                    ConductorError::Timeout(format!("{} exceeded {}ms", self.identity, limit.as_millis()))
                })?,
                None => run.await,
            }
        };

        match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ConductorError::Cancelled(format!("{} cancelled during attempt {}", self.identity, attempt))),
                result = timed => result,
            },
            None => timed.await,
        }
    }

    /// Fail fast on an open breaker, then move into `Processing`. A call let
    /// through a half-open breaker holds its trial slot until it finishes.
    fn enter(&self, operation: &str) -> Result<ProcessingGuard<'_>, ConductorError> {
        let mut inner = self.inner.lock();

        if let Some(cb) = inner.circuits.get(operation) {
            if let Err(retry_after) = cb.check(self.config.circuit_reset()) {
                debug!(agent = %self.identity, operation, retry_after_ms = retry_after.as_millis() as u64, "Circuit open, rejecting call");
                return Err(ConductorError::CircuitOpen {
                    agent: self.identity.to_string(),
                    operation: operation.to_string(),
                    retry_after,
                });
            }
        }

        match inner.state {
            AgentState::Processing => {}
            current if current.can_transition_to(AgentState::Processing) => {
                inner.state = AgentState::Processing;
            }
            current => {
                return Err(ConductorError::InvalidTransition(format!(
                    "{} cannot start a task while {}",
                    self.identity, current
                )));
            }
        }
        inner.in_flight += 1;
        let trial = inner.circuits.get_mut(operation).is_some_and(|cb| cb.begin_trial());
        if trial {
            debug!(agent = %self.identity, operation, "Circuit half-open, letting one trial call through");
        }

        Ok(ProcessingGuard {
            agent: self,
            operation: operation.to_string(),
            started: Instant::now(),
            trial,
            finished: false,
        })
    }

    fn release(&self, operation: &str, trial: bool, error: Option<&ConductorError>, elapsed: Duration) {
        let mut inner = self.inner.lock();
        let threshold = self.config.circuit_breaker_threshold;
        if trial {
            if let Some(cb) = inner.circuits.get_mut(operation) {
                cb.end_trial();
            }
        }

        match error {
            None => {
                inner.metrics.record_success(elapsed.as_secs_f64() * 1000.0);
                inner.circuits.entry(operation.to_string()).or_default().record_success();
            }
            Some(e) => {
                inner.metrics.record_failure();
                inner.last_error = Some(e.to_string());
                // A cancelled call says nothing about the health of the agent.
                if !matches!(e, ConductorError::Cancelled(_)) {
                    let opened = inner.circuits.entry(operation.to_string()).or_default().record_failure(threshold);
                    if opened {
                        warn!(agent = %self.identity, operation, threshold, "Circuit breaker opened");
                    }
                }
            }
        }

        inner.in_flight = inner.in_flight.saturating_sub(1);
        if inner.in_flight == 0 {
            let next = if error.is_none() { AgentState::Idle } else { AgentState::Error };
            if inner.state.can_transition_to(next) {
                inner.state = next;
            }
        }
    }

    fn result_metadata(&self, operation: &str, attempts: u32) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("agent_id".into(), json!(self.identity.instance_id));
        metadata.insert("agent_type".into(), json!(self.identity.agent_type));
        metadata.insert("operation".into(), json!(operation));
        metadata.insert("attempts".into(), json!(attempts));
        metadata.insert("state".into(), json!(self.state().as_str()));
        metadata
    }

    /// Enter the administrative `Updating` state. Only possible while no task
    /// is running; the agent returns to `Idle` when the guard drops.
    pub fn begin_update(&self) -> Result<UpdateGuard<'_>, ConductorError> {
        let mut inner = self.inner.lock();
        if !inner.state.can_transition_to(AgentState::Updating) {
            return Err(ConductorError::InvalidTransition(format!(
                "{} cannot enter updating while {}",
                self.identity, inner.state
            )));
        }
        inner.state = AgentState::Updating;
        info!(agent = %self.identity, "Agent entered updating");
        Ok(UpdateGuard { agent: self })
    }

    /// Close every breaker on this agent.
    pub fn reset_circuits(&self) -> Result<(), ConductorError> {
        let guard = self.begin_update()?;
        guard.clear_circuits();
        Ok(())
    }
}

/// Scoped `Processing` transition. Dropping it without a recorded outcome
/// (cancelled future, panic) counts as a failed task.
struct ProcessingGuard<'a> {
    agent: &'a Agent,
    operation: String,
    started: Instant,
    trial: bool,
    finished: bool,
}

impl ProcessingGuard<'_> {
    fn succeed(mut self) {
        self.finished = true;
        self.agent.release(&self.operation, self.trial, None, self.started.elapsed());
    }

    fn fail(mut self, error: &ConductorError) {
        self.finished = true;
        self.agent.release(&self.operation, self.trial, Some(error), self.started.elapsed());
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let aborted = ConductorError::Cancelled("task dropped before completion".into());
            self.agent.release(&self.operation, self.trial, Some(&aborted), self.started.elapsed());
        }
    }
}

/// Administrative access to an agent in the `Updating` state.
pub struct UpdateGuard<'a> {
    agent: &'a Agent,
}

impl UpdateGuard<'_> {
    pub fn clear_circuits(&self) {
        self.agent.inner.lock().circuits.clear();
    }

    pub fn clear_last_error(&self) {
        self.agent.inner.lock().last_error = None;
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.agent.inner.lock();
        inner.state = AgentState::Idle;
        info!(agent = %self.agent.identity, "Agent left updating");
    }
}
