use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audit::Tracer;
use crate::errors::ConductorError;
use super::context::{WorkflowContext, WorkflowStatus, WorkflowStepRecord};
use super::step::WorkflowStep;

/// Outcome of one workflow run. Failures are reported here, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub execution_id: String,
    pub success: bool,
    pub status: WorkflowStatus,
    pub data: Map<String, Value>,
    pub steps: Vec<WorkflowStepRecord>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl WorkflowResult {
    pub fn step(&self, name: &str) -> Option<&WorkflowStepRecord> {
        self.steps.iter().find(|r| r.name == name)
    }
}

/// Ordered steps run one after another over a shared context. The first
/// failing step ends the run.
pub struct Workflow {
    name: String,
    steps: Vec<WorkflowStep>,
    tracer: Option<Arc<dyn Tracer>>,
    cancel_token: CancellationToken,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            tracer: None,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn add_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push_step(&mut self, step: WorkflowStep) {
        self.steps.push(step);
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Replace the workflow's cancel token with an external one.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub async fn execute(&self, initial_data: Map<String, Value>) -> WorkflowResult {
        let started = Instant::now();
        let mut ctx = WorkflowContext::new(&self.name, initial_data);
        ctx.status = WorkflowStatus::Running;
        ctx.metadata.insert("step_count".into(), json!(self.steps.len()));

        info!(workflow = %self.name, execution_id = %ctx.execution_id, steps = self.steps.len(), "Workflow started");
        let mut trace_id = None;
        self.trace(&mut trace_id, "workflow.start", Value::Object(ctx.data.clone()), Value::Null, None, &ctx).await;

        let mut error: Option<ConductorError> = None;
        for (position, step) in self.steps.iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                warn!(workflow = %self.name, step = step.name(), "Workflow cancelled before step");
                error = Some(ConductorError::Cancelled(format!(
                    "workflow '{}' cancelled before step '{}'", self.name, step.name()
                )));
                break;
            }

            let step_id = format!("{}-{}", position + 1, step.name());
            let input = Value::Object(ctx.data.clone());
            self.trace(&mut trace_id, &format!("step.{}.start", step.name()), input.clone(), Value::Null, None, &ctx).await;

            let step_started = Instant::now();
            let outcome = step.execute(&step_id, &mut ctx, &self.cancel_token).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => {
                    let output = ctx.step(&step_id).and_then(|r| r.output.clone()).unwrap_or(Value::Null);
                    info!(workflow = %self.name, step = step.name(), duration_ms, "Step completed");
                    self.trace(&mut trace_id, &format!("step.{}.end", step.name()), input, output, Some(duration_ms), &ctx).await;
                }
                Err(e) => {
                    warn!(workflow = %self.name, step = step.name(), duration_ms, error = %e, "Step failed");
                    self.trace(&mut trace_id, &format!("step.{}.end", step.name()), input, json!({"error": e.to_string()}), Some(duration_ms), &ctx).await;
                    error = Some(e);
                    break;
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        ctx.status = if error.is_some() { WorkflowStatus::Failed } else { WorkflowStatus::Completed };
        ctx.metadata.insert("elapsed_ms".into(), json!(elapsed_ms));

        match &error {
            None => {
                info!(workflow = %self.name, elapsed_ms, "Workflow completed");
                self.trace(&mut trace_id, "workflow.complete", Value::Null, Value::Object(ctx.data.clone()), Some(elapsed_ms), &ctx).await;
            }
            Some(e) => {
                warn!(workflow = %self.name, elapsed_ms, error = %e, "Workflow failed");
                self.trace(&mut trace_id, "workflow.failed", Value::Null, json!({"error": e.to_string()}), Some(elapsed_ms), &ctx).await;
            }
        }

        WorkflowResult {
            workflow_id: ctx.workflow_id,
            execution_id: ctx.execution_id,
            success: error.is_none(),
            status: ctx.status,
            data: ctx.data,
            steps: ctx.steps,
            error: error.map(|e| e.to_string()),
            elapsed_ms,
        }
    }

    /// Hand one event to the tracer. Tracer errors are logged and dropped.
    async fn trace(
        &self,
        trace_id: &mut Option<String>,
        name: &str,
        input: Value,
        output: Value,
        duration_ms: Option<u64>,
        ctx: &WorkflowContext,
    ) {
        let Some(tracer) = &self.tracer else { return };
        let mut metadata = Map::new();
        metadata.insert("workflow".into(), json!(self.name));
        metadata.insert("execution_id".into(), json!(ctx.execution_id));
        metadata.insert("status".into(), json!(ctx.status));
        if let Some(ms) = duration_ms {
            metadata.insert("duration_ms".into(), json!(ms));
        }

        match tracer.log_execution(name, &input, &output, &metadata, trace_id.as_deref()).await {
            Ok(Some(id)) if trace_id.is_none() => *trace_id = Some(id),
            Ok(_) => {}
            Err(e) => warn!(workflow = %self.name, event = name, error = %e, "Tracer failed, continuing"),
        }
    }
}
