use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ConductorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepRecord {
    pub step_id: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// `data` as it was when the step started.
    pub input: Map<String, Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl WorkflowStepRecord {
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time.map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// State threaded through one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub execution_id: String,
    pub status: WorkflowStatus,
    /// Step records in execution order.
    pub steps: Vec<WorkflowStepRecord>,
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl WorkflowContext {
    pub fn new(workflow_id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: uuid::Uuid::new_v4().to_string(),
            status: WorkflowStatus::Pending,
            steps: Vec::new(),
            data,
            metadata: Map::new(),
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStepRecord> {
        self.steps.iter().find(|r| r.step_id == step_id)
    }

    pub fn step_by_name(&self, name: &str) -> Option<&WorkflowStepRecord> {
        self.steps.iter().find(|r| r.name == name)
    }

    /// Open a `Running` record. Returns its index for the matching
    /// `complete_step`/`fail_step` call.
    pub fn begin_step(&mut self, step_id: impl Into<String>, name: impl Into<String>) -> usize {
        self.steps.push(WorkflowStepRecord {
            step_id: step_id.into(),
            name: name.into(),
            status: WorkflowStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            input: self.data.clone(),
            output: None,
            error: None,
            metadata: Map::new(),
        });
        self.steps.len() - 1
    }

    /// Mark the record completed and merge an object-shaped output into `data`.
    /// Terminal records are left untouched.
    pub fn complete_step(&mut self, index: usize, output: Value, metadata: Map<String, Value>) {
        let Some(record) = self.steps.get_mut(index) else { return };
        if record.status.is_terminal() {
            return;
        }
        if let Value::Object(fields) = &output {
            for (k, v) in fields {
                self.data.insert(k.clone(), v.clone());
            }
        }
        record.status = WorkflowStatus::Completed;
        record.end_time = Some(Utc::now());
        record.output = Some(output);
        record.metadata.extend(metadata);
    }

    /// Mark the record failed and fail the whole context.
    pub fn fail_step(&mut self, index: usize, error: &ConductorError) {
        let Some(record) = self.steps.get_mut(index) else { return };
        if record.status.is_terminal() {
            return;
        }
        record.status = WorkflowStatus::Failed;
        record.end_time = Some(Utc::now());
        record.error = Some(error.to_string());
        self.status = WorkflowStatus::Failed;
    }
}
