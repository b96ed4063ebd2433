use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ConductorError;

/// One recorded execution event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub trace_id: String,
    pub name: String,
    pub timestamp: String,
    pub input: Value,
    pub output: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TraceEvent {
    pub fn new(
        name: &str,
        input: &Value,
        output: &Value,
        metadata: &Map<String, Value>,
        trace_id: Option<&str>,
    ) -> Self {
        Self {
            trace_id: trace_id
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: name.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            input: input.clone(),
            output: output.clone(),
            metadata: metadata.clone(),
        }
    }
}

/// Sink for execution events. Best-effort: callers log and drop any error.
#[async_trait]
pub trait Tracer: Send + Sync {
    /// Record one event. Returns the trace id used, generating one when
    /// `trace_id` is `None`.
    async fn log_execution(
        &self,
        name: &str,
        input: &Value,
        output: &Value,
        metadata: &Map<String, Value>,
        trace_id: Option<&str>,
    ) -> Result<Option<String>, ConductorError>;
}

/// Keeps events in memory. Used by tests and by callers that inspect a run
/// after the fact.
#[derive(Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<TraceEvent>>,
    failing: bool,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracer whose every call fails.
    pub fn failing() -> Self {
        Self { events: Mutex::new(Vec::new()), failing: true }
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.name.clone()).collect()
    }
}

#[async_trait]
impl Tracer for RecordingTracer {
    async fn log_execution(
        &self,
        name: &str,
        input: &Value,
        output: &Value,
        metadata: &Map<String, Value>,
        trace_id: Option<&str>,
    ) -> Result<Option<String>, ConductorError> {
        if self.failing {
            return Err(ConductorError::Internal("tracer unavailable".into()));
        }
        let event = TraceEvent::new(name, input, output, metadata, trace_id);
        let id = event.trace_id.clone();
        self.events.lock().push(event);
        Ok(Some(id))
    }
}
