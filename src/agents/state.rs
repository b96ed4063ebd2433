use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(agent_type, instance_id)`: the registry key of an agent instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_type: String,
    pub instance_id: String,
}

impl AgentIdentity {
    pub fn new(agent_type: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Key under which the agent's state is persisted.
    pub fn store_key(&self) -> String {
        format!("agent:{}:{}", self.agent_type, self.instance_id)
    }
}

impl std::fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.agent_type, self.instance_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    #[default]
    Idle,
    Processing,
    Error,
    Updating,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Error => "error",
            Self::Updating => "updating",
        }
    }

    /// Task execution moves `Idle|Error -> Processing -> Idle|Error`.
    /// `Updating` is only entered and left through the administrative guard.
    pub fn can_transition_to(&self, next: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, next),
            (Idle, Processing)
                | (Error, Processing)
                | (Processing, Idle)
                | (Processing, Error)
                | (Idle, Updating)
                | (Error, Updating)
                | (Updating, Idle)
        )
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent task counters, updated once at the end of every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentMetrics {
    pub tasks_processed: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Mean latency of successful tasks.
    pub average_latency_ms: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl AgentMetrics {
    pub fn record_success(&mut self, elapsed_ms: f64) {
        let n = self.success_count as f64;
        self.average_latency_ms = (self.average_latency_ms * n + elapsed_ms) / (n + 1.0);
        self.success_count += 1;
        self.tasks_processed += 1;
        self.last_updated = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.tasks_processed += 1;
        self.last_updated = Some(Utc::now());
    }

    pub fn success_rate(&self) -> f64 {
        if self.tasks_processed == 0 {
            return 1.0;
        }
        self.success_count as f64 / self.tasks_processed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_format() {
        let id = AgentIdentity::new("sales", "s1");
        assert_eq!(id.store_key(), "agent:sales:s1");
        assert_eq!(id.to_string(), "sales:s1");
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(AgentState::Idle.can_transition_to(AgentState::Processing));
        assert!(AgentState::Error.can_transition_to(AgentState::Processing));
        assert!(AgentState::Processing.can_transition_to(AgentState::Idle));
        assert!(AgentState::Processing.can_transition_to(AgentState::Error));
        assert!(AgentState::Idle.can_transition_to(AgentState::Updating));
        assert!(AgentState::Updating.can_transition_to(AgentState::Idle));
    }

    #[test]
    fn test_forbidden_transitions() {
        assert!(!AgentState::Idle.can_transition_to(AgentState::Error));
        assert!(!AgentState::Processing.can_transition_to(AgentState::Updating));
        assert!(!AgentState::Updating.can_transition_to(AgentState::Processing));
        assert!(!AgentState::Idle.can_transition_to(AgentState::Idle));
    }

    #[test]
    fn test_incremental_mean_latency() {
        let mut m = AgentMetrics::default();
        m.record_success(100.0);
        m.record_success(200.0);
        m.record_success(600.0);
        assert_eq!(m.success_count, 3);
        assert!((m.average_latency_ms - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failures_do_not_move_latency() {
        let mut m = AgentMetrics::default();
        m.record_success(50.0);
        m.record_failure();
        assert_eq!(m.tasks_processed, 2);
        assert_eq!(m.failure_count, 1);
        assert!((m.average_latency_ms - 50.0).abs() < f64::EPSILON);
        assert!((m.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&AgentState::Processing).unwrap(), "\"processing\"");
        let parsed: AgentState = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, AgentState::Error);
    }
}
