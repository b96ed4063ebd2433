use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::agents::{AgentConfig, AgentMetrics, AgentState};
use crate::errors::ConductorError;

/// Bumped whenever the record layout changes. Records from another version
/// are ignored on load.
pub const SCHEMA_VERSION: u32 = 1;

/// Serialized agent state stored under `agent:{type}:{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAgentState {
    pub agent_id: String,
    pub agent_type: String,
    pub state: AgentState,
    pub metrics: AgentMetrics,
    /// Secrets are stripped before the record is built.
    pub config: AgentConfig,
    /// RFC 3339 timestamp of the save.
    pub last_updated: String,
    pub schema_version: u32,
}

impl PersistedAgentState {
    pub fn new(
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
        state: AgentState,
        metrics: AgentMetrics,
        config: &AgentConfig,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            state,
            metrics,
            config: config.redacted(),
            last_updated: Utc::now().to_rfc3339(),
            schema_version: SCHEMA_VERSION,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConductorError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConductorError> {
        let record: Self = serde_json::from_slice(bytes)?;
        if record.schema_version != SCHEMA_VERSION {
            return Err(ConductorError::Persistence(format!(
                "unsupported schema version {} (expected {})",
                record.schema_version, SCHEMA_VERSION
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_excludes_secrets() {
        let mut config = AgentConfig::new("s1", "Sales");
        config.metadata.insert("crm_password".into(), "hunter2".into());
        let record = PersistedAgentState::new("s1", "sales", AgentState::Idle, AgentMetrics::default(), &config);
        let text = String::from_utf8(record.to_bytes().unwrap()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("\"schema_version\":1"));
    }

    #[test]
    fn test_round_trip_preserves_state_and_metrics() {
        let mut metrics = AgentMetrics::default();
        metrics.record_success(42.0);
        metrics.record_failure();
        let record = PersistedAgentState::new("f1", "finance", AgentState::Error, metrics, &AgentConfig::new("f1", "Finance"));
        let back = PersistedAgentState::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_rejects_other_schema_version() {
        let mut record = PersistedAgentState::new("f1", "finance", AgentState::Idle, AgentMetrics::default(), &AgentConfig::new("f1", "Finance"));
        record.schema_version = 99;
        let bytes = serde_json::to_vec(&record).unwrap();
        assert!(matches!(PersistedAgentState::from_bytes(&bytes), Err(ConductorError::Persistence(_))));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(PersistedAgentState::from_bytes(b"not json").is_err());
    }
}
