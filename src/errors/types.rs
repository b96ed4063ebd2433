use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Circuit open for {agent}/{operation}, retry after {}ms", retry_after.as_millis())]
    CircuitOpen {
        agent: String,
        operation: String,
        retry_after: Duration,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("step '{step}' failed: {source}")]
    WorkflowStep {
        step: String,
        #[source]
        source: Box<ConductorError>,
    },

    #[error("No suitable agent: {0}")]
    NoSuitableAgent(String),

    #[error("Agent failure: {0}")]
    AgentFailure(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConductorError {
    /// Wrap an error raised inside a workflow step with the step's name.
    pub fn in_step(step: &str, source: ConductorError) -> Self {
        Self::WorkflowStep {
            step: step.to_string(),
            source: Box::new(source),
        }
    }

    /// Errors that signal caller misuse or systemic unavailability. These cross
    /// the agent boundary as errors instead of being folded into a task result.
    pub fn is_raised_directly(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::UnknownAgentType(_)
                | Self::InvalidTransition(_)
                | Self::CircuitOpen { .. }
                | Self::Cancelled(_)
        )
    }
}

impl From<rusqlite::Error> for ConductorError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for ConductorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            Self::Network(e.to_string())
        } else {
            Self::Llm(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_message_names_step() {
        let err = ConductorError::in_step("enrich", ConductorError::Network("connection reset".into()));
        assert_eq!(err.to_string(), "step 'enrich' failed: Network error: connection reset");
    }

    #[test]
    fn test_circuit_open_message_includes_retry_after() {
        let err = ConductorError::CircuitOpen {
            agent: "sales:s1".into(),
            operation: "execute".into(),
            retry_after: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("retry after 1500ms"));
    }

    #[test]
    fn test_raised_directly() {
        assert!(ConductorError::Validation("bad".into()).is_raised_directly());
        assert!(ConductorError::Cancelled("stop".into()).is_raised_directly());
        assert!(!ConductorError::Network("down".into()).is_raised_directly());
        assert!(!ConductorError::AgentFailure("boom".into()).is_raised_directly());
    }
}
