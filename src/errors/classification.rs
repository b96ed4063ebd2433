use super::types::ConductorError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl ConductorError {
    /// Classify this error to determine its type and whether it is transient.
    ///
    /// Only connection/timeout-class errors are retried. A circuit-open
    /// rejection is never retried, whatever its cause.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Transient
            ConductorError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
            },
            ConductorError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: true,
            },
            ConductorError::RateLimit(_) => ErrorClassification {
                error_type: "RateLimitError",
                retryable: true,
            },

            // Terminal
            ConductorError::Validation(_) => ErrorClassification {
                error_type: "ValidationError",
                retryable: false,
            },
            ConductorError::UnknownAgentType(_) => ErrorClassification {
                error_type: "UnknownAgentTypeError",
                retryable: false,
            },
            ConductorError::InvalidTransition(_) => ErrorClassification {
                error_type: "InvalidTransitionError",
                retryable: false,
            },
            ConductorError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
            },
            ConductorError::Llm(_) => ErrorClassification {
                error_type: "LLMError",
                retryable: false,
            },
            ConductorError::Authentication(_) => ErrorClassification {
                error_type: "AuthenticationError",
                retryable: false,
            },
            ConductorError::CircuitOpen { .. } => ErrorClassification {
                error_type: "CircuitOpenError",
                retryable: false,
            },
            ConductorError::Persistence(_) => ErrorClassification {
                error_type: "PersistenceError",
                retryable: false,
            },
            ConductorError::WorkflowStep { .. } => ErrorClassification {
                error_type: "WorkflowStepError",
                retryable: false,
            },
            ConductorError::NoSuitableAgent(_) => ErrorClassification {
                error_type: "NoSuitableAgentError",
                retryable: false,
            },
            ConductorError::AgentFailure(_) => ErrorClassification {
                error_type: "AgentFailureError",
                retryable: false,
            },
            ConductorError::Cancelled(_) => ErrorClassification {
                error_type: "CancelledError",
                retryable: false,
            },
            ConductorError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: false,
            },
            ConductorError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
            },
            ConductorError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },
            ConductorError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
            },
        }
    }
}
