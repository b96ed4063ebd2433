use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ConductorError, RetryPolicy};
use crate::llm::GenerationOptions;

/// Metadata keys containing any of these fragments are never persisted.
const SECRET_MARKERS: &[&str] = &["key", "secret", "token", "password", "credential"];

/// Upper bound for `circuit_breaker_reset_secs`: one year.
pub const MAX_CIRCUIT_RESET_SECS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Immutable per-instance agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub role: String,
    pub goal: String,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub circuit_breaker_threshold: u32,
    /// Seconds the breaker stays open before the next call is let through.
    pub circuit_breaker_reset_secs: f64,
    #[serde(default)]
    pub llm: GenerationOptions,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: String::new(),
            goal: String::new(),
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60.0,
            llm: GenerationOptions::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms.max(self.retry_base_delay_ms)),
            jitter: true,
        }
    }

    pub fn circuit_reset(&self) -> Duration {
        let secs = self.circuit_breaker_reset_secs.clamp(0.0, MAX_CIRCUIT_RESET_SECS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<(), ConductorError> {
        if self.id.trim().is_empty() {
            return Err(ConductorError::Validation("agent config id must not be empty".into()));
        }
        if self.retry_max_attempts == 0 {
            return Err(ConductorError::Validation(format!(
                "agent '{}': retry_max_attempts must be at least 1", self.id
            )));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(ConductorError::Validation(format!(
                "agent '{}': circuit_breaker_threshold must be at least 1", self.id
            )));
        }
        let reset = self.circuit_breaker_reset_secs;
        if !reset.is_finite() || !(0.0..=MAX_CIRCUIT_RESET_SECS).contains(&reset) {
            return Err(ConductorError::Validation(format!(
                "agent '{}': circuit_breaker_reset_secs must be between 0 and {}", self.id, MAX_CIRCUIT_RESET_SECS
            )));
        }
        Ok(())
    }

    pub fn is_secret_key(key: &str) -> bool {
        let lower = key.to_lowercase();
        SECRET_MARKERS.iter().any(|m| lower.contains(m))
    }

    /// Copy of this config with secret metadata removed, safe to persist.
    pub fn redacted(&self) -> AgentConfig {
        let mut copy = self.clone();
        copy.metadata.retain(|k, _| !Self::is_secret_key(k));
        copy
    }

    /// Lay a persisted config over these defaults. The persisted values win,
    /// except for the id and the secrets, which were never persisted.
    pub fn merged_with_persisted(&self, persisted: &AgentConfig) -> AgentConfig {
        let mut merged = persisted.clone();
        merged.id = self.id.clone();
        let mut metadata = self.metadata.clone();
        for (k, v) in &persisted.metadata {
            if !Self::is_secret_key(k) {
                metadata.insert(k.clone(), v.clone());
            }
        }
        merged.metadata = metadata;
        merged
    }
}
