use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ConductorError;
use super::types::{extract_json, GenerationOptions, LLMResponse};

/// The language-model capability consumed by agents and the router.
///
/// Implementations perform exactly one provider call per invocation; retry and
/// backoff belong to the caller.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Free-form text completion
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse, ConductorError>;

    /// Structured JSON completion. The schema is appended to the prompt and the
    /// first JSON value found in the reply is returned.
    async fn complete_structured(
        &self,
        prompt: &str,
        schema: &Value,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<Value, ConductorError> {
        let augmented = format!(
            "{}\n\nRespond with valid JSON matching this schema:\n```json\n{}\n```\n\nReturn ONLY the JSON, no other text.",
            prompt,
            serde_json::to_string_pretty(schema)?
        );
        let response = self.complete(&augmented, system, options).await?;
        extract_json(&response.content)
    }

    /// Provider name for logging
    fn provider_name(&self) -> &str;

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// Map a non-success HTTP status from a provider onto the error taxonomy.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> ConductorError {
    let detail = crate::utils::truncate_error(body);
    match status.as_u16() {
        401 | 403 => ConductorError::Authentication(format!("{} rejected credentials: {}", provider, detail)),
        408 => ConductorError::Timeout(format!("{} request timed out", provider)),
        429 => ConductorError::RateLimit(format!("{} rate limit exceeded", provider)),
        500..=599 => ConductorError::Network(format!("{} unavailable ({}): {}", provider, status, detail)),
        _ => ConductorError::Llm(format!("{} returned {}: {}", provider, status, detail)),
    }
}
