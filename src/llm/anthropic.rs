use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use crate::errors::ConductorError;
use super::provider::{status_error, LLMProvider};
use super::types::{GenerationOptions, LLMResponse};
use tracing::debug;

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: Option<&str>, base_url: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.unwrap_or("claude-sonnet-4-5-20250929").to_string(),
            base_url: base_url.unwrap_or("https://api.anthropic.com").trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse, ConductorError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let mut body = json!({
            "model": model,
            "max_tokens": options.max_tokens(),
            "messages": [{"role": "user", "content": prompt}]
        });
        if let Some(sys) = system {
            body["system"] = json!(sys);
        }
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }

        let resp = self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error("anthropic", status, &text));
        }

        let data: Value = resp.json().await
            .map_err(|e| ConductorError::Llm(format!("Failed to parse Anthropic response: {}", e)))?;

        let content = data["content"][0]["text"].as_str()
            .ok_or_else(|| ConductorError::Llm("No content in Anthropic response".into()))?
            .to_string();

        let input_tokens = data["usage"]["input_tokens"].as_u64();
        let output_tokens = data["usage"]["output_tokens"].as_u64();
        debug!(model, input_tokens, output_tokens, "Anthropic completion");

        Ok(LLMResponse {
            content,
            input_tokens,
            output_tokens,
            model: model.to_string(),
        })
    }

    fn provider_name(&self) -> &str { "anthropic" }
    fn model_name(&self) -> &str { &self.model }
}
