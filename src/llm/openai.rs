use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use crate::errors::ConductorError;
use super::provider::{status_error, LLMProvider};
use super::types::{GenerationOptions, LLMResponse};
use tracing::debug;

/// Chat-completions client. Also serves any OpenAI-compatible endpoint
/// (local model servers) through [`OpenAIProvider::with_base_url`].
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    name: &'static str,
}

impl OpenAIProvider {
    pub fn new(api_key: &str, model: Option<&str>) -> Self {
        Self::with_base_url(api_key, model, "https://api.openai.com/v1")
    }

    pub fn with_base_url(api_key: &str, model: Option<&str>, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.unwrap_or("gpt-4o").to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            name: "openai",
        }
    }

    pub fn local(base_url: Option<&str>, model: Option<&str>, api_key: &str) -> Self {
        let mut provider = Self::with_base_url(
            api_key,
            Some(model.unwrap_or("qwen2.5:7b")),
            base_url.unwrap_or("http://localhost:11434/v1"),
        );
        provider.name = "local";
        provider
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse, ConductorError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(json!({"role": "system", "content": sys}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": options.max_tokens(),
        });
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }

        let mut request = self.client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error(self.name, status, &text));
        }

        let data: Value = resp.json().await
            .map_err(|e| ConductorError::Llm(format!("Failed to parse {} response: {}", self.name, e)))?;

        let content = data["choices"][0]["message"]["content"].as_str()
            .ok_or_else(|| ConductorError::Llm(format!("No content in {} response", self.name)))?
            .to_string();

        let input_tokens = data["usage"]["prompt_tokens"].as_u64();
        let output_tokens = data["usage"]["completion_tokens"].as_u64();
        debug!(provider = self.name, model, input_tokens, output_tokens, "Chat completion");

        Ok(LLMResponse {
            content,
            input_tokens,
            output_tokens,
            model: model.to_string(),
        })
    }

    fn provider_name(&self) -> &str { self.name }
    fn model_name(&self) -> &str { &self.model }
}
