use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ConductorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub model: String,
}

/// Per-call generation options. Unset fields fall back to the provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(Self::DEFAULT_MAX_TOKENS)
    }

    /// Fill unset fields from `fallback`.
    pub fn or(&self, fallback: &GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone().or_else(|| fallback.model.clone()),
            temperature: self.temperature.or(fallback.temperature),
            max_tokens: self.max_tokens.or(fallback.max_tokens),
        }
    }
}

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("static regex")
});

/// Pull a JSON value out of free-form model output: the whole text, a fenced
/// code block, or the outermost `{...}` span, in that order.
pub fn extract_json(text: &str) -> Result<Value, ConductorError> {
    if let Ok(v) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(v);
    }
    if let Some(caps) = FENCED_JSON.captures(text) {
        let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        return serde_json::from_str(body)
            .map_err(|e| ConductorError::Llm(format!("Invalid JSON in code block: {}", e)));
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return serde_json::from_str(&text[start..=end])
                .map_err(|e| ConductorError::Llm(format!("Invalid JSON extraction: {}", e)));
        }
    }
    Err(ConductorError::Llm("No valid JSON found in LLM response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_json() {
        let v = extract_json(r#"{"agent_type": "finance"}"#).unwrap();
        assert_eq!(v["agent_type"], "finance");
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Sure, here it is:\n```json\n{\"confidence\": 0.9}\n```\nAnything else?";
        let v = extract_json(text).unwrap();
        assert_eq!(v["confidence"], 0.9);
    }

    #[test]
    fn test_extract_embedded_object() {
        let v = extract_json("The answer is {\"reasoning\": \"mentions invoices\"} as requested").unwrap();
        assert_eq!(v["reasoning"], "mentions invoices");
    }

    #[test]
    fn test_extract_rejects_prose() {
        assert!(matches!(extract_json("no idea, sorry"), Err(ConductorError::Llm(_))));
    }

    #[test]
    fn test_options_fallback() {
        let agent = GenerationOptions { temperature: Some(0.2), ..Default::default() };
        let global = GenerationOptions {
            model: Some("gpt-4o".into()),
            temperature: Some(0.7),
            max_tokens: None,
        };
        let merged = agent.or(&global);
        assert_eq!(merged.model.as_deref(), Some("gpt-4o"));
        assert_eq!(merged.temperature, Some(0.2));
        assert_eq!(merged.max_tokens(), GenerationOptions::DEFAULT_MAX_TOKENS);
    }
}
