use crate::errors::ConductorError;
use super::provider::LLMProvider;
use super::anthropic::AnthropicProvider;
use super::openai::OpenAIProvider;
use super::scripted::ScriptedProvider;

/// Environment variable consulted when no API key is configured.
pub fn env_var_for_provider(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "local" => Some("LOCAL_LLM_API_KEY"),
        _ => None,
    }
}

fn resolve_api_key(provider_name: &str, api_key: Option<&str>) -> Option<String> {
    api_key
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| env_var_for_provider(provider_name).and_then(|var| std::env::var(var).ok()))
}

pub fn create_provider(
    provider_name: &str,
    api_key: Option<&str>,
    model: Option<&str>,
    base_url: Option<&str>,
) -> Result<Box<dyn LLMProvider>, ConductorError> {
    let key = resolve_api_key(provider_name, api_key);

    match provider_name {
        "anthropic" | "openai" => {
            let key = key.ok_or_else(|| ConductorError::Config(format!(
                "No API key for provider '{}': set llm.api_key or {}",
                provider_name,
                env_var_for_provider(provider_name).unwrap_or("the provider's key variable"),
            )))?;
            if provider_name == "anthropic" {
                Ok(Box::new(AnthropicProvider::new(&key, model, base_url)))
            } else {
                match base_url {
                    Some(url) => Ok(Box::new(OpenAIProvider::with_base_url(&key, model, url))),
                    None => Ok(Box::new(OpenAIProvider::new(&key, model))),
                }
            }
        }
        "local" => Ok(Box::new(OpenAIProvider::local(base_url, model, key.as_deref().unwrap_or("")))),
        "scripted" => Ok(Box::new(ScriptedProvider::new())),
        _ => Err(ConductorError::Config(format!("Unknown LLM provider: {}", provider_name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_rejected() {
        let err = create_provider("carrier-pigeon", None, None, None).err().unwrap();
        assert!(matches!(err, ConductorError::Config(_)));
    }

    #[test]
    fn test_explicit_key_builds_provider() {
        let provider = create_provider("openai", Some("sk-test"), Some("gpt-4o-mini"), None).unwrap();
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_local_needs_no_key() {
        let provider = create_provider("local", None, None, Some("http://127.0.0.1:8080/v1")).unwrap();
        assert_eq!(provider.provider_name(), "local");
    }

    #[test]
    fn test_scripted_provider() {
        let provider = create_provider("scripted", None, None, None).unwrap();
        assert_eq!(provider.provider_name(), "scripted");
    }
}
