use std::collections::HashSet;
use std::path::Path;
use crate::agents::{DOMAIN_TEMPLATES, MAX_CIRCUIT_RESET_SECS};
use crate::errors::ConductorError;
use super::types::{ConductorConfig, PersistenceConfig};
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<ConductorConfig, ConductorError> {
    if !path.exists() {
        return Err(ConductorError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(ConductorError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Parse configuration text. An empty document is the default configuration.
pub fn parse_config_str(content: &str) -> Result<ConductorConfig, ConductorError> {
    if content.trim().is_empty() {
        return Ok(ConductorConfig::default());
    }

    let yaml: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| ConductorError::Config(format!("Invalid YAML: {}", e)))?;

    validate_schema(&yaml)?;

    let config: ConductorConfig = serde_yaml::from_value(yaml)
        .map_err(|e| ConductorError::Config(format!("Invalid configuration: {}", e)))?;

    validate_semantics(&config)?;

    Ok(config)
}

/// Check the raw document against the JSON schema. Violations are logged,
/// not fatal; typed parsing and the semantic checks decide validity.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), ConductorError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| ConductorError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| ConductorError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        for e in errors {
            warn!(validation_error = %e, path = %e.instance_path, "Config schema warning");
        }
    }

    Ok(())
}

fn is_builtin(agent_type: &str) -> bool {
    DOMAIN_TEMPLATES.iter().any(|t| t.agent_type == agent_type)
}

fn validate_semantics(config: &ConductorConfig) -> Result<(), ConductorError> {
    let defaults = &config.agents.defaults;
    if defaults.retry.max_attempts == 0 {
        return Err(ConductorError::Config("agents.defaults.retry.max_attempts must be at least 1".into()));
    }
    if defaults.retry.base_delay_ms > defaults.retry.max_delay_ms {
        return Err(ConductorError::Config(
            "agents.defaults.retry.base_delay_ms must not exceed max_delay_ms".into(),
        ));
    }
    if defaults.circuit_breaker.threshold == 0 {
        return Err(ConductorError::Config(
            "agents.defaults.circuit_breaker.threshold must be at least 1".into(),
        ));
    }
    let reset = defaults.circuit_breaker.reset_secs;
    if !reset.is_finite() || !(0.0..=MAX_CIRCUIT_RESET_SECS).contains(&reset) {
        return Err(ConductorError::Config(format!(
            "agents.defaults.circuit_breaker.reset_secs must be between 0 and {}", MAX_CIRCUIT_RESET_SECS
        )));
    }
    if !(1..=PersistenceConfig::MAX_TTL_DAYS).contains(&config.persistence.ttl_days) {
        return Err(ConductorError::Config(format!(
            "persistence.ttl_days must be between 1 and {}", PersistenceConfig::MAX_TTL_DAYS
        )));
    }

    for agent_type in &config.agents.enabled {
        if !is_builtin(agent_type) {
            return Err(ConductorError::Config(format!("agents.enabled: unknown agent type '{}'", agent_type)));
        }
    }
    let enabled = |t: &str| {
        if config.agents.enabled.is_empty() {
            is_builtin(t)
        } else {
            config.agents.enabled.iter().any(|e| e == t)
        }
    };

    for (agent_type, over) in &config.agents.overrides {
        if !is_builtin(agent_type) {
            warn!(agent_type = %agent_type, "Override for an agent type that is not built in");
        }
        let mut resolved = config.agents.agent_config(Some(agent_type));
        resolved.id = agent_type.clone();
        resolved.validate().map_err(|e| {
            ConductorError::Config(format!("agents.overrides.{}: {}", agent_type, e))
        })?;
        if (over.base_delay_ms.is_some() || over.max_delay_ms.is_some())
            && resolved.retry_base_delay_ms > resolved.retry_max_delay_ms
        {
            return Err(ConductorError::Config(format!(
                "agents.overrides.{}: base_delay_ms must not exceed max_delay_ms", agent_type
            )));
        }
    }

    if let Some(default) = &config.router.default_agent_type {
        if !enabled(default.as_str()) {
            return Err(ConductorError::Config(format!(
                "router.default_agent_type '{}' is not an enabled agent type", default
            )));
        }
    }

    let mut names = HashSet::new();
    for workflow in &config.workflows {
        if !names.insert(workflow.name.as_str()) {
            return Err(ConductorError::Config(format!("duplicate workflow name '{}'", workflow.name)));
        }
        workflow.validate().map_err(|e| ConductorError::Config(e.to_string()))?;
        for step in &workflow.steps {
            if !enabled(step.agent_type.as_str()) {
                return Err(ConductorError::Config(format!(
                    "workflow '{}': step '{}' uses agent type '{}' which is not enabled",
                    workflow.name, step.name, step.agent_type
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;

    const FULL: &str = r#"
llm:
  provider: scripted
agents:
  defaults:
    retry: {max_attempts: 2, base_delay_ms: 10, max_delay_ms: 100}
    circuit_breaker: {threshold: 3, reset_secs: 5}
  overrides:
    finance:
      goal: reconcile every invoice
  enabled: [sales, finance, support]
persistence:
  backend: sqlite
  path: /tmp/conductor.db
  ttl_days: 3
router:
  default_agent_type: support
  use_classifier: false
workflows:
  - name: lead-to-invoice
    steps:
      - {name: qualify, agent_type: sales, task: "Qualify {lead}"}
      - {name: bill, agent_type: finance, task: "Invoice {lead}"}
"#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config_str(FULL).unwrap();
        assert_eq!(config.llm.provider(), "scripted");
        assert_eq!(config.persistence.backend, StoreBackend::Sqlite);
        assert_eq!(config.agents.enabled.len(), 3);
        assert!(!config.router.use_classifier);
        assert_eq!(config.workflow("lead-to-invoice").unwrap().steps.len(), 2);
        assert_eq!(config.agents.agent_config(Some("finance")).goal, "reconcile every invoice");
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config.persistence.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = parse_config_str("agents:\n  defaults:\n    retry: {max_attempts: 0}\n").unwrap_err();
        assert!(matches!(err, ConductorError::Config(m) if m.contains("max_attempts")));
    }

    #[test]
    fn test_delay_bounds_rejected() {
        let yaml = "agents:\n  defaults:\n    retry: {base_delay_ms: 500, max_delay_ms: 100}\n";
        assert!(parse_config_str(yaml).is_err());
    }

    #[test]
    fn test_default_type_must_be_enabled() {
        let yaml = "agents:\n  enabled: [sales]\nrouter:\n  default_agent_type: support\n";
        let err = parse_config_str(yaml).unwrap_err();
        assert!(err.to_string().contains("router.default_agent_type"));
    }

    #[test]
    fn test_unknown_enabled_type_rejected() {
        let yaml = "agents:\n  enabled: [legal]\nrouter:\n  default_agent_type: null\n";
        assert!(parse_config_str(yaml).is_err());
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let yaml = "workflows:\n  - name: w\n    steps:\n      - {name: a, agent_type: sales, task: t}\n      - {name: a, agent_type: hr, task: t}\n";
        assert!(matches!(parse_config_str(yaml), Err(ConductorError::Config(_))));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        assert!(parse_config_str("persistence:\n  ttl_days: 0\n").is_err());
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        let yaml = format!("persistence:\n  ttl_days: {}\n", u64::MAX / 1000);
        let err = parse_config_str(&yaml).unwrap_err();
        assert!(matches!(err, ConductorError::Config(m) if m.contains("ttl_days")));
        assert!(parse_config_str("persistence:\n  ttl_days: 3650\n").is_ok());
    }

    #[test]
    fn test_oversized_reset_secs_rejected() {
        let yaml = "agents:\n  defaults:\n    circuit_breaker: {threshold: 2, reset_secs: 1.0e20}\n";
        let err = parse_config_str(yaml).unwrap_err();
        assert!(matches!(err, ConductorError::Config(m) if m.contains("reset_secs")));
    }

    #[test]
    fn test_oversized_override_reset_secs_rejected() {
        let yaml = "agents:\n  overrides:\n    sales: {circuit_breaker_reset_secs: 1.0e20}\n";
        let err = parse_config_str(yaml).unwrap_err();
        assert!(matches!(err, ConductorError::Config(m) if m.contains("agents.overrides.sales")));
    }

    #[test]
    fn test_oversized_step_timeout_rejected() {
        let yaml = "workflows:\n  - name: w\n    steps:\n      - {name: a, agent_type: sales, task: t, timeout_secs: 1.0e30}\n";
        assert!(matches!(parse_config_str(yaml), Err(ConductorError::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = parse_config(Path::new("/nonexistent/conductor.yaml")).await.unwrap_err();
        assert!(matches!(err, ConductorError::Config(_)));
    }

    #[tokio::test]
    async fn test_parse_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conductor.yaml");
        tokio::fs::write(&path, FULL).await.unwrap();
        let config = parse_config(&path).await.unwrap();
        assert_eq!(config.persistence.ttl_days, 3);
    }
}
