use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::agents::AgentRegistry;
use crate::errors::ConductorError;
use crate::llm::{GenerationOptions, LLMProvider};
use super::keywords::match_keywords;

pub const KEYWORD_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMethod {
    Classifier,
    Keyword,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub agent_type: String,
    pub confidence: f64,
    pub reasoning: String,
    pub method: RouteMethod,
}

const CLASSIFIER_SYSTEM: &str =
    "You route business tasks to the single best-suited agent. Answer with JSON only.";

/// Chooses an agent type for a free-text task: language-model classifier
/// first, keyword table on any classifier failure, then the default type.
pub struct AgentRouter {
    registry: Arc<AgentRegistry>,
    classifier: Option<Arc<dyn LLMProvider>>,
    default_agent_type: Option<String>,
    options: GenerationOptions,
}

impl AgentRouter {
    pub fn new(registry: Arc<AgentRegistry>, classifier: Option<Arc<dyn LLMProvider>>) -> Self {
        Self {
            registry,
            classifier,
            default_agent_type: Some("support".to_string()),
            options: GenerationOptions {
                temperature: Some(0.0),
                max_tokens: Some(256),
                ..GenerationOptions::default()
            },
        }
    }

    pub fn with_default_agent_type(mut self, agent_type: Option<String>) -> Self {
        self.default_agent_type = agent_type;
        self
    }

    pub fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn route(&self, task: &str, context: &Map<String, Value>) -> Result<RouteDecision, ConductorError> {
        let types = self.registry.registered_types();
        if types.is_empty() {
            return Err(ConductorError::NoSuitableAgent("no agent types are registered".into()));
        }

        // Blank text has nothing to classify or match; it lands on the default type.
        if task.trim().is_empty() {
            return self.fallback(task, &types);
        }
        if let Some(llm) = &self.classifier {
            match self.classify(llm.as_ref(), task, context, &types).await {
                Ok(decision) => {
                    info!(agent_type = %decision.agent_type, confidence = decision.confidence, "Routed by classifier");
                    return Ok(decision);
                }
                Err(e) => warn!(error = %e, "Classifier routing failed, falling back to keywords"),
            }
        }

        self.fallback(task, &types)
    }

    async fn classify(
        &self,
        llm: &dyn LLMProvider,
        task: &str,
        context: &Map<String, Value>,
        types: &[String],
    ) -> Result<RouteDecision, ConductorError> {
        let mut prompt = String::from("Available agent types:\n");
        for descriptor in self.registry.descriptors() {
            prompt.push_str(&format!("- {}: {}\n", descriptor.agent_type, descriptor.description));
        }
        prompt.push_str(&format!("\nTask: {}\n", task));
        if !context.is_empty() {
            prompt.push_str(&format!("Context: {}\n", Value::Object(context.clone())));
        }
        prompt.push_str("\nPick the agent type that should handle this task.");

        let schema = json!({
            "type": "object",
            "required": ["agent_type", "confidence", "reasoning"],
            "properties": {
                "agent_type": {"type": "string", "enum": types},
                "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                "reasoning": {"type": "string"}
            }
        });

        let value = llm.complete_structured(&prompt, &schema, Some(CLASSIFIER_SYSTEM), &self.options).await?;
        parse_classification(&value, types)
    }

    fn fallback(&self, task: &str, types: &[String]) -> Result<RouteDecision, ConductorError> {
        let registered = |t: &str| types.iter().any(|r| r == t);

        if let Some((agent_type, keyword)) = match_keywords(task, registered) {
            debug!(agent_type, keyword = %keyword, "Routed by keyword");
            return Ok(RouteDecision {
                agent_type: agent_type.to_string(),
                confidence: KEYWORD_CONFIDENCE,
                reasoning: format!("matched keyword '{}'", keyword),
                method: RouteMethod::Keyword,
            });
        }

        match &self.default_agent_type {
            Some(default) if registered(default.as_str()) => {
                debug!(agent_type = %default, "Routed to default agent type");
                Ok(RouteDecision {
                    agent_type: default.clone(),
                    confidence: DEFAULT_CONFIDENCE,
                    reasoning: "no keyword matched, using the default agent type".to_string(),
                    method: RouteMethod::Default,
                })
            }
            _ => Err(ConductorError::NoSuitableAgent(format!(
                "no agent type matched task '{}'",
                crate::utils::preview(task, 80)
            ))),
        }
    }
}

fn parse_classification(value: &Value, types: &[String]) -> Result<RouteDecision, ConductorError> {
    let agent_type = value.get("agent_type").or_else(|| value.get("agentType"))
        .and_then(Value::as_str)
        .ok_or_else(|| ConductorError::Llm("classifier response missing 'agent_type'".into()))?;
    let confidence = value.get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| ConductorError::Llm("classifier response missing 'confidence'".into()))?;
    let reasoning = value.get("reasoning")
        .and_then(Value::as_str)
        .ok_or_else(|| ConductorError::Llm("classifier response missing 'reasoning'".into()))?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(ConductorError::Llm(format!("classifier confidence {} outside [0, 1]", confidence)));
    }
    if !types.iter().any(|t| t == agent_type) {
        return Err(ConductorError::Llm(format!("classifier chose unregistered type '{}'", agent_type)));
    }

    Ok(RouteDecision {
        agent_type: agent_type.to_string(),
        confidence,
        reasoning: reasoning.to_string(),
        method: RouteMethod::Classifier,
    })
}
