use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agents::AgentRegistry;
use crate::audit::Tracer;
use crate::errors::ConductorError;
use super::engine::Workflow;
use super::step::{AgentStep, WorkflowStep};

/// Upper bound for a step's `timeout_secs`: one week.
pub const MAX_STEP_TIMEOUT_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// Declarative workflow loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Task text; `{key}` placeholders are filled from the workflow data.
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

impl WorkflowDefinition {
    pub fn from_yaml(text: &str) -> Result<Self, ConductorError> {
        let def: Self = serde_yaml::from_str(text)?;
        def.validate()?;
        Ok(def)
    }

    /// Structural checks that need no registry.
    pub fn validate(&self) -> Result<(), ConductorError> {
        if self.name.trim().is_empty() {
            return Err(ConductorError::Validation("workflow name must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(ConductorError::Validation(format!("workflow '{}': step name must not be empty", self.name)));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(ConductorError::Validation(format!(
                    "workflow '{}': duplicate step name '{}'", self.name, step.name
                )));
            }
            if step.task.trim().is_empty() {
                return Err(ConductorError::Validation(format!(
                    "workflow '{}': step '{}' has an empty task", self.name, step.name
                )));
            }
            if let Some(secs) = step.timeout_secs {
                if !secs.is_finite() || secs <= 0.0 || secs > MAX_STEP_TIMEOUT_SECS {
                    return Err(ConductorError::Validation(format!(
                        "workflow '{}': step '{}' timeout must be positive and at most {} seconds",
                        self.name, step.name, MAX_STEP_TIMEOUT_SECS
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build a runnable workflow. Every step's agent type must be registered.
    pub fn build(
        &self,
        registry: Arc<AgentRegistry>,
        tracer: Option<Arc<dyn Tracer>>,
    ) -> Result<Workflow, ConductorError> {
        self.validate()?;

        let mut workflow = Workflow::new(&self.name);
        for def in &self.steps {
            if !registry.is_registered(&def.agent_type) {
                return Err(ConductorError::UnknownAgentType(def.agent_type.clone()));
            }

            let mut logic = AgentStep::new(registry.clone(), &def.agent_type, &def.task);
            if let Some(id) = &def.agent_id {
                logic = logic.with_agent_id(id);
            }
            if let Some(key) = &def.output_key {
                logic = logic.with_output_key(key);
            }

            let mut step = WorkflowStep::new(&def.name, logic);
            if let Some(secs) = def.timeout_secs {
                let timeout = Duration::try_from_secs_f64(secs).map_err(|e| {
                    ConductorError::Validation(format!("step '{}' timeout: {}", def.name, e))
                })?;
                step = step.with_timeout(timeout);
            }
            workflow.push_step(step);
        }

        if let Some(tracer) = tracer {
            workflow = workflow.with_tracer(tracer);
        }
        Ok(workflow)
    }
}
