//! Built-in business agent types.
//!
//! Every domain agent is the same prompt-templated language-model call with a
//! different template. HR additionally composes narrower capabilities that
//! answer leave, performance and training questions with a focused prompt.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::errors::ConductorError;
use crate::utils::truncate_output;
use super::config::AgentConfig;
use super::logic::{AgentLogic, Capability, TaskInvocation};
use super::registry::{AgentConstructor, AgentDescriptor};

#[derive(Debug, Clone, Copy)]
pub struct DomainTemplate {
    pub agent_type: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub role: &'static str,
    pub goal: &'static str,
    pub guidance: &'static str,
    pub capabilities: &'static [CapabilityTemplate],
}

#[derive(Debug, Clone, Copy)]
pub struct CapabilityTemplate {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub focus: &'static str,
}

const HR_CAPABILITIES: &[CapabilityTemplate] = &[
    CapabilityTemplate {
        name: "leave",
        keywords: &["leave", "vacation", "pto", "holiday", "absence", "sick"],
        focus: "Answer questions about leave balances, leave requests and absence policy. \
                State which policy applies and what the employee needs to do next.",
    },
    CapabilityTemplate {
        name: "performance",
        keywords: &["performance", "review", "appraisal", "feedback", "goals", "promotion"],
        focus: "Support performance management: review preparation, goal setting and \
                constructive feedback. Keep recommendations specific and measurable.",
    },
    CapabilityTemplate {
        name: "training",
        keywords: &["training", "course", "onboarding", "certification", "learning", "skills"],
        focus: "Recommend training and onboarding paths. Name concrete courses or \
                milestones and an order to take them in.",
    },
];

pub static DOMAIN_TEMPLATES: &[DomainTemplate] = &[
    DomainTemplate {
        agent_type: "sales",
        display_name: "Sales agent",
        description: "Leads, quotes, pipeline and customer deals",
        role: "sales specialist",
        goal: "move qualified opportunities forward and keep the pipeline accurate",
        guidance: "Be concise and commercially precise. Flag pricing that needs approval.",
        capabilities: &[],
    },
    DomainTemplate {
        agent_type: "finance",
        display_name: "Finance agent",
        description: "Invoices, payments, budgets and expense review",
        role: "finance analyst",
        goal: "keep records correct and surface discrepancies early",
        guidance: "Show the figures you relied on. Never guess amounts that are not given.",
        capabilities: &[],
    },
    DomainTemplate {
        agent_type: "hr",
        display_name: "HR agent",
        description: "Employees, leave, performance and training",
        role: "people operations partner",
        goal: "give employees and managers clear, policy-grounded answers",
        guidance: "Be discreet with personal data and point to the relevant policy.",
        capabilities: HR_CAPABILITIES,
    },
    DomainTemplate {
        agent_type: "support",
        display_name: "Support agent",
        description: "Customer tickets, issues and help requests",
        role: "customer support specialist",
        goal: "resolve the customer's problem on first contact where possible",
        guidance: "Acknowledge the issue, give concrete steps, and say when to escalate.",
        capabilities: &[],
    },
    DomainTemplate {
        agent_type: "development",
        display_name: "Development agent",
        description: "Bugs, code, deployments and technical tasks",
        role: "software engineer",
        goal: "diagnose technical problems and propose safe, minimal changes",
        guidance: "Prefer reproducible steps. Call out risk before suggesting a deploy.",
        capabilities: &[],
    },
    DomainTemplate {
        agent_type: "marketing",
        display_name: "Marketing agent",
        description: "Campaigns, content, brand and social media",
        role: "marketing strategist",
        goal: "produce on-brand content and campaigns tied to measurable outcomes",
        guidance: "Match the brand voice and name the audience and channel.",
        capabilities: &[],
    },
];

pub fn builtin_template(agent_type: &str) -> Option<&'static DomainTemplate> {
    DOMAIN_TEMPLATES.iter().find(|t| t.agent_type == agent_type)
}

impl AgentConstructor for DomainTemplate {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            agent_type: self.agent_type.to_string(),
            display_name: self.display_name.to_string(),
            description: self.description.to_string(),
            capabilities: self.capabilities.iter().map(|c| c.name.to_string()).collect(),
        }
    }

    fn build(&self, config: &AgentConfig) -> Result<Box<dyn AgentLogic>, ConductorError> {
        Ok(Box::new(PromptAgent::new(*self, config)))
    }
}

/// A domain agent: one system prompt plus optional capability modules that
/// take over the tasks they claim.
pub struct PromptAgent {
    agent_type: &'static str,
    system_prompt: String,
    capabilities: Vec<Box<dyn Capability>>,
}

impl PromptAgent {
    pub fn new(template: DomainTemplate, config: &AgentConfig) -> Self {
        let role = if config.role.trim().is_empty() { template.role } else { config.role.as_str() };
        let goal = if config.goal.trim().is_empty() { template.goal } else { config.goal.as_str() };
        let system_prompt = format!(
            "You are {}, a {} for the business. Your goal is to {}.\n{}",
            config.name, role, goal, template.guidance
        );

        let capabilities = template.capabilities.iter()
            .map(|c| Box::new(PromptCapability::new(*c, &system_prompt)) as Box<dyn Capability>)
            .collect();

        Self {
            agent_type: template.agent_type,
            system_prompt,
            capabilities,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn capability_names(&self) -> Vec<&'static str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }
}

#[async_trait]
impl AgentLogic for PromptAgent {
    async fn run(&self, invocation: &TaskInvocation<'_>) -> Result<Map<String, Value>, ConductorError> {
        if let Some(capability) = self.capabilities.iter().find(|c| c.claims(invocation.task)) {
            debug!(agent = %invocation.identity, capability = capability.name(), "Delegating to capability");
            return capability.handle(invocation).await;
        }
        let prompt = render_task_prompt(invocation.task, invocation.context)?;
        complete_into_output(invocation, &prompt, &self.system_prompt, self.agent_type, None).await
    }
}

/// Keyword-claimed slice of a domain agent with its own focus prompt.
pub struct PromptCapability {
    template: CapabilityTemplate,
    system_prompt: String,
}

impl PromptCapability {
    pub fn new(template: CapabilityTemplate, agent_prompt: &str) -> Self {
        Self {
            template,
            system_prompt: format!("{}\n\nFocus: {}", agent_prompt, template.focus),
        }
    }
}

#[async_trait]
impl Capability for PromptCapability {
    fn name(&self) -> &'static str {
        self.template.name
    }

    fn claims(&self, task: &str) -> bool {
        task.split(|c: char| !c.is_alphanumeric())
            .any(|word| self.template.keywords.iter().any(|k| word.eq_ignore_ascii_case(k)))
    }

    async fn handle(&self, invocation: &TaskInvocation<'_>) -> Result<Map<String, Value>, ConductorError> {
        let prompt = render_task_prompt(invocation.task, invocation.context)?;
        complete_into_output(
            invocation,
            &prompt,
            &self.system_prompt,
            &invocation.identity.agent_type,
            Some(self.template.name),
        ).await
    }
}

fn render_task_prompt(task: &str, context: &Map<String, Value>) -> Result<String, ConductorError> {
    let mut prompt = format!("Task: {}\n", task.trim());
    if !context.is_empty() {
        prompt.push_str("\n## Context\n```json\n");
        prompt.push_str(&serde_json::to_string_pretty(context)?);
        prompt.push_str("\n```\n");
    }
    Ok(prompt)
}

async fn complete_into_output(
    invocation: &TaskInvocation<'_>,
    prompt: &str,
    system: &str,
    agent_type: &str,
    capability: Option<&str>,
) -> Result<Map<String, Value>, ConductorError> {
    let response = invocation.llm.complete(prompt, Some(system), &invocation.config.llm).await?;
    if response.content.trim().is_empty() {
        return Err(ConductorError::AgentFailure(format!(
            "{} returned an empty response", invocation.identity
        )));
    }

    let mut output = Map::new();
    output.insert("response".into(), json!(truncate_output(&response.content)));
    output.insert("agent_type".into(), json!(agent_type));
    if let Some(name) = capability {
        output.insert("capability".into(), json!(name));
    }
    output.insert("model".into(), json!(response.model));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::state::AgentIdentity;
    use crate::llm::{LLMProvider, ScriptedProvider};

    fn invoke<'a>(
        task: &'a str,
        context: &'a Map<String, Value>,
        identity: &'a AgentIdentity,
        config: &'a AgentConfig,
        llm: &'a dyn LLMProvider,
    ) -> TaskInvocation<'a> {
        TaskInvocation { task, context, identity, config, llm, attempt: 1 }
    }

    #[test]
    fn test_six_builtin_types() {
        let types: Vec<_> = DOMAIN_TEMPLATES.iter().map(|t| t.agent_type).collect();
        assert_eq!(types, vec!["sales", "finance", "hr", "support", "development", "marketing"]);
        assert!(builtin_template("hr").is_some());
        assert!(builtin_template("legal").is_none());
    }

    #[test]
    fn test_hr_descriptor_lists_capabilities() {
        let hr = builtin_template("hr").unwrap();
        assert_eq!(hr.descriptor().capabilities, vec!["leave", "performance", "training"]);
    }

    #[test]
    fn test_config_role_overrides_template() {
        let mut config = AgentConfig::new("f1", "Ledger");
        config.role = "auditor".into();
        let agent = PromptAgent::new(*builtin_template("finance").unwrap(), &config);
        assert!(agent.system_prompt().contains("Ledger, a auditor"));
        assert!(agent.system_prompt().contains("surface discrepancies"));
    }

    #[tokio::test]
    async fn test_prompt_agent_output_shape() {
        let llm = ScriptedProvider::new().with_reply("Quote drafted.");
        let config = AgentConfig::new("s1", "Sales");
        let identity = AgentIdentity::new("sales", "s1");
        let context = Map::new();
        let agent = PromptAgent::new(*builtin_template("sales").unwrap(), &config);

        let out = agent.run(&invoke("Draft a quote", &context, &identity, &config, &llm)).await.unwrap();
        assert_eq!(out["response"], "Quote drafted.");
        assert_eq!(out["agent_type"], "sales");
        assert_eq!(out["model"], "scripted");
        assert!(out.get("capability").is_none());
    }

    #[tokio::test]
    async fn test_context_rendered_into_prompt() {
        let llm = ScriptedProvider::new();
        let config = AgentConfig::new("f1", "Finance");
        let identity = AgentIdentity::new("finance", "f1");
        let mut context = Map::new();
        context.insert("invoice_id".into(), json!("INV-42"));
        let agent = PromptAgent::new(*builtin_template("finance").unwrap(), &config);

        agent.run(&invoke("Check the invoice", &context, &identity, &config, &llm)).await.unwrap();
        let prompt = &llm.prompts()[0];
        assert!(prompt.starts_with("Task: Check the invoice"));
        assert!(prompt.contains("INV-42"));
    }

    #[tokio::test]
    async fn test_hr_delegates_to_claiming_capability() {
        let llm = ScriptedProvider::new().with_reply("You have 12 days left.");
        let config = AgentConfig::new("h1", "HR");
        let identity = AgentIdentity::new("hr", "h1");
        let context = Map::new();
        let agent = PromptAgent::new(*builtin_template("hr").unwrap(), &config);

        let out = agent.run(&invoke("How much Vacation do I have?", &context, &identity, &config, &llm)).await.unwrap();
        assert_eq!(out["capability"], "leave");
        assert_eq!(out["agent_type"], "hr");

        let out = agent.run(&invoke("Update my address", &context, &identity, &config, &llm)).await.unwrap();
        assert!(out.get("capability").is_none());
    }

    #[test]
    fn test_capability_claims_whole_words_only() {
        let cap = PromptCapability::new(HR_CAPABILITIES[0], "base");
        assert!(cap.claims("request sick leave for Friday"));
        assert!(!cap.claims("the sickle is broken"));
    }

    #[tokio::test]
    async fn test_empty_response_is_agent_failure() {
        let llm = ScriptedProvider::new().with_reply("   ");
        let config = AgentConfig::new("d1", "Dev");
        let identity = AgentIdentity::new("development", "d1");
        let context = Map::new();
        let agent = PromptAgent::new(*builtin_template("development").unwrap(), &config);

        let err = agent.run(&invoke("fix the bug", &context, &identity, &config, &llm)).await.unwrap_err();
        assert!(matches!(err, ConductorError::AgentFailure(_)));
    }
}
