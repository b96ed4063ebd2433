use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor::agents::{
    AgentBlueprint, AgentConfig, AgentLogic, AgentRegistry, AgentState, TaskInvocation,
};
use conductor::errors::{with_retry, ConductorError, RetryPolicy};
use conductor::llm::ScriptedProvider;
use conductor::persistence::{MemoryStore, SqliteStore, StateStore};
use conductor::routing::{AgentRouter, RouteMethod, KEYWORD_CONFIDENCE};
use conductor::workflow::{Workflow, WorkflowDefinition, WorkflowStatus};
use serde_json::{json, Map, Value};

fn fast_config() -> AgentConfig {
    let mut config = AgentConfig::new("", "");
    config.retry_base_delay_ms = 1;
    config.retry_max_delay_ms = 5;
    config
}

fn registry(llm: ScriptedProvider, store: Option<Arc<dyn StateStore>>) -> AgentRegistry {
    AgentRegistry::with_builtin_types(Arc::new(llm), store)
        .unwrap()
        .with_base_config(fast_config())
}

/// Fails until `succeed_after` calls have been made.
struct Flaky {
    calls: Arc<AtomicU32>,
    succeed_after: u32,
}

#[async_trait]
impl AgentLogic for Flaky {
    async fn run(&self, _invocation: &TaskInvocation<'_>) -> Result<Map<String, Value>, ConductorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.succeed_after {
            return Err(ConductorError::AgentFailure(format!("failure {}", n)));
        }
        let mut out = Map::new();
        out.insert("call".into(), json!(n));
        Ok(out)
    }
}

#[tokio::test]
async fn transient_failures_inside_a_step_are_retried() {
    let llm = ScriptedProvider::new()
        .with_reply("Lead qualified")
        .with_error(ConductorError::Network("connection reset".into()))
        .with_error(ConductorError::Network("connection reset".into()))
        .with_reply("Invoice drafted")
        .with_reply("Customer notified");
    let registry = Arc::new(registry(llm, None));

    let definition = WorkflowDefinition::from_yaml(
        r#"
name: order
steps:
  - {name: a, agent_type: sales, task: "Qualify {customer}", output_key: a}
  - {name: b, agent_type: finance, task: "Invoice {customer}", output_key: b}
  - {name: c, agent_type: support, task: "Notify {customer}", output_key: c}
"#,
    )
    .unwrap();
    let workflow = definition.build(registry, None).unwrap();
    let initial = json!({"customer": "Acme"}).as_object().cloned().unwrap();
    let result = workflow.execute(initial).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.status, WorkflowStatus::Completed);
    let b = result.step("b").unwrap();
    assert_eq!(b.status, WorkflowStatus::Completed);
    assert_eq!(b.metadata["attempts"], 3);
    assert_eq!(result.step("a").unwrap().metadata["attempts"], 1);
    assert_eq!(result.data["b"]["response"], "Invoice drafted");
    assert_eq!(result.data["c"]["response"], "Customer notified");
}

#[tokio::test]
async fn breaker_opens_after_threshold_and_recovers() {
    let calls = Arc::new(AtomicU32::new(0));
    let registry = AgentRegistry::new(Arc::new(ScriptedProvider::new()), None);
    let counter = calls.clone();
    registry
        .register_type(Arc::new(AgentBlueprint::new("flaky", "Fails twice, then works", move |_| {
            Ok(Box::new(Flaky { calls: counter.clone(), succeed_after: 2 }) as Box<dyn AgentLogic>)
        })))
        .unwrap();

    let mut config = AgentConfig::new("f1", "Flaky");
    config.retry_max_attempts = 1;
    config.circuit_breaker_threshold = 2;
    config.circuit_breaker_reset_secs = 0.05;
    let agent = registry.create_agent("flaky", "f1", Some(config)).await.unwrap();

    let ctx = Map::new();
    assert!(matches!(agent.execute("t", &ctx).await, Err(ConductorError::AgentFailure(_))));
    assert!(matches!(agent.execute("t", &ctx).await, Err(ConductorError::AgentFailure(_))));
    assert!(matches!(agent.execute("t", &ctx).await, Err(ConductorError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let execution = agent.execute("t", &ctx).await.unwrap();
    assert_eq!(execution.output["call"], 3);
    assert_eq!(agent.state(), AgentState::Idle);
}

#[tokio::test]
async fn registry_caches_and_clear_all_persists() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(ScriptedProvider::new(), Some(store.clone() as Arc<dyn StateStore>));

    let created = registry.create_agent("sales", "s1", None).await.unwrap();
    let fetched = registry.get_agent("sales", "s1").unwrap();
    assert!(Arc::ptr_eq(&created, &fetched));
    let again = registry.get_or_create("sales", "s1").await.unwrap();
    assert!(Arc::ptr_eq(&created, &again));

    assert_eq!(registry.clear_all().await, 1);
    assert!(registry.get_agent("sales", "s1").is_none());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn keyword_fallback_when_classifier_unavailable() {
    let registry = Arc::new(registry(ScriptedProvider::new(), None));
    let router = AgentRouter::new(registry, Some(Arc::new(ScriptedProvider::unavailable())));
    let decision = router
        .route("Review this invoice for discrepancies", &Map::new())
        .await
        .unwrap();
    assert_eq!(decision.agent_type, "finance");
    assert_eq!(decision.confidence, KEYWORD_CONFIDENCE);
    assert_eq!(decision.method, RouteMethod::Keyword);
}

#[tokio::test]
async fn zero_step_workflow_returns_initial_data() {
    let initial = json!({"ticket": 42, "priority": "high"}).as_object().cloned().unwrap();
    let result = Workflow::new("noop").execute(initial.clone()).await;
    assert!(result.success);
    assert_eq!(result.data, initial);
    assert!(result.steps.is_empty());
}

#[tokio::test]
async fn failing_step_stops_the_workflow() {
    let llm = Arc::new(
        ScriptedProvider::new()
            .with_reply("qualified")
            .with_error(ConductorError::Llm("model refused".into())),
    );
    let registry = Arc::new(
        AgentRegistry::with_builtin_types(llm.clone(), None)
            .unwrap()
            .with_base_config(fast_config()),
    );
    let definition = WorkflowDefinition::from_yaml(
        "name: w\nsteps:\n  - {name: a, agent_type: sales, task: go}\n  - {name: b, agent_type: finance, task: go}\n  - {name: c, agent_type: hr, task: go}\n",
    )
    .unwrap();
    let result = definition.build(registry, None).unwrap().execute(Map::new()).await;

    assert!(!result.success);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.step("a").unwrap().status, WorkflowStatus::Completed);
    assert_eq!(result.step("b").unwrap().status, WorkflowStatus::Failed);
    assert!(result.step("c").is_none());
    assert_eq!(llm.calls(), 2);
}

#[tokio::test]
async fn state_survives_a_restart_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");

    let before = {
        let store: Arc<dyn StateStore> = Arc::new(SqliteStore::open(&path).unwrap());
        let registry = registry(ScriptedProvider::new(), Some(store));
        let agent = registry.create_agent("support", "desk", None).await.unwrap();
        agent.execute("Reset my password", &Map::new()).await.unwrap();
        agent.execute("Where is my order", &Map::new()).await.unwrap();
        let snapshot = agent.snapshot();
        assert!(registry.save_state(&agent).await);
        snapshot
    };

    let store: Arc<dyn StateStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let registry = registry(ScriptedProvider::new(), Some(store));
    let restored = registry.create_agent("support", "desk", None).await.unwrap();
    assert_eq!(restored.state(), before.state);
    assert_eq!(restored.metrics().tasks_processed, 2);
    assert_eq!(restored.metrics(), before.metrics);
}

#[tokio::test]
async fn retry_invocation_counts() {
    let policy = RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: false,
    };

    for transient_failures in 0..6u32 {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = with_retry("counted", &policy, |_| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < transient_failures {
                    Err(ConductorError::Timeout("slow".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        if transient_failures < policy.max_attempts {
            assert_eq!(calls.load(Ordering::SeqCst), transient_failures + 1);
            assert_eq!(outcome.result.unwrap(), transient_failures);
        } else {
            assert_eq!(calls.load(Ordering::SeqCst), policy.max_attempts);
            assert!(matches!(outcome.result, Err(ConductorError::Timeout(_))));
        }
    }
}
