//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use testplane::adapters::strategies::{builtin_registry, StateGate, JSON_STATE};
use testplane::domain::models::Configuration;
use testplane::{
    Behavior, ControllerConfig, DomainError, DomainResult, InMemoryObjectStore, MutateStateFn, ObjectKey,
    ObjectMeta, ObjectStore, StrategyContext, StrategyDescriptor, StrategyRegistry, SuiteState, TestCase,
    TestCaseBehavior, TestSuite, TestWorker, TestWorkerBehavior,
};

pub const NAMESPACE: &str = "qa";
pub const SUITE: &str = "suite";

/// Test case provider: optionally sleeps, then succeeds or fails.
pub const SCRIPTED: &str = "qa-scripted";

/// Worker provider incrementing the integer at `/counter`.
pub const COUNTER: &str = "qa-counter";

pub fn fast_config() -> ControllerConfig {
    ControllerConfig {
        suite_requeue_interval_ms: 20,
        error_requeue_interval_ms: 20,
        poll_interval_ms: 10,
        cancel_grace_period_ms: 100,
        merge_retry_max_elapsed_ms: 5_000,
        ..ControllerConfig::default()
    }
}

pub struct ScriptedCase {
    gate: StateGate,
    sleep: Duration,
    fail: Option<String>,
}

impl ScriptedCase {
    pub fn provide(configuration: &Configuration) -> DomainResult<Behavior> {
        let sleep = match configuration.get("sleep") {
            Some(raw) => humantime::parse_duration(raw).map_err(|e| DomainError::InvalidConfiguration {
                provider: SCRIPTED.to_string(),
                reason: e.to_string(),
            })?,
            None => Duration::ZERO,
        };
        Ok(Behavior::test_case(Self {
            gate: StateGate::from_configuration(SCRIPTED, configuration)?,
            sleep,
            fail: configuration.get("fail").cloned(),
        }))
    }
}

#[async_trait]
impl TestCaseBehavior for ScriptedCase {
    fn should_run(&self, state: &SuiteState) -> bool {
        self.gate.is_open(state)
    }

    async fn run(&self, ctx: StrategyContext) -> DomainResult<()> {
        tokio::select! {
            () = tokio::time::sleep(self.sleep) => {}
            () = ctx.cancellation.cancelled() => return Err(DomainError::execution("cancelled")),
        }
        match &self.fail {
            Some(message) => Err(DomainError::execution(message)),
            None => Ok(()),
        }
    }
}

pub struct CounterWorker;

#[async_trait]
impl TestWorkerBehavior for CounterWorker {
    fn should_run(&self, _state: &SuiteState) -> bool {
        true
    }

    async fn run(&self, _ctx: StrategyContext) -> DomainResult<MutateStateFn> {
        Ok(Arc::new(|mut state: SuiteState| -> DomainResult<SuiteState> {
            let next = state.pointer("/counter").and_then(Value::as_i64).unwrap_or(0) + 1;
            match state.value_mut() {
                Value::Object(map) => {
                    map.insert("counter".to_string(), Value::from(next));
                }
                other => *other = serde_json::json!({ "counter": next }),
            }
            Ok(state)
        }))
    }
}

/// Built-in providers plus the scripted test providers.
pub fn registry() -> Arc<StrategyRegistry> {
    Arc::new(
        builtin_registry()
            .with_fn(SCRIPTED, ScriptedCase::provide)
            .with_fn(COUNTER, |_: &Configuration| Ok(Behavior::test_worker(CounterWorker))),
    )
}

pub fn suite_key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, SUITE)
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

pub async fn seed_suite(store: &InMemoryObjectStore, initial_state: &str) -> TestSuite {
    store
        .create_suite(
            TestSuite::new(ObjectMeta::new(NAMESPACE, SUITE), StrategyDescriptor::new(JSON_STATE))
                .with_initial_state(initial_state),
        )
        .await
        .expect("failed to create suite")
}

pub async fn seed_case(store: &InMemoryObjectStore, name: &str, strategy: StrategyDescriptor) -> TestCase {
    store
        .create_test_case(TestCase::new(ObjectMeta::new(NAMESPACE, name), strategy))
        .await
        .expect("failed to create test case")
}

pub async fn seed_case_with_timeout(
    store: &InMemoryObjectStore,
    name: &str,
    strategy: StrategyDescriptor,
    timeout: &str,
) -> TestCase {
    store
        .create_test_case(TestCase::new(ObjectMeta::new(NAMESPACE, name), strategy).with_timeout(timeout))
        .await
        .expect("failed to create test case")
}

pub async fn seed_worker(store: &InMemoryObjectStore, name: &str, strategy: StrategyDescriptor) -> TestWorker {
    store
        .create_test_worker(TestWorker::new(ObjectMeta::new(NAMESPACE, name), strategy))
        .await
        .expect("failed to create test worker")
}

pub async fn get_case(store: &InMemoryObjectStore, name: &str) -> TestCase {
    store
        .get_test_case(&key(name))
        .await
        .expect("failed to get test case")
        .expect("test case missing")
}

pub async fn get_suite(store: &InMemoryObjectStore) -> TestSuite {
    store
        .get_suite(&suite_key())
        .await
        .expect("failed to get suite")
        .expect("suite missing")
}

/// Overwrite the suite's persisted state, as an external writer would.
pub async fn write_state(store: &InMemoryObjectStore, state: Value) {
    let mut suite = get_suite(store).await;
    suite.status.current_state = state.to_string();
    store.update_suite_status(&suite).await.expect("failed to write state");
}

pub fn suite_state(suite: &TestSuite) -> Value {
    serde_json::from_str(suite.state_text()).expect("suite state is not JSON")
}
