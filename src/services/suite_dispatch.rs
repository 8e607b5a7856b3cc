//! Suite reconciliation and dispatch.
//!
//! Every invocation reconciles the suite's state through its state strategy,
//! persists the result and then flips every queued test case and worker whose
//! `should_run` predicate holds on the fresh state to dispatched. The engine
//! keeps nothing between calls; exactly-once dispatch rests on the write-once
//! `dispatched_at` and the store's version check.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ControllerConfig, ObjectKey, ObjectKind, SuiteState, TestCase, TestCasePhase, TestSuite, TestWorker,
};
use crate::domain::ports::{ObjectStore, ReconcileAction, Reconciler, StoreError, StrategyContext};
use crate::services::strategy_registry::StrategyRegistry;

/// Names of the objects one dispatch pass moved to dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub test_cases: Vec<String>,
    pub test_workers: Vec<String>,
    /// Objects left queued because of a resolution failure or a lost update.
    pub skipped: usize,
}

impl DispatchReport {
    pub fn dispatched(&self) -> usize {
        self.test_cases.len() + self.test_workers.len()
    }
}

enum Dispatch {
    Dispatched,
    Waiting,
    Skipped,
}

/// Reconciler for [`TestSuite`] objects.
pub struct SuiteDispatchEngine {
    store: Arc<dyn ObjectStore>,
    registry: Arc<StrategyRegistry>,
    config: ControllerConfig,
}

impl SuiteDispatchEngine {
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<StrategyRegistry>, config: ControllerConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Resolve the suite's state strategy and run one reconcile over its
    /// current state.
    pub async fn reconcile_state(&self, suite: &TestSuite) -> DomainResult<SuiteState> {
        let reconciler = self
            .registry
            .resolve_state_reconciler(&suite.spec.state_strategy)
            .map_err(|e| DomainError::StrategyResolutionFailed(Box::new(e)))?;

        let ctx = StrategyContext::new(self.store.clone(), suite.metadata.namespace.clone());
        let current = reconciler.parse_erased(suite.state_text())?;
        reconciler.reconcile_erased(&ctx, current).await
    }

    /// Dispatch every queued test case and worker of `namespace` whose
    /// predicate holds on `state`.
    pub async fn dispatch(&self, namespace: &str, state: &SuiteState) -> DomainResult<DispatchReport> {
        let mut report = DispatchReport::default();

        for test_case in self.store.list_test_cases(Some(namespace)).await? {
            if test_case.is_dispatched() {
                continue;
            }
            let name = test_case.metadata.name.clone();
            match self.try_dispatch_test_case(test_case, state).await {
                Dispatch::Dispatched => report.test_cases.push(name),
                Dispatch::Waiting => {}
                Dispatch::Skipped => report.skipped += 1,
            }
        }

        for worker in self.store.list_test_workers(Some(namespace)).await? {
            if worker.is_dispatched() {
                continue;
            }
            let name = worker.metadata.name.clone();
            match self.try_dispatch_worker(worker, state).await {
                Dispatch::Dispatched => report.test_workers.push(name),
                Dispatch::Waiting => {}
                Dispatch::Skipped => report.skipped += 1,
            }
        }

        Ok(report)
    }

    async fn try_dispatch_test_case(&self, mut test_case: TestCase, state: &SuiteState) -> Dispatch {
        let key = test_case.metadata.key();
        let behavior = match self.registry.resolve_test_case(&test_case.spec.strategy) {
            Ok(behavior) => behavior,
            Err(err) => {
                warn!(test_case = %key, error = %err, "cannot resolve test case strategy, leaving it queued");
                return Dispatch::Skipped;
            }
        };

        if !behavior.should_run(state) {
            return Dispatch::Waiting;
        }

        test_case.status.dispatched_at = Some(Utc::now());
        test_case.status.status = TestCasePhase::Dispatched;
        match self.store.update_test_case_status(&test_case).await {
            Ok(_) => {
                info!(test_case = %key, "test case dispatched");
                Dispatch::Dispatched
            }
            Err(err) => {
                skip_failed_update(ObjectKind::TestCase, &key, &err);
                Dispatch::Skipped
            }
        }
    }

    async fn try_dispatch_worker(&self, mut worker: TestWorker, state: &SuiteState) -> Dispatch {
        let key = worker.metadata.key();
        let behavior = match self.registry.resolve_test_worker(&worker.spec.strategy) {
            Ok(behavior) => behavior,
            Err(err) => {
                warn!(worker = %key, error = %err, "cannot resolve worker strategy, leaving it queued");
                return Dispatch::Skipped;
            }
        };

        if !behavior.should_run(state) {
            return Dispatch::Waiting;
        }

        worker.status.dispatched_at = Some(Utc::now());
        match self.store.update_test_worker_status(&worker).await {
            Ok(_) => {
                info!(worker = %key, "test worker dispatched");
                Dispatch::Dispatched
            }
            Err(err) => {
                skip_failed_update(ObjectKind::TestWorker, &key, &err);
                Dispatch::Skipped
            }
        }
    }

    /// Record a reconcile failure on the suite; identical errors are not
    /// rewritten.
    async fn record_error(&self, mut suite: TestSuite, err: &DomainError) -> DomainResult<()> {
        let message = err.to_string();
        if suite.status.error.as_deref() == Some(message.as_str()) {
            return Ok(());
        }
        suite.status.error = Some(message);
        self.store.update_suite_status(&suite).await?;
        Ok(())
    }
}

fn skip_failed_update(kind: ObjectKind, key: &ObjectKey, err: &StoreError) {
    match err {
        StoreError::NotFound { .. } => debug!(kind = %kind, key = %key, "object disappeared before dispatch"),
        _ => warn!(kind = %kind, key = %key, error = %err, "dispatch update failed, will retry next pass"),
    }
}

#[async_trait]
impl Reconciler for SuiteDispatchEngine {
    fn kind(&self) -> ObjectKind {
        ObjectKind::TestSuite
    }

    #[instrument(skip(self, key), fields(suite = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> DomainResult<ReconcileAction> {
        let Some(suite) = self.store.get_suite(key).await? else {
            debug!("suite not found, nothing to do");
            return Ok(ReconcileAction::done());
        };

        let rendered = self
            .reconcile_state(&suite)
            .await
            .and_then(|state| state.to_json_pretty().map(|text| (state, text)));
        let (state, text) = match rendered {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(error = %err, "suite state reconcile failed");
                self.record_error(suite, &err).await?;
                return Ok(ReconcileAction::requeue(self.config.error_requeue_interval()));
            }
        };

        let mut next = suite.clone();
        next.status.current_state = text;
        next.status.error = None;
        if next.status != suite.status {
            self.store.update_suite_status(&next).await?;
            debug!("suite state persisted");
        }

        let report = self.dispatch(&suite.metadata.namespace, &state).await?;
        if report.dispatched() > 0 || report.skipped > 0 {
            info!(
                test_cases = report.test_cases.len(),
                test_workers = report.test_workers.len(),
                skipped = report.skipped,
                "dispatch pass complete"
            );
        }

        Ok(ReconcileAction::requeue(self.config.suite_requeue_interval()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryObjectStore;
    use crate::domain::models::{ObjectMeta, StrategyDescriptor};
    use crate::domain::ports::{
        no_mutate, Behavior, MutateStateFn, StateReconciler, TestCaseBehavior, TestWorkerBehavior,
    };
    use serde_json::{json, Value};

    /// Increments `/ticks` on every reconcile.
    struct Ticker;

    #[async_trait]
    impl StateReconciler for Ticker {
        type State = Value;

        async fn reconcile(&self, _ctx: &StrategyContext, mut current: Value) -> DomainResult<Value> {
            let ticks = current.get("ticks").and_then(Value::as_u64).unwrap_or(0);
            current["ticks"] = json!(ticks + 1);
            Ok(current)
        }
    }

    /// Runs once `/ticks` reaches `at`.
    struct AtTick(u64);

    #[async_trait]
    impl TestCaseBehavior for AtTick {
        fn should_run(&self, state: &SuiteState) -> bool {
            state.pointer("/ticks").and_then(Value::as_u64).unwrap_or(0) >= self.0
        }

        async fn run(&self, _ctx: StrategyContext) -> DomainResult<()> {
            Ok(())
        }
    }

    struct Always;

    #[async_trait]
    impl TestWorkerBehavior for Always {
        fn should_run(&self, _state: &SuiteState) -> bool {
            true
        }

        async fn run(&self, _ctx: StrategyContext) -> DomainResult<MutateStateFn> {
            Ok(no_mutate())
        }
    }

    fn registry() -> Arc<StrategyRegistry> {
        Arc::new(
            StrategyRegistry::new()
                .with_fn("ticker", |_| Ok(Behavior::state_reconciler(Ticker)))
                .with_fn("at-tick", |config| {
                    let at = config.get("at").and_then(|v| v.parse().ok()).unwrap_or(1);
                    Ok(Behavior::test_case(AtTick(at)))
                })
                .with_fn("always", |_| Ok(Behavior::test_worker(Always))),
        )
    }

    async fn setup() -> (Arc<InMemoryObjectStore>, SuiteDispatchEngine) {
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .create_suite(TestSuite::new(ObjectMeta::new("qa", "suite"), StrategyDescriptor::new("ticker")))
            .await
            .unwrap();
        let engine = SuiteDispatchEngine::new(store.clone(), registry(), ControllerConfig::default());
        (store, engine)
    }

    #[tokio::test]
    async fn test_missing_suite_is_noop() {
        let (_store, engine) = setup().await;
        let action = engine.reconcile(&ObjectKey::new("qa", "ghost")).await.unwrap();
        assert_eq!(action, ReconcileAction::done());
    }

    #[tokio::test]
    async fn test_state_is_persisted_and_requeued() {
        let (store, engine) = setup().await;
        let key = ObjectKey::new("qa", "suite");

        let action = engine.reconcile(&key).await.unwrap();
        assert_eq!(action.requeue_after, Some(ControllerConfig::default().suite_requeue_interval()));

        let suite = store.get_suite(&key).await.unwrap().unwrap();
        let state = SuiteState::parse(&suite.status.current_state).unwrap();
        assert_eq!(state.pointer("/ticks"), Some(&json!(1)));
        assert!(suite.status.current_state.contains('\n'), "state is pretty printed");

        engine.reconcile(&key).await.unwrap();
        let suite = store.get_suite(&key).await.unwrap().unwrap();
        let state = SuiteState::parse(&suite.status.current_state).unwrap();
        assert_eq!(state.pointer("/ticks"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_dispatch_gated_by_predicate() {
        let (store, engine) = setup().await;
        store
            .create_test_case(TestCase::new(
                ObjectMeta::new("qa", "late"),
                StrategyDescriptor::new("at-tick").with("at", "2"),
            ))
            .await
            .unwrap();
        let case_key = ObjectKey::new("qa", "late");
        let suite_key = ObjectKey::new("qa", "suite");

        engine.reconcile(&suite_key).await.unwrap();
        let case = store.get_test_case(&case_key).await.unwrap().unwrap();
        assert!(!case.is_dispatched());
        assert_eq!(case.status.status, TestCasePhase::Created);

        engine.reconcile(&suite_key).await.unwrap();
        let case = store.get_test_case(&case_key).await.unwrap().unwrap();
        assert!(case.is_dispatched());
        assert_eq!(case.status.status, TestCasePhase::Dispatched);
    }

    #[tokio::test]
    async fn test_dispatched_at_is_written_once() {
        let (store, engine) = setup().await;
        store
            .create_test_case(TestCase::new(ObjectMeta::new("qa", "now"), StrategyDescriptor::new("at-tick")))
            .await
            .unwrap();
        let case_key = ObjectKey::new("qa", "now");
        let suite_key = ObjectKey::new("qa", "suite");

        engine.reconcile(&suite_key).await.unwrap();
        let first = store.get_test_case(&case_key).await.unwrap().unwrap();

        engine.reconcile(&suite_key).await.unwrap();
        engine.reconcile(&suite_key).await.unwrap();
        let later = store.get_test_case(&case_key).await.unwrap().unwrap();

        assert_eq!(first.status.dispatched_at, later.status.dispatched_at);
        assert_eq!(first.metadata.resource_version, later.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_unresolvable_case_does_not_block_others() {
        let (store, engine) = setup().await;
        store
            .create_test_case(TestCase::new(ObjectMeta::new("qa", "a-broken"), StrategyDescriptor::new("missing")))
            .await
            .unwrap();
        store
            .create_test_case(TestCase::new(ObjectMeta::new("qa", "b-ok"), StrategyDescriptor::new("at-tick")))
            .await
            .unwrap();

        let suite = store.get_suite(&ObjectKey::new("qa", "suite")).await.unwrap().unwrap();
        let state = engine.reconcile_state(&suite).await.unwrap();
        let report = engine.dispatch("qa", &state).await.unwrap();

        assert_eq!(report.test_cases, vec!["b-ok".to_string()]);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_lost_dispatch_update_is_skipped() {
        let (store, engine) = setup().await;
        store
            .create_test_case(TestCase::new(ObjectMeta::new("qa", "a"), StrategyDescriptor::new("at-tick")))
            .await
            .unwrap();
        store.inject_conflicts(ObjectKind::TestCase, 1).await;

        let state = SuiteState::new(json!({"ticks": 5}));
        let report = engine.dispatch("qa", &state).await.unwrap();
        assert!(report.test_cases.is_empty());
        assert_eq!(report.skipped, 1);

        let report = engine.dispatch("qa", &state).await.unwrap();
        assert_eq!(report.test_cases, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_workers_dispatched_in_same_pass() {
        let (store, engine) = setup().await;
        store
            .create_test_worker(TestWorker::new(ObjectMeta::new("qa", "w"), StrategyDescriptor::new("always")))
            .await
            .unwrap();
        store
            .create_test_worker(TestWorker::new(ObjectMeta::new("elsewhere", "w"), StrategyDescriptor::new("always")))
            .await
            .unwrap();

        engine.reconcile(&ObjectKey::new("qa", "suite")).await.unwrap();

        let local = store.get_test_worker(&ObjectKey::new("qa", "w")).await.unwrap().unwrap();
        let remote = store
            .get_test_worker(&ObjectKey::new("elsewhere", "w"))
            .await
            .unwrap()
            .unwrap();
        assert!(local.is_dispatched());
        assert!(!remote.is_dispatched());
    }

    #[tokio::test]
    async fn test_resolution_failure_recorded_on_status() {
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .create_suite(TestSuite::new(ObjectMeta::new("qa", "suite"), StrategyDescriptor::new("nope")))
            .await
            .unwrap();
        let config = ControllerConfig::default();
        let engine = SuiteDispatchEngine::new(store.clone(), registry(), config.clone());
        let key = ObjectKey::new("qa", "suite");

        let action = engine.reconcile(&key).await.unwrap();
        assert_eq!(action.requeue_after, Some(config.error_requeue_interval()));

        let suite = store.get_suite(&key).await.unwrap().unwrap();
        let error = suite.status.error.expect("error should be recorded");
        assert!(error.starts_with("Error obtaining strategy"), "{error}");
        assert!(suite.status.current_state.is_empty());

        engine.reconcile(&key).await.unwrap();
        assert_eq!(store.update_count(ObjectKind::TestSuite).await, 1);
    }

    #[tokio::test]
    async fn test_persist_failure_surfaces_as_error() {
        let (store, engine) = setup().await;
        store.inject_conflicts(ObjectKind::TestSuite, 1).await;

        let err = engine.reconcile(&ObjectKey::new("qa", "suite")).await.unwrap_err();
        assert!(err.is_transient());
    }
}
