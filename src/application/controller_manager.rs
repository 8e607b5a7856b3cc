//! Polling controller manager.
//!
//! Stands in for a watch-driven trigger. Every poll tick it lists each
//! reconciled kind and spawns a reconcile for every object that changed since
//! it was last reconciled (its `resource_version` moved) or whose requested
//! requeue time has passed.
//!
//! Guarantees:
//! - at most one reconcile in flight per object;
//! - at most `max_concurrent_reconciles` reconciles of each kind running at
//!   once, so long test bodies never hold back suite passes;
//! - an `Err` from a reconciler is logged and requeued after
//!   `error_requeue_interval`, never propagated.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ControllerConfig, ObjectKey, ObjectKind, Resource, TestWorker};
use crate::domain::ports::{ObjectStore, ReconcileAction, Reconciler};
use crate::services::{StrategyRegistry, SuiteDispatchEngine, TestCaseLifecycle, WorkerLifecycle};

type TrackedKey = (ObjectKind, ObjectKey);

/// Per-object bookkeeping between polls.
#[derive(Debug, Default)]
struct Tracked {
    observed_version: Option<u64>,
    requeue_at: Option<Instant>,
    in_flight: bool,
}

impl Tracked {
    fn is_due(&self, version: u64, now: Instant) -> bool {
        !self.in_flight
            && (self.observed_version != Some(version) || self.requeue_at.is_some_and(|at| at <= now))
    }
}

/// How [`ControllerManager::run_until_settled`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Every test case is terminal and every worker finished.
    Complete,
    /// Nothing is running and nothing changed for two suite requeue intervals.
    Stalled,
    TimedOut,
    /// The manager was shut down from outside.
    Interrupted,
}

impl Settlement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Stalled => "stalled",
            Self::TimedOut => "timed-out",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Store contents relevant to settling.
#[derive(Debug)]
struct Snapshot {
    complete: bool,
    idle: bool,
    versions: Vec<(ObjectKind, ObjectKey, u64)>,
}

/// One concurrency limit per reconciled kind.
struct PermitPools {
    suites: Arc<Semaphore>,
    test_cases: Arc<Semaphore>,
    test_workers: Arc<Semaphore>,
}

impl PermitPools {
    fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            suites: Arc::new(Semaphore::new(limit)),
            test_cases: Arc::new(Semaphore::new(limit)),
            test_workers: Arc::new(Semaphore::new(limit)),
        }
    }

    fn for_kind(&self, kind: ObjectKind) -> Arc<Semaphore> {
        match kind {
            ObjectKind::TestSuite => self.suites.clone(),
            ObjectKind::TestCase => self.test_cases.clone(),
            ObjectKind::TestWorker => self.test_workers.clone(),
        }
    }
}

/// Result of one spawned reconcile.
struct Completion {
    kind: ObjectKind,
    key: ObjectKey,
    version: u64,
    result: DomainResult<ReconcileAction>,
}

/// Drives a set of [`Reconciler`]s against an [`ObjectStore`].
pub struct ControllerManager {
    store: Arc<dyn ObjectStore>,
    reconcilers: Vec<Arc<dyn Reconciler>>,
    config: ControllerConfig,
    permits: PermitPools,
    shutdown: CancellationToken,
}

impl ControllerManager {
    pub fn new(store: Arc<dyn ObjectStore>, config: ControllerConfig) -> Self {
        let permits = PermitPools::new(config.max_concurrent_reconciles);
        Self {
            store,
            reconcilers: Vec::new(),
            config,
            permits,
            shutdown: CancellationToken::new(),
        }
    }

    /// Manager wired with the suite, test case and worker reconcilers.
    pub fn with_standard_reconcilers(
        store: Arc<dyn ObjectStore>,
        registry: Arc<StrategyRegistry>,
        config: ControllerConfig,
    ) -> Self {
        Self::new(store.clone(), config.clone())
            .with_reconciler(Arc::new(SuiteDispatchEngine::new(
                store.clone(),
                registry.clone(),
                config.clone(),
            )))
            .with_reconciler(Arc::new(TestCaseLifecycle::new(
                store.clone(),
                registry.clone(),
                config.clone(),
            )))
            .with_reconciler(Arc::new(WorkerLifecycle::new(store, registry, config)))
    }

    #[must_use]
    pub fn with_reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.reconcilers.push(reconciler);
        self
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Poll and reconcile until shut down. In-flight reconciles get
    /// `cancel_grace_period` to finish before they are aborted.
    pub async fn run(&self) {
        let mut tracked: HashMap<TrackedKey, Tracked> = HashMap::new();
        let mut tasks: JoinSet<Completion> = JoinSet::new();
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            reconcilers = self.reconcilers.len(),
            poll_interval = ?self.config.poll_interval(),
            "controller manager started"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.poll(&mut tracked, &mut tasks).await,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok(done) => self.complete(&mut tracked, done),
                    Err(err) => error!(error = %err, "reconcile task did not complete"),
                },
            }
        }

        let grace = self.config.cancel_grace_period();
        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(remaining = tasks.len(), "aborting in-flight reconciles");
            tasks.shutdown().await;
        }
        info!("controller manager stopped");
    }

    /// Run until the objects in the store settle, or until `limit` elapses.
    ///
    /// The run is [`Settlement::Complete`] once every test case is terminal
    /// and every worker finished. It is [`Settlement::Stalled`] when nothing
    /// dispatched is still running and the store has not changed for two
    /// suite requeue intervals, so undispatched work is waiting on state that
    /// no one will write.
    pub async fn run_until_settled(&self, limit: Option<Duration>) -> DomainResult<Settlement> {
        let started = Instant::now();
        let quiet_period = self.config.suite_requeue_interval() * 2;
        let watch = async {
            let mut ticker = interval(self.config.poll_interval());
            let mut last_seen: Option<(Snapshot, Instant)> = None;
            let outcome = loop {
                ticker.tick().await;
                if self.shutdown.is_cancelled() {
                    break Ok(Settlement::Interrupted);
                }
                let snapshot = match self.snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(err) => break Err(err),
                };
                if snapshot.complete {
                    break Ok(Settlement::Complete);
                }

                let now = Instant::now();
                let quiet_since = match last_seen.take() {
                    Some((previous, since)) if previous.versions == snapshot.versions => since,
                    _ => now,
                };
                if snapshot.idle && now.duration_since(quiet_since) >= quiet_period {
                    break Ok(Settlement::Stalled);
                }
                last_seen = Some((snapshot, quiet_since));

                if limit.is_some_and(|limit| started.elapsed() >= limit) {
                    break Ok(Settlement::TimedOut);
                }
            };
            self.shutdown();
            outcome
        };

        let ((), outcome) = tokio::join!(self.run(), watch);
        outcome
    }

    /// Whether every test case is terminal and every worker finished.
    pub async fn is_settled(&self) -> DomainResult<bool> {
        Ok(self.snapshot().await?.complete)
    }

    async fn snapshot(&self) -> DomainResult<Snapshot> {
        let cases = self.store.list_test_cases(None).await?;
        let workers = self.store.list_test_workers(None).await?;
        let suites = self.store.list_suites(None).await?;

        let complete = cases.iter().all(|c| c.status.status.is_terminal()) && workers.iter().all(TestWorker::is_finished);
        let idle = cases.iter().all(|c| !c.is_dispatched() || c.status.status.is_terminal())
            && workers.iter().all(|w| !w.is_dispatched() || w.is_finished());

        let mut versions: Vec<(ObjectKind, ObjectKey, u64)> = Vec::new();
        versions.extend(suites.iter().map(|o| (ObjectKind::TestSuite, o.key(), o.meta().resource_version)));
        versions.extend(cases.iter().map(|o| (ObjectKind::TestCase, o.key(), o.meta().resource_version)));
        versions.extend(workers.iter().map(|o| (ObjectKind::TestWorker, o.key(), o.meta().resource_version)));
        versions.sort();

        Ok(Snapshot {
            complete,
            idle,
            versions,
        })
    }

    async fn poll(&self, tracked: &mut HashMap<TrackedKey, Tracked>, tasks: &mut JoinSet<Completion>) {
        let now = Instant::now();

        for reconciler in &self.reconcilers {
            let kind = reconciler.kind();
            let versions = match self.list_versions(kind).await {
                Ok(versions) => versions,
                Err(err) => {
                    warn!(kind = %kind, error = %err, "failed to list objects");
                    continue;
                }
            };

            let live: HashSet<&ObjectKey> = versions.iter().map(|(key, _)| key).collect();
            tracked.retain(|(k, key), state| *k != kind || state.in_flight || live.contains(key));

            for (key, version) in &versions {
                let state = tracked.entry((kind, key.clone())).or_default();
                if !state.is_due(*version, now) {
                    continue;
                }
                state.in_flight = true;
                state.requeue_at = None;

                tasks.spawn(reconcile_one(
                    reconciler.clone(),
                    self.permits.for_kind(kind),
                    kind,
                    key.clone(),
                    *version,
                ));
            }
        }
    }

    fn complete(&self, tracked: &mut HashMap<TrackedKey, Tracked>, done: Completion) {
        let state = tracked.entry((done.kind, done.key.clone())).or_default();
        state.in_flight = false;
        state.observed_version = Some(done.version);

        match done.result {
            Ok(action) => {
                state.requeue_at = action.requeue_after.map(|after| Instant::now() + after);
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(kind = %done.kind, key = %done.key, error = %err, "reconcile conflicted, requeueing");
                } else {
                    error!(kind = %done.kind, key = %done.key, error = %err, "reconcile failed, requeueing");
                }
                state.requeue_at = Some(Instant::now() + self.config.error_requeue_interval());
            }
        }
    }

    async fn list_versions(&self, kind: ObjectKind) -> DomainResult<Vec<(ObjectKey, u64)>> {
        Ok(match kind {
            ObjectKind::TestSuite => versions(self.store.list_suites(None).await?),
            ObjectKind::TestCase => versions(self.store.list_test_cases(None).await?),
            ObjectKind::TestWorker => versions(self.store.list_test_workers(None).await?),
        })
    }
}

fn versions<R: Resource>(objects: Vec<R>) -> Vec<(ObjectKey, u64)> {
    objects
        .iter()
        .map(|obj| (obj.key(), obj.meta().resource_version))
        .collect()
}

async fn reconcile_one(
    reconciler: Arc<dyn Reconciler>,
    permits: Arc<Semaphore>,
    kind: ObjectKind,
    key: ObjectKey,
    version: u64,
) -> Completion {
    // The semaphore is never closed, so a failed acquire cannot happen.
    let _permit = permits.acquire_owned().await.ok();
    debug!(kind = %kind, key = %key, version, "reconciling");

    let result = AssertUnwindSafe(reconciler.reconcile(&key))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(DomainError::execution(format!("{kind} reconciler panicked on {key}"))));

    Completion {
        kind,
        key,
        version,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::adapters::memory::InMemoryObjectStore;
    use crate::domain::models::{ObjectMeta, StrategyDescriptor, TestCase, TestSuite};

    /// Records concurrency per key and returns a scripted action.
    struct CountingReconciler {
        active: Mutex<HashMap<ObjectKey, usize>>,
        max_active: AtomicUsize,
        calls: AtomicUsize,
        fail_first: bool,
        hold: Duration,
        action: ReconcileAction,
        kind: ObjectKind,
    }

    impl CountingReconciler {
        fn new(hold: Duration, action: ReconcileAction) -> Self {
            Self {
                active: Mutex::new(HashMap::new()),
                max_active: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                fail_first: false,
                hold,
                action,
                kind: ObjectKind::TestCase,
            }
        }
    }

    #[async_trait]
    impl Reconciler for CountingReconciler {
        fn kind(&self) -> ObjectKind {
            self.kind
        }

        async fn reconcile(&self, key: &ObjectKey) -> DomainResult<ReconcileAction> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            {
                let mut active = self.active.lock().await;
                let count = active.entry(key.clone()).or_insert(0);
                *count += 1;
                self.max_active.fetch_max(*count, Ordering::SeqCst);
            }

            tokio::time::sleep(self.hold).await;
            *self.active.lock().await.entry(key.clone()).or_insert(1) -= 1;

            if self.fail_first && call == 0 {
                return Err(DomainError::execution("first call fails"));
            }
            Ok(self.action)
        }
    }

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            poll_interval_ms: 10,
            error_requeue_interval_ms: 20,
            cancel_grace_period_ms: 100,
            ..ControllerConfig::default()
        }
    }

    async fn store_with_case() -> Arc<InMemoryObjectStore> {
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .create_test_case(TestCase::new(ObjectMeta::new("qa", "case"), StrategyDescriptor::new("noop")))
            .await
            .unwrap();
        store
    }

    async fn run_for(manager: &ControllerManager, duration: Duration) {
        let token = manager.shutdown_token();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            token.cancel();
        });
        manager.run().await;
    }

    #[tokio::test]
    async fn test_at_most_one_reconcile_in_flight_per_object() {
        let store = store_with_case().await;
        let counter = Arc::new(CountingReconciler::new(
            Duration::from_millis(50),
            ReconcileAction::requeue(Duration::from_millis(1)),
        ));
        let manager = ControllerManager::new(store, fast_config()).with_reconciler(counter.clone());

        run_for(&manager, Duration::from_millis(300)).await;

        assert!(counter.calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(counter.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unchanged_object_without_requeue_runs_once() {
        let store = store_with_case().await;
        let counter = Arc::new(CountingReconciler::new(Duration::ZERO, ReconcileAction::done()));
        let manager = ControllerManager::new(store, fast_config()).with_reconciler(counter.clone());

        run_for(&manager, Duration::from_millis(150)).await;

        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_object_is_reconciled_again() {
        let store = store_with_case().await;
        let counter = Arc::new(CountingReconciler::new(Duration::ZERO, ReconcileAction::done()));
        let manager = ControllerManager::new(store.clone(), fast_config()).with_reconciler(counter.clone());

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                let case = store
                    .get_test_case(&ObjectKey::new("qa", "case"))
                    .await
                    .unwrap()
                    .unwrap();
                store.update_test_case_status(&case).await.unwrap();
            })
        };

        run_for(&manager, Duration::from_millis(200)).await;
        writer.await.unwrap();

        assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_long_test_cases_do_not_starve_suites() {
        let store = store_with_case().await;
        store
            .create_suite(TestSuite::new(ObjectMeta::new("qa", "suite"), StrategyDescriptor::new("noop")))
            .await
            .unwrap();

        let cases = Arc::new(CountingReconciler::new(Duration::from_secs(5), ReconcileAction::done()));
        let mut suites = CountingReconciler::new(Duration::ZERO, ReconcileAction::requeue(Duration::from_millis(10)));
        suites.kind = ObjectKind::TestSuite;
        let suites = Arc::new(suites);

        let config = ControllerConfig {
            max_concurrent_reconciles: 1,
            ..fast_config()
        };
        let manager = ControllerManager::new(store, config)
            .with_reconciler(cases.clone())
            .with_reconciler(suites.clone());

        run_for(&manager, Duration::from_millis(200)).await;

        assert_eq!(cases.calls.load(Ordering::SeqCst), 1);
        assert!(
            suites.calls.load(Ordering::SeqCst) >= 3,
            "suite passes should keep running while a test case holds its permit"
        );
    }

    #[tokio::test]
    async fn test_errors_are_requeued() {
        let store = store_with_case().await;
        let mut counter = CountingReconciler::new(Duration::ZERO, ReconcileAction::done());
        counter.fail_first = true;
        let counter = Arc::new(counter);
        let manager = ControllerManager::new(store, fast_config()).with_reconciler(counter.clone());

        run_for(&manager, Duration::from_millis(200)).await;

        assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_store_is_settled() {
        let manager = ControllerManager::new(Arc::new(InMemoryObjectStore::new()), fast_config());
        assert_eq!(
            manager.run_until_settled(Some(Duration::from_secs(1))).await.unwrap(),
            Settlement::Complete
        );
    }

    #[tokio::test]
    async fn test_run_until_settled_times_out() {
        let store = store_with_case().await;
        let manager = ControllerManager::new(store, fast_config());
        let settled = manager
            .run_until_settled(Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(settled, Settlement::TimedOut);
    }

    #[tokio::test]
    async fn test_undispatched_work_stalls() {
        let store = store_with_case().await;
        let config = ControllerConfig {
            suite_requeue_interval_ms: 20,
            ..fast_config()
        };
        let manager = ControllerManager::new(store, config);
        let settled = manager
            .run_until_settled(Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(settled, Settlement::Stalled);
    }

    #[tokio::test]
    async fn test_running_case_is_not_stalled() {
        let store = store_with_case().await;
        let mut case = store
            .get_test_case(&ObjectKey::new("qa", "case"))
            .await
            .unwrap()
            .unwrap();
        case.status.dispatched_at = Some(chrono::Utc::now());
        store.update_test_case_status(&case).await.unwrap();

        let config = ControllerConfig {
            suite_requeue_interval_ms: 10,
            ..fast_config()
        };
        let manager = ControllerManager::new(store, config);
        let settled = manager
            .run_until_settled(Some(Duration::from_millis(200)))
            .await
            .unwrap();
        assert_eq!(settled, Settlement::TimedOut);
    }
}
