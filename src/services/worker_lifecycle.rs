//! Test worker lifecycle.
//!
//! A worker runs once, then folds its result into the suite state of its
//! namespace. The fold re-reads the suite on every attempt, so a merge that
//! loses a version race is simply replayed on fresh state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ControllerConfig, ObjectKey, ObjectKind, StrategyDescriptor, TestSuite};
use crate::domain::ports::{MutateStateFn, ObjectStore, ReconcileAction, Reconciler, StrategyContext};
use crate::services::retry::retry_on_conflict;
use crate::services::strategy_registry::StrategyRegistry;

/// Reconciler for [`TestWorker`](crate::domain::models::TestWorker) objects.
pub struct WorkerLifecycle {
    store: Arc<dyn ObjectStore>,
    registry: Arc<StrategyRegistry>,
    config: ControllerConfig,
}

impl WorkerLifecycle {
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<StrategyRegistry>, config: ControllerConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    async fn run_and_merge(&self, key: &ObjectKey, strategy: &StrategyDescriptor) -> DomainResult<()> {
        let behavior = self
            .registry
            .resolve_test_worker(strategy)
            .map_err(|e| DomainError::StrategyResolutionFailed(Box::new(e)))?;

        let ctx = StrategyContext::new(self.store.clone(), key.namespace.clone());
        let mutate = behavior.run(ctx).await?;
        self.merge(&key.namespace, &mutate).await
    }

    /// Apply `mutate` to the suite state of `namespace`, retrying version
    /// conflicts with exponential backoff.
    pub async fn merge(&self, namespace: &str, mutate: &MutateStateFn) -> DomainResult<()> {
        retry_on_conflict(self.config.merge_retry_max_elapsed(), "suite state merge", || {
            self.merge_once(namespace, mutate)
        })
        .await
    }

    async fn merge_once(&self, namespace: &str, mutate: &MutateStateFn) -> DomainResult<()> {
        let mut suite = self.find_suite(namespace).await?;
        let reconciler = self
            .registry
            .resolve_state_reconciler(&suite.spec.state_strategy)
            .map_err(|e| DomainError::StrategyResolutionFailed(Box::new(e)))?;

        let current = reconciler.parse_erased(suite.state_text())?;
        let next = mutate(current)?;
        suite.status.current_state = next.to_json_pretty()?;
        self.store.update_suite_status(&suite).await?;
        Ok(())
    }

    /// Write `finished_at` and the failure, unless an earlier attempt already
    /// did.
    async fn record_finish(&self, key: &ObjectKey, finished_at: DateTime<Utc>, failure: Option<&str>) -> DomainResult<()> {
        let Some(mut worker) = self.store.get_test_worker(key).await? else {
            debug!("worker disappeared before it could be marked finished");
            return Ok(());
        };
        if worker.is_finished() {
            return Ok(());
        }

        worker.status.finished_at = Some(finished_at);
        worker.status.failure_message = failure.map(str::to_string);
        self.store.update_test_worker_status(&worker).await?;
        Ok(())
    }

    /// The suite a worker reports to: the lowest-named suite in its namespace.
    async fn find_suite(&self, namespace: &str) -> DomainResult<TestSuite> {
        self.store
            .list_suites(Some(namespace))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::NoSuiteFound(namespace.to_string()))
    }
}

#[async_trait]
impl Reconciler for WorkerLifecycle {
    fn kind(&self) -> ObjectKind {
        ObjectKind::TestWorker
    }

    #[instrument(skip(self, key), fields(worker = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> DomainResult<ReconcileAction> {
        let Some(mut worker) = self.store.get_test_worker(key).await? else {
            debug!("worker not found, nothing to do");
            return Ok(ReconcileAction::done());
        };

        if !worker.is_dispatched() || worker.is_started() {
            return Ok(ReconcileAction::done());
        }

        worker.status.started_at = Some(Utc::now());
        let worker = self.store.update_test_worker_status(&worker).await?;
        info!("test worker started");

        let result = self.run_and_merge(key, &worker.spec.strategy).await;
        let finished_at = Utc::now();
        let failure = match result {
            Ok(()) => {
                info!("test worker finished, suite state merged");
                None
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(error = %err, "test worker merge gave up after retries");
                } else {
                    error!(error = %err, "test worker failed");
                }
                Some(err.to_string())
            }
        };

        let failure = failure.as_deref();
        retry_on_conflict(self.config.merge_retry_max_elapsed(), "worker finish", || {
            self.record_finish(key, finished_at, failure)
        })
        .await?;

        Ok(ReconcileAction::done())
    }
}
