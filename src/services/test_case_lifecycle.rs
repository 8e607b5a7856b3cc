//! Test case lifecycle: dispatched -> running -> one terminal status.
//!
//! The body runs on its own task and is raced against the case's timeout.
//! When the timeout wins the body's cancellation token is cancelled; a body
//! that ignores it is aborted once the grace period elapses. The terminal
//! status is written once, retried on version conflicts.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ControllerConfig, ObjectKey, ObjectKind, TestCase, TestCasePhase};
use crate::domain::ports::{ObjectStore, ReconcileAction, Reconciler, StrategyContext};
use crate::services::retry::retry_on_conflict;
use crate::services::strategy_registry::StrategyRegistry;

/// How a test body ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Failed(String),
    Canceled(String),
}

impl RunOutcome {
    pub fn phase(&self) -> TestCasePhase {
        match self {
            Self::Finished => TestCasePhase::Finished,
            Self::Failed(_) => TestCasePhase::Failed,
            Self::Canceled(_) => TestCasePhase::Canceled,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Finished => None,
            Self::Failed(message) | Self::Canceled(message) => Some(message),
        }
    }
}

/// Reconciler for [`TestCase`] objects.
pub struct TestCaseLifecycle {
    store: Arc<dyn ObjectStore>,
    registry: Arc<StrategyRegistry>,
    config: ControllerConfig,
}

impl TestCaseLifecycle {
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<StrategyRegistry>, config: ControllerConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Resolve and run the body of a started case.
    async fn execute(&self, test_case: &TestCase) -> RunOutcome {
        let timeout = match test_case.spec.timeout_duration() {
            Ok(timeout) => timeout,
            Err(err) => return RunOutcome::Failed(err.to_string()),
        };

        let behavior = match self.registry.resolve_test_case(&test_case.spec.strategy) {
            Ok(behavior) => behavior,
            Err(err) => return RunOutcome::Failed(DomainError::StrategyResolutionFailed(Box::new(err)).to_string()),
        };

        let cancellation = CancellationToken::new();
        let ctx = StrategyContext::new(self.store.clone(), test_case.metadata.namespace.clone())
            .with_cancellation(cancellation.clone());
        let mut handle = tokio::spawn(async move { behavior.run(ctx).await }.in_current_span());

        let deadline = async move {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending::<Duration>().await,
            }
        };

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(Ok(())) => RunOutcome::Finished,
                Ok(Err(err)) => RunOutcome::Failed(err.to_string()),
                Err(err) => RunOutcome::Failed(join_failure(err)),
            },
            limit = deadline => {
                cancellation.cancel();
                let grace = self.config.cancel_grace_period();
                tokio::spawn(
                    async move {
                        let stopped = tokio::time::timeout(grace, &mut handle).await.is_ok();
                        if !stopped {
                            warn!(grace = ?grace, "test body ignored cancellation, aborting");
                            handle.abort();
                        }
                    }
                    .in_current_span(),
                );
                let limit = humantime::format_duration(limit).to_string();
                RunOutcome::Canceled(DomainError::TimeoutExceeded(limit).to_string())
            }
        }
    }

    /// Write the terminal status onto a fresh read of the case, unless an
    /// earlier attempt already did.
    async fn record_outcome(&self, key: &ObjectKey, finished_at: DateTime<Utc>, outcome: &RunOutcome) -> DomainResult<()> {
        let Some(mut test_case) = self.store.get_test_case(key).await? else {
            debug!("test case disappeared before its outcome was recorded");
            return Ok(());
        };
        if test_case.is_finished() {
            return Ok(());
        }

        test_case.status.finished_at = Some(finished_at);
        test_case.status.status = outcome.phase();
        test_case.status.failure_message = outcome.message().map(str::to_string);
        self.store.update_test_case_status(&test_case).await?;
        Ok(())
    }
}

fn join_failure(err: JoinError) -> String {
    if err.is_panic() {
        format!("test panicked: {}", panic_message(err.into_panic()))
    } else {
        "test body was cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl Reconciler for TestCaseLifecycle {
    fn kind(&self) -> ObjectKind {
        ObjectKind::TestCase
    }

    #[instrument(skip(self, key), fields(test_case = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> DomainResult<ReconcileAction> {
        let Some(mut test_case) = self.store.get_test_case(key).await? else {
            debug!("test case not found, nothing to do");
            return Ok(ReconcileAction::done());
        };

        if !test_case.is_dispatched() || test_case.is_started() {
            return Ok(ReconcileAction::done());
        }

        test_case.status.started_at = Some(Utc::now());
        test_case.status.status = TestCasePhase::Running;
        // A concurrent invocation that started first makes this write conflict.
        let test_case = self.store.update_test_case_status(&test_case).await?;
        info!("test case started");

        let outcome = &self.execute(&test_case).await;
        let finished_at = Utc::now();

        // The start guard keeps later invocations away, so the outcome is
        // written here or never.
        retry_on_conflict(self.config.merge_retry_max_elapsed(), "test case outcome", || {
            self.record_outcome(key, finished_at, outcome)
        })
        .await?;

        match outcome {
            RunOutcome::Finished => info!("test case finished"),
            RunOutcome::Failed(message) => warn!(reason = %message, "test case failed"),
            RunOutcome::Canceled(message) => warn!(reason = %message, "test case canceled"),
        }

        Ok(ReconcileAction::done())
    }
}
