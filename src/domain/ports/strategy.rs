//! Strategy port - the pluggable behaviors a descriptor can resolve to.
//!
//! A provider turns configuration into a [`Behavior`]. The behavior is tagged
//! with the capability it satisfies so callers can check it after resolution
//! without downcasting.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Configuration, SuiteState};
use crate::domain::ports::ObjectStore;

/// Everything a behavior may touch while it runs.
#[derive(Clone)]
pub struct StrategyContext {
    pub store: Arc<dyn ObjectStore>,
    pub namespace: String,
    /// Cancelled when the owning test case times out.
    pub cancellation: CancellationToken,
}

impl StrategyContext {
    pub fn new(store: Arc<dyn ObjectStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            cancellation: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

impl std::fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContext")
            .field("namespace", &self.namespace)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// Suite state reconciler, statically typed over its own state shape.
#[async_trait]
pub trait StateReconciler: Send + Sync + 'static {
    type State: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Parse persisted state text into the typed state.
    fn parse_state(&self, raw: &str) -> DomainResult<Self::State> {
        serde_json::from_str(raw).map_err(|e| DomainError::StateParse(e.to_string()))
    }

    /// Compute the next state from the current one and the outside world.
    async fn reconcile(&self, ctx: &StrategyContext, current: Self::State) -> DomainResult<Self::State>;
}

/// Type-erased view of a [`StateReconciler`], working on [`SuiteState`].
#[async_trait]
pub trait ErasedStateReconciler: Send + Sync {
    fn parse_erased(&self, raw: &str) -> DomainResult<SuiteState>;

    async fn reconcile_erased(&self, ctx: &StrategyContext, current: SuiteState) -> DomainResult<SuiteState>;
}

#[async_trait]
impl<R: StateReconciler> ErasedStateReconciler for R {
    fn parse_erased(&self, raw: &str) -> DomainResult<SuiteState> {
        let typed = StateReconciler::parse_state(self, raw)?;
        SuiteState::encode(&typed)
    }

    async fn reconcile_erased(&self, ctx: &StrategyContext, current: SuiteState) -> DomainResult<SuiteState> {
        let typed: R::State = current.decode()?;
        let next = StateReconciler::reconcile(self, ctx, typed).await?;
        SuiteState::encode(&next)
    }
}

/// A runnable test case.
#[async_trait]
pub trait TestCaseBehavior: Send + Sync {
    /// Dispatch predicate evaluated against the freshly reconciled suite state.
    fn should_run(&self, state: &SuiteState) -> bool;

    /// Execute the test body. An `Err` marks the test as failed.
    async fn run(&self, ctx: StrategyContext) -> DomainResult<()>;
}

/// Pure function folding a worker's effect into suite state.
///
/// It may be applied more than once when the merge is retried, so it must not
/// have side effects.
pub type MutateStateFn = Arc<dyn Fn(SuiteState) -> DomainResult<SuiteState> + Send + Sync>;

/// Mutation for workers that leave suite state unchanged.
pub fn no_mutate() -> MutateStateFn {
    Arc::new(|state: SuiteState| -> DomainResult<SuiteState> { Ok(state) })
}

/// An on-demand unit of work acting on the system under test.
#[async_trait]
pub trait TestWorkerBehavior: Send + Sync {
    fn should_run(&self, state: &SuiteState) -> bool;

    async fn run(&self, ctx: StrategyContext) -> DomainResult<MutateStateFn>;
}

/// A resolved behavior, tagged by the capability it provides.
#[derive(Clone)]
pub enum Behavior {
    StateReconciler(Arc<dyn ErasedStateReconciler>),
    TestCase(Arc<dyn TestCaseBehavior>),
    TestWorker(Arc<dyn TestWorkerBehavior>),
}

impl Behavior {
    pub fn state_reconciler<R: StateReconciler>(reconciler: R) -> Self {
        Self::StateReconciler(Arc::new(reconciler))
    }

    pub fn test_case<T: TestCaseBehavior + 'static>(test_case: T) -> Self {
        Self::TestCase(Arc::new(test_case))
    }

    pub fn test_worker<W: TestWorkerBehavior + 'static>(worker: W) -> Self {
        Self::TestWorker(Arc::new(worker))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::StateReconciler(_) => "state reconciler",
            Self::TestCase(_) => "test case",
            Self::TestWorker(_) => "test worker",
        }
    }
}

impl std::fmt::Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Behavior").field(&self.kind_name()).finish()
    }
}

/// Conversion used by template providers to tag a default-built value.
pub trait IntoBehavior {
    fn into_behavior(self) -> Behavior;
}

/// Builds behaviors from descriptor configuration.
pub trait StrategyProvider: Send + Sync {
    fn provide(&self, configuration: &Configuration) -> DomainResult<Behavior>;
}
