//! Port trait definitions (Hexagonal Architecture)
//!
//! - ObjectStore: the external declarative object store
//! - StrategyProvider and the behavior capabilities it resolves to
//! - Reconciler: entry point invoked by the trigger mechanism

pub mod object_store;
pub mod reconciler;
pub mod strategy;

pub use object_store::{ObjectStore, StoreError, StoreResult};
pub use reconciler::{ReconcileAction, Reconciler};
pub use strategy::{
    no_mutate, Behavior, ErasedStateReconciler, IntoBehavior, MutateStateFn, StateReconciler,
    StrategyContext, StrategyProvider, TestCaseBehavior, TestWorkerBehavior,
};
