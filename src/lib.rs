//! Testplane - test orchestration control plane
//!
//! Testplane reconciles declarative test objects held in an object store:
//! a `TestSuite` owns shared JSON state, `TestCase`s are dispatched once that
//! state allows them to run, and `TestWorker`s feed the state by merging
//! mutations into their suite. Every behavior is pluggable through named
//! strategy providers.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): objects, errors and the ports the engine depends on
//! - **Service Layer** (`services`): the reconcilers and the strategy registry
//! - **Application Layer** (`application`): the polling controller manager
//! - **Adapters** (`adapters`): the in-memory object store and built-in providers
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, manifests
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use testplane::{builtin_registry, ControllerManager, InMemoryObjectStore, Manifest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(InMemoryObjectStore::new());
//!     Manifest::load("suite.yaml")?.seed(store.as_ref()).await?;
//!     let manager = ControllerManager::with_standard_reconcilers(
//!         store,
//!         Arc::new(builtin_registry()),
//!         Default::default(),
//!     );
//!     manager.run_until_settled(None).await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::memory::InMemoryObjectStore;
pub use adapters::strategies::builtin_registry;
pub use application::{ControllerManager, Settlement};
pub use domain::models::{
    Config, ControllerConfig, LoggingConfig, ObjectKey, ObjectMeta, StrategyDescriptor, SuiteState, TestCase,
    TestCasePhase, TestSuite, TestWorker,
};
pub use domain::ports::{
    Behavior, MutateStateFn, ObjectStore, ReconcileAction, Reconciler, StateReconciler, StrategyContext,
    StrategyProvider, TestCaseBehavior, TestWorkerBehavior,
};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::manifest::Manifest;
pub use services::{
    CompositeState, CompositeStateReconciler, StrategyRegistry, SuiteDispatchEngine, TestCaseLifecycle,
    WorkerLifecycle,
};
