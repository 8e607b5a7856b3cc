//! Reconciliation services.

pub mod composite_state;
pub mod retry;
pub mod strategy_registry;
pub mod suite_dispatch;
pub mod test_case_lifecycle;
pub mod test_case_state;
pub mod worker_lifecycle;

pub use composite_state::{CompositeState, CompositeStateReconciler, CompositeStateReconcilerBuilder};
pub use strategy_registry::{FnProvider, StrategyRegistry, TemplateProvider};
pub use suite_dispatch::{DispatchReport, SuiteDispatchEngine};
pub use test_case_lifecycle::{RunOutcome, TestCaseLifecycle};
pub use test_case_state::{TestCaseState, TestCaseStateReconciler};
pub use worker_lifecycle::WorkerLifecycle;
