//! Domain models for the testplane control plane.

pub mod config;
pub mod object;
pub mod strategy;
pub mod suite_state;
pub mod test_case;
pub mod test_suite;
pub mod test_worker;

pub use config::{Config, ControllerConfig, LoggingConfig};
pub use object::{ObjectKey, ObjectKind, ObjectMeta, Resource};
pub use strategy::{Configuration, StrategyDescriptor};
pub use suite_state::{effective_state, SuiteState, EMPTY_STATE};
pub use test_case::{TestCase, TestCasePhase, TestCaseSpec, TestCaseStatus};
pub use test_suite::{TestSuite, TestSuiteSpec, TestSuiteStatus};
pub use test_worker::{TestWorker, TestWorkerSpec, TestWorkerStatus};
