//! Built-in strategy providers.
//!
//! | provider           | behavior         |
//! |--------------------|------------------|
//! | `json-state`       | state reconciler |
//! | `test-case-status` | state reconciler |
//! | `command`          | test case        |
//! | `set-state`        | test worker      |

pub mod command;
pub mod gate;
pub mod json_state;
pub mod set_state;

pub use command::CommandTestCase;
pub use gate::StateGate;
pub use json_state::JsonStateReconciler;
pub use set_state::SetStateWorker;

use crate::services::{StrategyRegistry, TestCaseStateReconciler};

pub const JSON_STATE: &str = "json-state";
pub const TEST_CASE_STATUS: &str = "test-case-status";

/// Registry preloaded with every built-in provider.
pub fn builtin_registry() -> StrategyRegistry {
    StrategyRegistry::new()
        .with_template::<JsonStateReconciler>(JSON_STATE)
        .with_template::<TestCaseStateReconciler>(TEST_CASE_STATUS)
        .with_fn(command::PROVIDER, CommandTestCase::provide)
        .with_fn(set_state::PROVIDER, SetStateWorker::provide)
}
