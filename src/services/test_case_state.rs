//! Mirrors the namespace's test cases into suite state.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TestCase, TestCasePhase};
use crate::domain::ports::{Behavior, IntoBehavior, StateReconciler, StrategyContext};

/// Snapshot of one test case as seen from the suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseState {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub status: TestCasePhase,
}

impl From<&TestCase> for TestCaseState {
    fn from(test_case: &TestCase) -> Self {
        Self {
            name: test_case.metadata.name.clone(),
            annotations: test_case.metadata.annotations.clone(),
            status: test_case.status.status,
        }
    }
}

/// State reconciler that discards the previous snapshot and lists the test
/// cases of the context namespace, ordered by name.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestCaseStateReconciler;

#[async_trait]
impl StateReconciler for TestCaseStateReconciler {
    type State = Vec<TestCaseState>;

    fn parse_state(&self, raw: &str) -> DomainResult<Self::State> {
        // Fresh suites start from "{}" or "null"; both mean "nothing seen yet".
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Array(_)) => {
                serde_json::from_str(raw).map_err(|e| DomainError::StateParse(e.to_string()))
            }
            Ok(serde_json::Value::Null) => Ok(Vec::new()),
            Ok(serde_json::Value::Object(map)) if map.is_empty() => Ok(Vec::new()),
            Ok(other) => Err(DomainError::StateParse(format!(
                "expected a list of test cases, got {other}"
            ))),
            Err(e) => Err(DomainError::StateParse(e.to_string())),
        }
    }

    async fn reconcile(&self, ctx: &StrategyContext, _current: Self::State) -> DomainResult<Self::State> {
        let cases = ctx.store.list_test_cases(Some(&ctx.namespace)).await?;
        Ok(cases.iter().map(TestCaseState::from).collect())
    }
}

impl IntoBehavior for TestCaseStateReconciler {
    fn into_behavior(self) -> Behavior {
        Behavior::state_reconciler(self)
    }
}
