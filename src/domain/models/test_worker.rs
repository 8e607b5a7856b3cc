//! Test worker object.
//!
//! Workers are dispatched like test cases but, instead of asserting, they act
//! on the system under test and fold a state mutation back into the suite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::{ObjectKind, ObjectMeta, Resource};
use super::strategy::StrategyDescriptor;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestWorkerSpec {
    pub strategy: StrategyDescriptor,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestWorkerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestWorker {
    pub metadata: ObjectMeta,
    pub spec: TestWorkerSpec,
    #[serde(default)]
    pub status: TestWorkerStatus,
}

impl TestWorker {
    pub fn new(metadata: ObjectMeta, strategy: StrategyDescriptor) -> Self {
        Self {
            metadata,
            spec: TestWorkerSpec { strategy },
            status: TestWorkerStatus::default(),
        }
    }

    pub fn is_dispatched(&self) -> bool {
        self.status.dispatched_at.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.status.started_at.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.status.finished_at.is_some()
    }

    /// Finished without a recorded failure.
    pub fn succeeded(&self) -> bool {
        self.is_finished() && self.status.failure_message.is_none()
    }
}

impl Resource for TestWorker {
    const KIND: ObjectKind = ObjectKind::TestWorker;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
