//! Test case object and its lifecycle status.
//!
//! A test case moves `Created -> Dispatched -> Running` and then to exactly
//! one terminal status. Every timestamp in [`TestCaseStatus`] is write-once.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::{ObjectKind, ObjectMeta, Resource};
use super::strategy::StrategyDescriptor;
use crate::domain::errors::{DomainError, DomainResult};

/// Current phase of a test case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestCasePhase {
    /// Created externally, waiting for its dispatch predicate
    #[default]
    Created,
    /// Predicate held; eligible to run
    Dispatched,
    /// Test body is executing
    Running,
    /// Test body returned successfully
    Finished,
    /// Test body returned an error
    Failed,
    /// Test body did not complete before its timeout
    Canceled,
}

impl TestCasePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Dispatched => "Dispatched",
            Self::Running => "Running",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for TestCasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseSpec {
    pub strategy: StrategyDescriptor,
    /// Human readable duration such as `30s` or `2m 30s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

impl TestCaseSpec {
    /// Parse the configured timeout, if any.
    pub fn timeout_duration(&self) -> DomainResult<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw.trim()).map_err(|e| DomainError::InvalidTimeout {
                    value: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub status: TestCasePhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub metadata: ObjectMeta,
    pub spec: TestCaseSpec,
    #[serde(default)]
    pub status: TestCaseStatus,
}

impl TestCase {
    pub fn new(metadata: ObjectMeta, strategy: StrategyDescriptor) -> Self {
        Self {
            metadata,
            spec: TestCaseSpec {
                strategy,
                timeout: None,
            },
            status: TestCaseStatus::default(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.spec.timeout = Some(timeout.into());
        self
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
}

impl Resource for TestCase {
    const KIND: ObjectKind = ObjectKind::TestCase;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
