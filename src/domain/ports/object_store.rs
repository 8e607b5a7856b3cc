//! Object store port.
//!
//! The declarative object store is an external collaborator. The control plane
//! only consumes get/list/update, relying on `resource_version` for optimistic
//! concurrency: an update carrying a stale version fails with
//! [`StoreError::VersionConflict`] instead of overwriting a concurrent change.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{ObjectKey, ObjectKind, TestCase, TestSuite, TestWorker};

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: ObjectKind, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: ObjectKind, key: ObjectKey },

    #[error("Version conflict on {kind} {key}: expected {expected}, found {actual}")]
    VersionConflict {
        kind: ObjectKind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Store port for the three reconciled kinds.
///
/// `list_*` returns objects ordered by namespace then name. `update_*_status`
/// writes only the status sub-resource and returns the stored object with its
/// new `resource_version`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_suite(&self, key: &ObjectKey) -> StoreResult<Option<TestSuite>>;

    async fn list_suites(&self, namespace: Option<&str>) -> StoreResult<Vec<TestSuite>>;

    async fn create_suite(&self, suite: TestSuite) -> StoreResult<TestSuite>;

    async fn update_suite_status(&self, suite: &TestSuite) -> StoreResult<TestSuite>;

    async fn get_test_case(&self, key: &ObjectKey) -> StoreResult<Option<TestCase>>;

    async fn list_test_cases(&self, namespace: Option<&str>) -> StoreResult<Vec<TestCase>>;

    async fn create_test_case(&self, test_case: TestCase) -> StoreResult<TestCase>;

    async fn update_test_case_status(&self, test_case: &TestCase) -> StoreResult<TestCase>;

    async fn get_test_worker(&self, key: &ObjectKey) -> StoreResult<Option<TestWorker>>;

    async fn list_test_workers(&self, namespace: Option<&str>) -> StoreResult<Vec<TestWorker>>;

    async fn create_test_worker(&self, worker: TestWorker) -> StoreResult<TestWorker>;

    async fn update_test_worker_status(&self, worker: &TestWorker) -> StoreResult<TestWorker>;
}
