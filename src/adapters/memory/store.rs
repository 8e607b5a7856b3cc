//! In-memory object store.
//!
//! Enforces the same optimistic concurrency contract as a real declarative
//! store: every write must carry the current `resource_version`, and a
//! successful write bumps it. Conflicts can also be injected, which the test
//! suites use to exercise the transient-error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

use crate::domain::models::{ObjectKey, ObjectKind, Resource, TestCase, TestSuite, TestWorker};
use crate::domain::ports::{ObjectStore, StoreError, StoreResult};

type Table<R> = Arc<RwLock<BTreeMap<ObjectKey, R>>>;

/// Thread-safe in-memory [`ObjectStore`].
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    suites: Table<TestSuite>,
    test_cases: Table<TestCase>,
    test_workers: Table<TestWorker>,
    injected_conflicts: Arc<Mutex<HashMap<ObjectKind, u32>>>,
    update_counts: Arc<Mutex<HashMap<ObjectKind, u64>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` status updates of `kind` fail with a version
    /// conflict, as if another writer had raced them.
    pub async fn inject_conflicts(&self, kind: ObjectKind, count: u32) {
        self.injected_conflicts.lock().await.insert(kind, count);
    }

    /// Number of successful status updates of `kind` so far.
    pub async fn update_count(&self, kind: ObjectKind) -> u64 {
        self.update_counts.lock().await.get(&kind).copied().unwrap_or(0)
    }

    async fn take_injected_conflict(&self, kind: ObjectKind) -> bool {
        let mut conflicts = self.injected_conflicts.lock().await;
        match conflicts.get_mut(&kind) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    async fn record_update(&self, kind: ObjectKind) {
        *self.update_counts.lock().await.entry(kind).or_insert(0) += 1;
    }
}

async fn get<R: Resource>(table: &Table<R>, key: &ObjectKey) -> StoreResult<Option<R>> {
    Ok(table.read().await.get(key).cloned())
}

async fn list<R: Resource>(table: &Table<R>, namespace: Option<&str>) -> StoreResult<Vec<R>> {
    Ok(table
        .read()
        .await
        .values()
        .filter(|obj| namespace.map_or(true, |ns| obj.meta().namespace == ns))
        .cloned()
        .collect())
}

async fn create<R: Resource>(table: &Table<R>, mut obj: R) -> StoreResult<R> {
    let key = obj.key();
    let mut objects = table.write().await;
    if objects.contains_key(&key) {
        return Err(StoreError::AlreadyExists { kind: R::KIND, key });
    }

    obj.meta_mut().resource_version = 1;
    objects.insert(key, obj.clone());
    Ok(obj)
}

async fn update_status<R, F>(store: &InMemoryObjectStore, table: &Table<R>, incoming: &R, copy_status: F) -> StoreResult<R>
where
    R: Resource,
    F: FnOnce(&mut R, &R),
{
    let key = incoming.key();
    let expected = incoming.meta().resource_version;

    if store.take_injected_conflict(R::KIND).await {
        return Err(StoreError::VersionConflict {
            kind: R::KIND,
            key,
            expected,
            actual: expected + 1,
        });
    }

    let mut objects = table.write().await;
    let stored = objects.get_mut(&key).ok_or_else(|| StoreError::NotFound {
        kind: R::KIND,
        key: key.clone(),
    })?;

    let actual = stored.meta().resource_version;
    if actual != expected {
        return Err(StoreError::VersionConflict {
            kind: R::KIND,
            key,
            expected,
            actual,
        });
    }

    copy_status(stored, incoming);
    stored.meta_mut().resource_version = actual + 1;
    let updated = stored.clone();
    drop(objects);

    store.record_update(R::KIND).await;
    trace!(kind = %R::KIND, key = %key, version = actual + 1, "status updated");
    Ok(updated)
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_suite(&self, key: &ObjectKey) -> StoreResult<Option<TestSuite>> {
        get(&self.suites, key).await
    }

    async fn list_suites(&self, namespace: Option<&str>) -> StoreResult<Vec<TestSuite>> {
        list(&self.suites, namespace).await
    }

    async fn create_suite(&self, suite: TestSuite) -> StoreResult<TestSuite> {
        create(&self.suites, suite).await
    }

    async fn update_suite_status(&self, suite: &TestSuite) -> StoreResult<TestSuite> {
        update_status(self, &self.suites, suite, |stored, incoming| {
            stored.status = incoming.status.clone();
        })
        .await
    }

    async fn get_test_case(&self, key: &ObjectKey) -> StoreResult<Option<TestCase>> {
        get(&self.test_cases, key).await
    }

    async fn list_test_cases(&self, namespace: Option<&str>) -> StoreResult<Vec<TestCase>> {
        list(&self.test_cases, namespace).await
    }

    async fn create_test_case(&self, test_case: TestCase) -> StoreResult<TestCase> {
        create(&self.test_cases, test_case).await
    }

    async fn update_test_case_status(&self, test_case: &TestCase) -> StoreResult<TestCase> {
        update_status(self, &self.test_cases, test_case, |stored, incoming| {
            stored.status = incoming.status.clone();
        })
        .await
    }

    async fn get_test_worker(&self, key: &ObjectKey) -> StoreResult<Option<TestWorker>> {
        get(&self.test_workers, key).await
    }

    async fn list_test_workers(&self, namespace: Option<&str>) -> StoreResult<Vec<TestWorker>> {
        list(&self.test_workers, namespace).await
    }

    async fn create_test_worker(&self, worker: TestWorker) -> StoreResult<TestWorker> {
        create(&self.test_workers, worker).await
    }

    async fn update_test_worker_status(&self, worker: &TestWorker) -> StoreResult<TestWorker> {
        update_status(self, &self.test_workers, worker, |stored, incoming| {
            stored.status = incoming.status.clone();
        })
        .await
    }
}
