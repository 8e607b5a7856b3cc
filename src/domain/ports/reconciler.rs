//! Reconciler port - the single entry point the trigger mechanism calls.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ObjectKey, ObjectKind};

/// What the trigger mechanism should do after a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileAction {
    /// Re-invoke after this delay; `None` waits for the next change.
    pub requeue_after: Option<Duration>,
}

impl ReconcileAction {
    pub const fn done() -> Self {
        Self { requeue_after: None }
    }

    pub const fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// Reconciles one object kind.
///
/// Implementations must tolerate repeated and concurrent calls for the same
/// key; idempotence comes from the write-once status fields.
#[async_trait]
pub trait Reconciler: Send + Sync {
    fn kind(&self) -> ObjectKind;

    async fn reconcile(&self, key: &ObjectKey) -> DomainResult<ReconcileAction>;
}
