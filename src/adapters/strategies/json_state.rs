//! `json-state`: free-form JSON suite state, changed only by workers.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{Behavior, IntoBehavior, StateReconciler, StrategyContext};

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStateReconciler;

#[async_trait]
impl StateReconciler for JsonStateReconciler {
    type State = Value;

    async fn reconcile(&self, _ctx: &StrategyContext, current: Value) -> DomainResult<Value> {
        Ok(current)
    }
}

impl IntoBehavior for JsonStateReconciler {
    fn into_behavior(self) -> Behavior {
        Behavior::state_reconciler(self)
    }
}
