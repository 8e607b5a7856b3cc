//! Composite state reconciler.
//!
//! Reconciles a struct-shaped suite state by handing each named field to its
//! own reconciler. Field names are the serialized names declared in
//! [`CompositeState::FIELDS`]; the builder refuses to construct a reconciler
//! unless the supplied mapping covers exactly those names, and a reconcile
//! fails if the serialized state carries a field `FIELDS` does not declare.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SuiteState;
use crate::domain::ports::{ErasedStateReconciler, StateReconciler, StrategyContext};

/// A struct whose serialized fields are reconciled independently.
pub trait CompositeState: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Serialized names of every field of the struct.
    const FIELDS: &'static [&'static str];
}

impl<C: CompositeState> CompositeState for Box<C> {
    const FIELDS: &'static [&'static str] = C::FIELDS;
}

/// Builder collecting one reconciler per field.
pub struct CompositeStateReconcilerBuilder<C> {
    fields: BTreeMap<String, Arc<dyn ErasedStateReconciler>>,
    _state: PhantomData<fn() -> C>,
}

impl<C: CompositeState> CompositeStateReconcilerBuilder<C> {
    /// Attach a typed reconciler to `name`.
    #[must_use]
    pub fn field<R: StateReconciler>(self, name: impl Into<String>, reconciler: R) -> Self {
        self.erased_field(name, Arc::new(reconciler))
    }

    /// Attach an already type-erased reconciler, e.g. one resolved from a
    /// registry.
    #[must_use]
    pub fn erased_field(mut self, name: impl Into<String>, reconciler: Arc<dyn ErasedStateReconciler>) -> Self {
        self.fields.insert(name.into(), reconciler);
        self
    }

    /// Validate the mapping and construct the reconciler.
    pub fn build(self) -> DomainResult<CompositeStateReconciler<C>> {
        let missing: Vec<String> = C::FIELDS
            .iter()
            .filter(|name| !self.fields.contains_key(**name))
            .map(|name| (*name).to_string())
            .collect();

        let unknown: Vec<String> = self
            .fields
            .keys()
            .filter(|name| !C::FIELDS.contains(&name.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() || !unknown.is_empty() {
            return Err(DomainError::IncompleteFieldMapping { missing, unknown });
        }

        Ok(CompositeStateReconciler {
            fields: self.fields,
            _state: PhantomData,
        })
    }
}

/// Reconciles `C` by delegating each field to its own reconciler.
pub struct CompositeStateReconciler<C> {
    fields: BTreeMap<String, Arc<dyn ErasedStateReconciler>>,
    _state: PhantomData<fn() -> C>,
}

impl<C: CompositeState> CompositeStateReconciler<C> {
    pub fn builder() -> CompositeStateReconcilerBuilder<C> {
        CompositeStateReconcilerBuilder {
            fields: BTreeMap::new(),
            _state: PhantomData,
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl<C: CompositeState> StateReconciler for CompositeStateReconciler<C> {
    type State = C;

    #[instrument(skip_all, fields(namespace = %ctx.namespace, field_count = C::FIELDS.len()))]
    async fn reconcile(&self, ctx: &StrategyContext, current: C) -> DomainResult<C> {
        let mut current = match serde_json::to_value(&current) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(DomainError::StateSerialize(format!(
                    "composite state must serialize to an object, got {other}"
                )))
            }
            Err(e) => return Err(DomainError::StateSerialize(e.to_string())),
        };

        let inputs: Vec<(&'static str, Value)> = C::FIELDS
            .iter()
            .map(|&name| (name, current.remove(name).unwrap_or(Value::Null)))
            .collect();

        // Keys outside FIELDS would be dropped when the result is rebuilt.
        if !current.is_empty() {
            return Err(DomainError::IncompleteFieldMapping {
                missing: vec![],
                unknown: current.keys().cloned().collect(),
            });
        }

        let reconciled = try_join_all(inputs.into_iter().map(|(name, value)| {
            let reconciler = self.fields.get(name).cloned();
            reconcile_field(ctx, name, value, reconciler)
        }))
        .await?;

        let mut result = Map::with_capacity(reconciled.len());
        for (name, state) in reconciled {
            result.insert(name.to_string(), state.into_value());
        }

        serde_json::from_value(Value::Object(result)).map_err(|e| DomainError::StateParse(e.to_string()))
    }
}

async fn reconcile_field(
    ctx: &StrategyContext,
    name: &'static str,
    value: Value,
    reconciler: Option<Arc<dyn ErasedStateReconciler>>,
) -> DomainResult<(&'static str, SuiteState)> {
    let wrap = |source: DomainError| DomainError::FieldReconcileFailed {
        field: name.to_string(),
        source: Box::new(source),
    };

    // The builder guarantees a reconciler for every declared field.
    let reconciler = reconciler.ok_or_else(|| {
        wrap(DomainError::IncompleteFieldMapping {
            missing: vec![name.to_string()],
            unknown: vec![],
        })
    })?;

    let wire = serde_json::to_string(&value).map_err(|e| wrap(DomainError::StateSerialize(e.to_string())))?;
    let parsed = reconciler.parse_erased(&wire).map_err(wrap)?;
    let next = reconciler.reconcile_erased(ctx, parsed).await.map_err(wrap)?;

    debug!(field = name, "reconciled composite field");
    Ok((name, next))
}
