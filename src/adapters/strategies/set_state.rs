//! `set-state`: a worker that writes one value into suite state.
//!
//! Configuration:
//! - `path` (required): JSON pointer to write, intermediate objects are
//!   created as needed;
//! - `value` (required): JSON value, or a bare string if it does not parse;
//! - `when` / `equals`: dispatch gate, see [`StateGate`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::gate::{parse_json_or_string, StateGate};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Configuration, SuiteState};
use crate::domain::ports::{Behavior, MutateStateFn, StrategyContext, TestWorkerBehavior};

pub const PROVIDER: &str = "set-state";

#[derive(Debug, Clone)]
pub struct SetStateWorker {
    path: String,
    value: Value,
    gate: StateGate,
}

impl SetStateWorker {
    pub fn from_configuration(configuration: &Configuration) -> DomainResult<Self> {
        let invalid = |reason: &str| DomainError::InvalidConfiguration {
            provider: PROVIDER.to_string(),
            reason: reason.to_string(),
        };

        let path = configuration
            .get("path")
            .cloned()
            .ok_or_else(|| invalid("'path' is required"))?;
        if !path.starts_with('/') {
            return Err(invalid("'path' must be a JSON pointer starting with '/'"));
        }

        let value = configuration
            .get("value")
            .map(String::as_str)
            .map(parse_json_or_string)
            .ok_or_else(|| invalid("'value' is required"))?;

        Ok(Self {
            path,
            value,
            gate: StateGate::from_configuration(PROVIDER, configuration)?,
        })
    }

    /// Provider entry point for the registry.
    pub fn provide(configuration: &Configuration) -> DomainResult<Behavior> {
        Self::from_configuration(configuration).map(Behavior::test_worker)
    }
}

#[async_trait]
impl TestWorkerBehavior for SetStateWorker {
    fn should_run(&self, state: &SuiteState) -> bool {
        self.gate.is_open(state)
    }

    async fn run(&self, _ctx: StrategyContext) -> DomainResult<MutateStateFn> {
        let path = self.path.clone();
        let value = self.value.clone();
        Ok(Arc::new(move |mut state: SuiteState| -> DomainResult<SuiteState> {
            set_pointer(state.value_mut(), &path, value.clone())?;
            Ok(state)
        }))
    }
}

/// Write `value` at `pointer`, creating intermediate objects.
fn set_pointer(root: &mut Value, pointer: &str, value: Value) -> DomainResult<()> {
    let tokens: Vec<String> = pointer
        .split('/')
        .skip(1)
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect();

    let Some((last, parents)) = tokens.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for token in parents {
        current = child_mut(current, token, pointer)?;
    }

    match current {
        Value::Array(items) => {
            let index = array_index(token_index(last, pointer)?, items.len(), pointer)?;
            if index == items.len() {
                items.push(value);
            } else {
                items[index] = value;
            }
        }
        other => {
            if !other.is_object() {
                *other = Value::Object(Map::new());
            }
            if let Value::Object(map) = other {
                map.insert(last.clone(), value);
            }
        }
    }
    Ok(())
}

fn child_mut<'a>(current: &'a mut Value, token: &str, pointer: &str) -> DomainResult<&'a mut Value> {
    if !current.is_object() && !current.is_array() {
        *current = Value::Object(Map::new());
    }

    match current {
        Value::Array(items) => {
            let len = items.len();
            let index = token_index(token, pointer)?;
            items.get_mut(index).ok_or_else(|| out_of_bounds(pointer, index, len))
        }
        Value::Object(map) => Ok(map
            .entry(token.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        _ => Err(DomainError::execution(format!("cannot descend into '{pointer}'"))),
    }
}

fn token_index(token: &str, pointer: &str) -> DomainResult<usize> {
    token
        .parse()
        .map_err(|_| DomainError::execution(format!("'{token}' in '{pointer}' is not an array index")))
}

fn array_index(index: usize, len: usize, pointer: &str) -> DomainResult<usize> {
    if index > len {
        Err(out_of_bounds(pointer, index, len))
    } else {
        Ok(index)
    }
}

fn out_of_bounds(pointer: &str, index: usize, len: usize) -> DomainError {
    DomainError::execution(format!("index {index} out of bounds for '{pointer}' (length {len})"))
}
