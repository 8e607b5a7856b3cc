//! Erased suite state.
//!
//! Concrete state reconcilers are typed over their own state shape. Between
//! layers (registry, dispatch predicates, worker mutations) state travels as a
//! JSON value tree, and it is persisted as JSON text.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};

/// State string used when neither the current nor the initial state is set.
pub const EMPTY_STATE: &str = "{}";

/// Suite state at an erased boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteState(Value);

impl SuiteState {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse persisted state text.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        serde_json::from_str(raw)
            .map(Self)
            .map_err(|e| DomainError::StateParse(e.to_string()))
    }

    /// Convert a typed state into its erased form.
    pub fn encode<T: Serialize>(state: &T) -> DomainResult<Self> {
        serde_json::to_value(state)
            .map(Self)
            .map_err(|e| DomainError::StateSerialize(e.to_string()))
    }

    /// Decode into a typed state shape.
    pub fn decode<T: DeserializeOwned>(&self) -> DomainResult<T> {
        T::deserialize(&self.0).map_err(|e| DomainError::StateParse(e.to_string()))
    }

    pub fn to_json(&self) -> DomainResult<String> {
        serde_json::to_string(&self.0).map_err(|e| DomainError::StateSerialize(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> DomainResult<String> {
        serde_json::to_string_pretty(&self.0)
            .map_err(|e| DomainError::StateSerialize(e.to_string()))
    }

    /// Look up a value by JSON pointer (`/a/b/0`).
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for SuiteState {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Pick the state text to reconcile from: the persisted state, else the
/// declared initial state, else an empty object.
pub fn effective_state<'a>(current: &'a str, initial: &'a str) -> &'a str {
    if !current.is_empty() {
        current
    } else if !initial.is_empty() {
        initial
    } else {
        EMPTY_STATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize, Serialize)]
    struct Components {
        ready: bool,
    }

    #[test]
    fn test_effective_state_fallbacks() {
        assert_eq!(effective_state(r#"{"a":1}"#, r#"{"b":2}"#), r#"{"a":1}"#);
        assert_eq!(effective_state("", r#"{"b":2}"#), r#"{"b":2}"#);
        assert_eq!(effective_state("", ""), EMPTY_STATE);
    }

    #[test]
    fn test_decode_typed_state() {
        let state = SuiteState::new(json!({"ready": true}));
        let typed: Components = state.decode().unwrap();
        assert_eq!(typed, Components { ready: true });
        assert_eq!(SuiteState::encode(&typed).unwrap(), state);
    }

    #[test]
    fn test_parse_rejects_invalid_text() {
        let err = SuiteState::parse("{not json").unwrap_err();
        assert!(matches!(err, DomainError::StateParse(_)));
    }

    #[test]
    fn test_pointer_lookup() {
        let state = SuiteState::new(json!({"pods": {"web": "Ready"}}));
        assert_eq!(state.pointer("/pods/web"), Some(&json!("Ready")));
        assert_eq!(state.pointer("/pods/db"), None);
    }
}
