//! `when`/`equals` dispatch gate shared by the built-in providers.

use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Configuration, SuiteState};

/// Predicate over suite state built from provider configuration.
///
/// - no `when`: always open;
/// - `when` only: open when the pointed-at value exists and is neither
///   `null` nor `false`;
/// - `when` and `equals`: open when the pointed-at value equals `equals`
///   (parsed as JSON, falling back to a plain string).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateGate {
    when: Option<String>,
    equals: Option<Value>,
}

impl StateGate {
    pub fn from_configuration(provider: &str, configuration: &Configuration) -> DomainResult<Self> {
        let when = configuration.get("when").cloned();
        if let Some(pointer) = &when {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(DomainError::InvalidConfiguration {
                    provider: provider.to_string(),
                    reason: format!("'when' must be a JSON pointer starting with '/', got '{pointer}'"),
                });
            }
        }

        let equals = configuration.get("equals").map(String::as_str).map(parse_json_or_string);
        if equals.is_some() && when.is_none() {
            return Err(DomainError::InvalidConfiguration {
                provider: provider.to_string(),
                reason: "'equals' requires 'when'".to_string(),
            });
        }

        Ok(Self { when, equals })
    }

    pub fn is_open(&self, state: &SuiteState) -> bool {
        let Some(pointer) = &self.when else {
            return true;
        };

        match (state.pointer(pointer), &self.equals) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(actual), None) => !matches!(actual, Value::Null | Value::Bool(false)),
            (None, _) => false,
        }
    }
}

/// Parse `raw` as JSON, treating anything unparsable as a bare string.
pub fn parse_json_or_string(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate(pairs: &[(&str, &str)]) -> DomainResult<StateGate> {
        let configuration: Configuration = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StateGate::from_configuration("test", &configuration)
    }

    #[test]
    fn test_no_condition_is_open() {
        assert!(gate(&[]).unwrap().is_open(&SuiteState::default()));
    }

    #[test]
    fn test_truthy_pointer() {
        let gate = gate(&[("when", "/ready")]).unwrap();
        assert!(gate.is_open(&SuiteState::new(json!({"ready": true}))));
        assert!(gate.is_open(&SuiteState::new(json!({"ready": "yes"}))));
        assert!(!gate.is_open(&SuiteState::new(json!({"ready": false}))));
        assert!(!gate.is_open(&SuiteState::new(json!({}))));
    }

    #[test]
    fn test_equals_parses_json_then_string() {
        let numeric = gate(&[("when", "/count"), ("equals", "3")]).unwrap();
        assert!(numeric.is_open(&SuiteState::new(json!({"count": 3}))));
        assert!(!numeric.is_open(&SuiteState::new(json!({"count": "3"}))));

        let text = gate(&[("when", "/pods/web"), ("equals", "Ready")]).unwrap();
        assert!(text.is_open(&SuiteState::new(json!({"pods": {"web": "Ready"}}))));
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            gate(&[("when", "ready")]),
            Err(DomainError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            gate(&[("equals", "1")]),
            Err(DomainError::InvalidConfiguration { .. })
        ));
    }
}
