//! Strategy descriptors: a provider name plus its configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider configuration is a flat string map.
pub type Configuration = BTreeMap<String, String>;

/// Declarative reference to a pluggable behavior.
///
/// `provider` must match a name registered in the
/// [`StrategyRegistry`](crate::services::StrategyRegistry) in use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    pub provider: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configuration: Configuration,
}

impl StrategyDescriptor {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            configuration: Configuration::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for StrategyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.provider)?;
        if !self.configuration.is_empty() {
            let pairs: Vec<String> = self
                .configuration
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, "({})", pairs.join(", "))?;
        }
        Ok(())
    }
}
