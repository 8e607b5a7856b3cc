//! Domain errors for the testplane control plane.

use thiserror::Error;

use crate::domain::ports::StoreError;

/// Domain-level errors that can occur while reconciling suites, test cases
/// and workers.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("No provider registered for strategy '{0}'")]
    ProviderNotFound(String),

    #[error("Provider '{provider}' produced a {actual} behavior, expected a {expected}")]
    WrongBehaviorKind {
        provider: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid configuration for provider '{provider}': {reason}")]
    InvalidConfiguration { provider: String, reason: String },

    #[error("Incomplete field mapping: missing reconcilers for {missing:?}, unknown fields {unknown:?}")]
    IncompleteFieldMapping {
        missing: Vec<String>,
        unknown: Vec<String>,
    },

    #[error("Failed to reconcile field {field}: {source}")]
    FieldReconcileFailed {
        field: String,
        #[source]
        source: Box<DomainError>,
    },

    #[error("Error obtaining strategy: {0}")]
    StrategyResolutionFailed(#[source] Box<DomainError>),

    #[error("Failed to parse state: {0}")]
    StateParse(String),

    #[error("Failed to serialize state: {0}")]
    StateSerialize(String),

    #[error("Invalid timeout '{value}': {reason}")]
    InvalidTimeout { value: String, reason: String },

    #[error("Concurrency conflict: {kind} {key} was modified")]
    VersionConflict { kind: String, key: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: String, key: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("{0}")]
    Execution(String),

    #[error("test timed out after {0}")]
    TimeoutExceeded(String),

    #[error("No test suite found in namespace {0}")]
    NoSuiteFound(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Build an execution error from anything displayable.
    pub fn execution(message: impl std::fmt::Display) -> Self {
        Self::Execution(message.to_string())
    }

    /// Whether retrying on a later invocation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Strip resolution/field wrappers and return the innermost error.
    pub fn root_cause(&self) -> &DomainError {
        match self {
            Self::StrategyResolutionFailed(inner) => inner.root_cause(),
            Self::FieldReconcileFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, key } => DomainError::NotFound {
                kind: kind.to_string(),
                key: key.to_string(),
            },
            StoreError::VersionConflict { kind, key, .. } => DomainError::VersionConflict {
                kind: kind.to_string(),
                key: key.to_string(),
            },
            other => DomainError::Store(other.to_string()),
        }
    }
}
