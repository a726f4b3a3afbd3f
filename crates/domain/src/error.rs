//! Domain error types.

use thiserror::Error;

/// Violations of domain rules, raised before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A status change the entity's state machine does not allow.
    #[error("Invalid {entity} status transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Input that fails a field-level rule.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A status string that is not part of the vocabulary.
    #[error("Unknown {entity} status: {value}")]
    UnknownStatus { entity: &'static str, value: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }
}
