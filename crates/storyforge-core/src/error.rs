//! Domain error types.

use thiserror::Error;

/// Top-level domain error type.
///
/// Every failed stage transition, counter update or cache write surfaces as
/// one of these variants. The core never retries internally.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The addressed row does not exist.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// The kind of record that was looked up.
        entity: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// A unique key is already taken; fetch the existing record instead.
    #[error("{entity} already exists: {key}")]
    Conflict {
        /// The kind of record that collided.
        entity: &'static str,
        /// The colliding key.
        key: String,
    },

    /// The caller does not own the record it tried to change.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The record was force-failed by the stale-task sweeper.
    #[error("stale: {0}")]
    Stale(String),

    /// The requested status change is not in the transition table, or the
    /// record is not in the status the change has to start from.
    #[error("{}", describe_transition(.from, .to, .expected.as_deref()))]
    InvalidTransition {
        /// Status the record was in.
        from: String,
        /// Status that was requested.
        to: String,
        /// Status the change has to start from, when the caller named one.
        expected: Option<String>,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// Store connectivity problem or elapsed deadline; safe for the caller to retry.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// The store failed in a way retrying will not fix, such as a schema
    /// mismatch or a protocol fault.
    #[error("storage error: {0}")]
    Storage(String),
}

fn describe_transition(from: &str, to: &str, expected: Option<&str>) -> String {
    match expected {
        Some(expected) if expected != from => {
            format!("cannot move to {to}: record is in {from}, expected {expected}")
        }
        _ => format!("invalid transition from {from} to {to}"),
    }
}

impl DomainError {
    /// Shorthand for [`DomainError::NotFound`].
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Shorthand for [`DomainError::Conflict`].
    pub fn conflict(entity: &'static str, key: impl ToString) -> Self {
        Self::Conflict {
            entity,
            key: key.to_string(),
        }
    }

    /// Shorthand for [`DomainError::InvalidTransition`].
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            expected: None,
        }
    }

    /// A [`DomainError::InvalidTransition`] for a guarded write that required
    /// the record to be in `expected` but found it in `actual`.
    pub fn unexpected_status(
        actual: impl ToString,
        expected: impl ToString,
        requested: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            from: actual.to_string(),
            to: requested.to_string(),
            expected: Some(expected.to_string()),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }
}
