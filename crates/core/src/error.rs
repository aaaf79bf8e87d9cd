//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is deterministic: retrying the same call against the same
/// state yields the same error. Infrastructure failures live in the infra
/// crate's own error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced entity is absent in the active tenant.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Valid entity, wrong lifecycle state for the requested operation
    /// (including guarded setters on a non-editable entity).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transition not permitted by the entity's state machine.
    ///
    /// Indicates a logic or double-submission bug; callers must not retry.
    #[error("cannot {action} while {current}")]
    InvalidState { action: String, current: String },

    /// The acting party does not match the party bound to the entity.
    #[error("mismatch: {0}")]
    Mismatch(String),

    /// A value failed validation (e.g. milestone percentages).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_state(action: impl Into<String>, current: impl ToString) -> Self {
        Self::InvalidState {
            action: action.into(),
            current: current.to_string(),
        }
    }

    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::Mismatch(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether a caller may reasonably retry the operation after re-reading state.
    ///
    /// None of the domain errors are transient.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
