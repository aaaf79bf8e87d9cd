use thiserror::Error;

use praxis_core::DomainError;

/// Persistence gateway failure.
///
/// These are infrastructure errors, as opposed to domain errors: the same
/// call may succeed when retried.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("transaction already finished")]
    Finished,

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Error surfaced by workflow operations.
///
/// Every variant raised inside a transaction rolls the whole transaction back.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A collaborator (project service, payment gateway) refused the call.
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

impl WorkflowError {
    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            WorkflowError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Domain errors are deterministic; store and collaborator failures may
    /// clear on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Domain(e) => e.is_retryable(),
            WorkflowError::Store(StoreError::Finished) => false,
            WorkflowError::Store(_) | WorkflowError::Collaborator(_) => true,
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_is_not_retryable() {
        let err: WorkflowError = DomainError::invalid_state("accept proposal", "DECLINED").into();
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "cannot accept proposal while DECLINED");
    }

    #[test]
    fn backend_failures_are_retryable() {
        let err: WorkflowError = StoreError::Backend("connection reset".to_string()).into();
        assert!(err.is_retryable());
        assert!(err.domain().is_none());
    }
}
