//! Guarded lifecycle transitions.
//!
//! Each stateful entity declares its transition table once by implementing
//! [`Lifecycle`] for its status enum. Entities route every status change
//! through [`Lifecycle::transition`] instead of checking state in each setter.

use crate::error::{DomainError, DomainResult};

/// How strictly a transition table is applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Enforcement {
    /// Disallowed transitions fail with [`DomainError::InvalidState`].
    Strict,
    /// Disallowed transitions are logged at `warn` and allowed (append-only
    /// ledgers). Strict rejections log at `error`.
    Advisory,
}

/// State machine contract over a status enum.
pub trait Lifecycle: Copy + Eq + core::fmt::Debug + core::fmt::Display + 'static {
    /// Every state, for exhaustive checks.
    const ALL: &'static [Self];

    /// Entity name used in log lines.
    const ENTITY: &'static str;

    /// Whether `self -> target` is in the allowed transition table.
    fn can_transition(self, target: Self) -> bool;

    /// States with no outgoing transitions.
    fn is_terminal(self) -> bool {
        Self::ALL.iter().all(|t| !self.can_transition(*t))
    }

    fn enforcement() -> Enforcement {
        Enforcement::Strict
    }

    /// Validate `self -> target` and return the new state.
    ///
    /// `action` names the attempted operation (e.g. `"approve"`) and ends up in
    /// the error so the failing call site can be identified from logs.
    fn transition(self, target: Self, action: &str) -> DomainResult<Self> {
        if self.can_transition(target) {
            return Ok(target);
        }

        match Self::enforcement() {
            Enforcement::Strict => {
                tracing::error!(
                    entity = Self::ENTITY,
                    current = %self,
                    target = %target,
                    action,
                    "rejected lifecycle transition"
                );
                Err(DomainError::invalid_state(action, self))
            }
            Enforcement::Advisory => {
                tracing::warn!(
                    entity = Self::ENTITY,
                    current = %self,
                    target = %target,
                    action,
                    "lifecycle transition outside table (advisory)"
                );
                Ok(target)
            }
        }
    }
}

/// Guard for field mutation on DRAFT-only entities.
pub fn ensure_editable<S: Lifecycle>(current: S, editable: S, what: &str) -> DomainResult<()> {
    if current == editable {
        Ok(())
    } else {
        Err(DomainError::conflict(format!(
            "{} is not editable while {current}",
            what
        )))
    }
}
