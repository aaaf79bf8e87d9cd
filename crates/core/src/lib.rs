//! `praxis-core` — domain foundation building blocks for the back-office engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the per-request tenant context, the error taxonomy, the
//! reusable lifecycle state-machine contract and money rounding rules.

pub mod aggregate;
pub mod context;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod money;

pub use aggregate::{AggregateRoot, Entity};
pub use context::{ActorRole, TenantBinding, TenantContext};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, MemberId, OrgId, TenantId};
pub use lifecycle::{Enforcement, Lifecycle, ensure_editable};
pub use money::{line_amount, percentage_of, round_money};
