//! Aggregate and entity markers.

/// Aggregate root marker + minimal interface.
///
/// An aggregate root is the unit the persistence gateway loads and saves by
/// id. Everything it owns (invoice lines, proposal milestones, team members)
/// is persisted with it and never addressed on its own.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Stable type name used for audit records and event envelopes
    /// (e.g. `"billing.invoice"`).
    fn aggregate_type() -> &'static str
    where
        Self: Sized;
}

/// Entity owned by an aggregate (identity + continuity across state changes).
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
