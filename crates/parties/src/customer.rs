use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use praxis_core::{AggregateRoot, DomainError, DomainResult, Lifecycle, typed_id};

typed_id!(
    /// Customer identifier (tenant-scoped).
    CustomerId
);

typed_id!(
    /// Identifier of a customer's portal contact (external person who can
    /// accept or decline proposals through the client portal).
    PortalContactId
);

/// Customer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStatus {
    Prospect,
    Onboarding,
    Active,
    Dormant,
    Offboarded,
}

impl core::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            LifecycleStatus::Prospect => "PROSPECT",
            LifecycleStatus::Onboarding => "ONBOARDING",
            LifecycleStatus::Active => "ACTIVE",
            LifecycleStatus::Dormant => "DORMANT",
            LifecycleStatus::Offboarded => "OFFBOARDED",
        };
        f.write_str(s)
    }
}

impl Lifecycle for LifecycleStatus {
    const ALL: &'static [Self] = &[
        LifecycleStatus::Prospect,
        LifecycleStatus::Onboarding,
        LifecycleStatus::Active,
        LifecycleStatus::Dormant,
        LifecycleStatus::Offboarded,
    ];
    const ENTITY: &'static str = "customer";

    fn can_transition(self, target: Self) -> bool {
        use LifecycleStatus::*;
        matches!(
            (self, target),
            (Prospect, Onboarding)
                | (Prospect, Offboarded)
                | (Onboarding, Active)
                | (Onboarding, Offboarded)
                | (Active, Dormant)
                | (Active, Offboarded)
                | (Dormant, Active)
                | (Dormant, Offboarded)
        )
    }
}

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    lifecycle_status: LifecycleStatus,
    lifecycle_changed_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn prospect(id: CustomerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            lifecycle_status: LifecycleStatus::Prospect,
            lifecycle_changed_at: None,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle_status(&self) -> LifecycleStatus {
        self.lifecycle_status
    }

    pub fn lifecycle_changed_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle_changed_at
    }

    /// Projects may only be opened for customers past the prospect stage
    /// and not yet offboarded.
    pub fn can_start_projects(&self) -> bool {
        !matches!(
            self.lifecycle_status,
            LifecycleStatus::Prospect | LifecycleStatus::Offboarded
        )
    }

    pub fn ensure_can_start_projects(&self) -> DomainResult<()> {
        if self.can_start_projects() {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "cannot create a project for customer {} while {}",
                self.id, self.lifecycle_status
            )))
        }
    }

    /// Move to `target`, returning the previous status.
    pub fn transition_lifecycle(
        &mut self,
        target: LifecycleStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<LifecycleStatus> {
        let previous = self.lifecycle_status;
        self.lifecycle_status = previous.transition(target, "change customer lifecycle")?;
        self.lifecycle_changed_at = Some(at);
        Ok(previous)
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn aggregate_type() -> &'static str {
        "parties.customer"
    }
}
