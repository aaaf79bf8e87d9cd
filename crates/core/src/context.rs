//! Per-operation tenant context.
//!
//! A [`TenantContext`] is resolved by the caller (API layer, scheduler) and
//! passed explicitly into every workflow operation. Nothing in the engine
//! reads tenant identity from ambient state.

use serde::{Deserialize, Serialize};

use crate::id::{MemberId, OrgId, TenantId};

/// Role the acting party holds inside the tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Owner,
    Admin,
    Member,
    /// External customer contact acting through the client portal.
    PortalContact,
    /// The engine itself (deferred callbacks, scheduled sweeps).
    System,
}

/// Tenant context for one logical operation.
///
/// Immutable for the duration of the operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    tenant_id: TenantId,
    org_id: OrgId,
    actor_id: MemberId,
    actor_role: ActorRole,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, org_id: OrgId, actor_id: MemberId, actor_role: ActorRole) -> Self {
        Self {
            tenant_id,
            org_id,
            actor_id,
            actor_role,
        }
    }

    /// Context for work the engine performs on a tenant's behalf.
    ///
    /// The actor id is derived from the tenant id so that audit records of
    /// system work are stable per tenant.
    pub fn system(binding: TenantBinding) -> Self {
        Self {
            tenant_id: binding.tenant_id,
            org_id: binding.org_id,
            actor_id: MemberId::from_uuid(*binding.tenant_id.as_uuid()),
            actor_role: ActorRole::System,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn actor_id(&self) -> MemberId {
        self.actor_id
    }

    pub fn actor_role(&self) -> ActorRole {
        self.actor_role
    }

    /// Name of the tenant's isolated database schema.
    pub fn schema_name(&self) -> String {
        self.binding().schema_name()
    }

    /// Capture the tenant identity for re-attachment after this operation ends.
    pub fn binding(&self) -> TenantBinding {
        TenantBinding {
            tenant_id: self.tenant_id,
            org_id: self.org_id,
        }
    }
}

/// Tenant identity captured at queue time and re-bound before deferred work runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantBinding {
    pub tenant_id: TenantId,
    pub org_id: OrgId,
}

impl TenantBinding {
    pub fn schema_name(&self) -> String {
        format!("tenant_{}", self.tenant_id.as_uuid().simple())
    }
}
