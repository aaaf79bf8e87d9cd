use serde::{Deserialize, Serialize};
use uuid::Uuid;

use praxis_core::{AggregateId, OrgId, TenantBinding, TenantId};

/// Envelope for a published event: tenant + aggregate metadata around a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,
    org_id: OrgId,

    aggregate_id: AggregateId,
    aggregate_type: String,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        binding: TenantBinding,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id: binding.tenant_id,
            org_id: binding.org_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
