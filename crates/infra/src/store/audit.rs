use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use praxis_core::{ActorRole, AggregateId, MemberId, TenantContext, TenantId};

use super::Transaction;
use crate::error::StoreResult;

/// One state change, written in the same transaction as the change itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub actor_id: MemberId,
    pub actor_role: ActorRole,
    pub entity_type: String,
    pub entity_id: AggregateId,
    pub action: String,
    pub details: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        ctx: &TenantContext,
        entity_type: impl Into<String>,
        entity_id: AggregateId,
        action: impl Into<String>,
        details: JsonValue,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id: ctx.tenant_id(),
            actor_id: ctx.actor_id(),
            actor_role: ctx.actor_role(),
            entity_type: entity_type.into(),
            entity_id,
            action: action.into(),
            details,
            occurred_at,
        }
    }
}

/// Append an audit record attributed to the transaction's actor.
pub fn record(
    tx: &mut dyn Transaction,
    entity_type: &str,
    entity_id: AggregateId,
    action: &str,
    details: JsonValue,
    occurred_at: DateTime<Utc>,
) -> StoreResult<()> {
    let record = AuditRecord::new(tx.context(), entity_type, entity_id, action, details, occurred_at);
    tx.append_audit(record)
}
