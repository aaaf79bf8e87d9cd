//! Side effects tied to a transaction's outcome.
//!
//! Workflow code queues [`SideEffect`]s on the transaction instead of calling
//! collaborators directly. Each queued action records the tenant it was
//! queued for. Once the transaction has committed or rolled back, the
//! [`DeferredEventDispatcher`] runs the actions registered for that outcome
//! under a context rebuilt from the recorded tenant.

mod dispatcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use praxis_core::{AggregateId, MemberId, TenantBinding};
use praxis_events::WorkflowEvent;
use praxis_parties::{CustomerId, ProjectId};
use praxis_proposals::{Proposal, ProposalId, ProposalStatus};

pub use dispatcher::{DeferredEventDispatcher, DispatchReport};

/// How the enclosing transaction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed,
    RolledBack { reason: String },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Member(MemberId),
    /// Every owner and admin of the tenant.
    Admins,
}

/// In-app notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<AggregateId>,
    /// Filled with the rollback reason for actions that run on rollback.
    pub details: Option<String>,
}

impl Notification {
    pub fn new(
        recipient: Recipient,
        kind: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient,
            kind: kind.into(),
            title: title.into(),
            body: body.into(),
            entity_type: None,
            entity_id: None,
            details: None,
        }
    }

    pub fn about(mut self, entity_type: impl Into<String>, entity_id: AggregateId) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id);
        self
    }
}

/// Denormalized proposal state for the client portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSnapshot {
    pub proposal_id: ProposalId,
    pub number: String,
    pub title: String,
    pub customer_id: CustomerId,
    pub status: ProposalStatus,
    pub fee_summary: String,
    pub project_id: Option<ProjectId>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Proposal> for ProposalSnapshot {
    fn from(proposal: &Proposal) -> Self {
        Self {
            proposal_id: proposal.id_typed(),
            number: proposal.number().to_string(),
            title: proposal.title().to_string(),
            customer_id: proposal.customer_id(),
            status: proposal.status(),
            fee_summary: proposal.fee_summary(),
            project_id: proposal.created_project_id(),
            expires_at: proposal.expires_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    Notify(Notification),
    SyncProposal(ProposalSnapshot),
    Publish(WorkflowEvent),
    ExpirePaymentSession {
        provider_slug: String,
        session_id: String,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Trigger {
    OnCommit,
    OnRollback,
}

impl Trigger {
    fn matches(self, outcome: &TransactionOutcome) -> bool {
        matches!(
            (self, outcome),
            (Trigger::OnCommit, TransactionOutcome::Committed)
                | (Trigger::OnRollback, TransactionOutcome::RolledBack { .. })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredAction {
    pub label: String,
    pub binding: TenantBinding,
    pub trigger: Trigger,
    pub effect: SideEffect,
}

/// Actions queued by one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredQueue {
    binding: TenantBinding,
    actions: Vec<DeferredAction>,
}

impl DeferredQueue {
    pub fn new(binding: TenantBinding) -> Self {
        Self {
            binding,
            actions: Vec::new(),
        }
    }

    pub fn on_commit(&mut self, label: impl Into<String>, effect: SideEffect) {
        self.push(label.into(), Trigger::OnCommit, effect);
    }

    pub fn on_rollback(&mut self, label: impl Into<String>, effect: SideEffect) {
        self.push(label.into(), Trigger::OnRollback, effect);
    }

    fn push(&mut self, label: String, trigger: Trigger, effect: SideEffect) {
        self.actions.push(DeferredAction {
            label,
            binding: self.binding,
            trigger,
            effect,
        });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[DeferredAction] {
        &self.actions
    }

    /// The actions registered for `outcome`, in queue order.
    pub fn for_outcome(self, outcome: &TransactionOutcome) -> Vec<DeferredAction> {
        self.actions
            .into_iter()
            .filter(|a| a.trigger.matches(outcome))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_core::{OrgId, TenantId};

    fn binding() -> TenantBinding {
        TenantBinding {
            tenant_id: TenantId::new(),
            org_id: OrgId::new(),
        }
    }

    fn notify(title: &str) -> SideEffect {
        SideEffect::Notify(Notification::new(Recipient::Admins, "test", title, ""))
    }

    #[test]
    fn outcome_selects_actions() {
        let binding = binding();
        let mut queue = DeferredQueue::new(binding);
        queue.on_commit("a", notify("a"));
        queue.on_rollback("b", notify("b"));
        queue.on_commit("c", notify("c"));

        let committed: Vec<_> = queue
            .clone()
            .for_outcome(&TransactionOutcome::Committed)
            .into_iter()
            .map(|a| a.label)
            .collect();
        assert_eq!(committed, ["a", "c"]);

        let rolled_back = queue.for_outcome(&TransactionOutcome::RolledBack {
            reason: "boom".to_string(),
        });
        assert_eq!(rolled_back.len(), 1);
        assert_eq!(rolled_back[0].label, "b");
        assert_eq!(rolled_back[0].binding, binding);
    }
}
