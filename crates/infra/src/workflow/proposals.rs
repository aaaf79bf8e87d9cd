use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::info;

use praxis_core::{AggregateRoot, DomainResult};
use praxis_events::WorkflowEvent;
use praxis_parties::{CustomerId, PortalContactId};
use praxis_proposals::{FeeArrangement, Proposal, ProposalId, ProposalMilestone};

use crate::config::WorkflowConfig;
use crate::deferred::{Notification, ProposalSnapshot, Recipient, SideEffect};
use crate::error::WorkflowResult;
use crate::sequence::{DocumentKind, SequenceAllocator};
use crate::store::{Transaction, audit};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProposal {
    pub title: String,
    pub customer_id: CustomerId,
    pub fee: FeeArrangement,
    /// Defaults to the configured currency.
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneDraft {
    pub description: String,
    pub percentage: Decimal,
    pub relative_due_days: u32,
}

/// Authoring, sending and declining proposals.
#[derive(Debug, Clone)]
pub struct ProposalWorkflow {
    numbers: SequenceAllocator,
    currency: String,
    validity: Duration,
}

impl ProposalWorkflow {
    pub fn new(numbers: SequenceAllocator, currency: impl Into<String>, validity: Duration) -> Self {
        Self {
            numbers,
            currency: currency.into(),
            validity,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(
            SequenceAllocator::from_config(config),
            config.default_currency.clone(),
            Duration::days(i64::from(config.proposal_validity_days)),
        )
    }

    pub fn create(&self, tx: &mut dyn Transaction, new: NewProposal, now: DateTime<Utc>) -> WorkflowResult<Proposal> {
        tx.load_customer(new.customer_id)?;
        let number = self.numbers.allocate(tx, DocumentKind::Proposal)?;
        let proposal = Proposal::draft(
            ProposalId::new(),
            number,
            new.title,
            new.customer_id,
            new.fee,
            new.currency.unwrap_or_else(|| self.currency.clone()),
            tx.context().actor_id(),
            now,
        )?;
        tx.save_proposal(proposal.clone())?;
        audit::record(
            tx,
            Proposal::aggregate_type(),
            proposal.id_typed().aggregate_id(),
            "created",
            json!({ "number": proposal.number(), "fee_model": proposal.fee_model().to_string() }),
            now,
        )?;
        info!(proposal_id = %proposal.id_typed(), number = proposal.number(), "proposal created");
        Ok(proposal)
    }

    /// Apply a DRAFT-only change and audit it as `action`.
    pub fn edit(
        &self,
        tx: &mut dyn Transaction,
        proposal_id: ProposalId,
        action: &str,
        now: DateTime<Utc>,
        change: impl FnOnce(&mut Proposal) -> DomainResult<()>,
    ) -> WorkflowResult<Proposal> {
        let mut proposal = tx.load_proposal(proposal_id)?;
        change(&mut proposal)?;
        tx.save_proposal(proposal.clone())?;
        audit::record(
            tx,
            Proposal::aggregate_type(),
            proposal_id.aggregate_id(),
            action,
            JsonValue::Null,
            now,
        )?;
        Ok(proposal)
    }

    /// Replace the whole milestone schedule. Nothing is written unless the
    /// new schedule is valid.
    pub fn replace_milestones(
        &self,
        tx: &mut dyn Transaction,
        proposal_id: ProposalId,
        drafts: Vec<MilestoneDraft>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Proposal> {
        let milestones = drafts
            .into_iter()
            .map(|d| ProposalMilestone::new(d.description, d.percentage, d.relative_due_days))
            .collect::<DomainResult<Vec<_>>>()?;
        let count = milestones.len();
        let proposal = self.edit(tx, proposal_id, "milestones_replaced", now, |p| {
            p.replace_milestones(milestones)
        })?;
        info!(proposal_id = %proposal_id, milestones = count, "milestones replaced");
        Ok(proposal)
    }

    /// DRAFT → SENT; the proposal expires after the configured validity.
    pub fn send(&self, tx: &mut dyn Transaction, proposal_id: ProposalId, now: DateTime<Utc>) -> WorkflowResult<Proposal> {
        let mut proposal = tx.load_proposal(proposal_id)?;
        proposal.send(now, self.validity)?;
        tx.save_proposal(proposal.clone())?;
        audit::record(
            tx,
            Proposal::aggregate_type(),
            proposal_id.aggregate_id(),
            "sent",
            json!({ "expires_at": proposal.expires_at() }),
            now,
        )?;

        let deferred = tx.deferred();
        deferred.on_commit(
            "sync portal proposal",
            SideEffect::SyncProposal(ProposalSnapshot::from(&proposal)),
        );
        deferred.on_commit(
            "publish proposal sent",
            SideEffect::Publish(WorkflowEvent::ProposalSent {
                proposal_id: proposal_id.aggregate_id(),
                number: proposal.number().to_string(),
                occurred_at: now,
            }),
        );
        info!(proposal_id = %proposal_id, number = proposal.number(), "proposal sent");
        Ok(proposal)
    }

    /// SENT → DECLINED by the proposal's portal contact.
    pub fn decline(
        &self,
        tx: &mut dyn Transaction,
        proposal_id: ProposalId,
        contact: PortalContactId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Proposal> {
        let mut proposal = tx.load_proposal(proposal_id)?;
        proposal.ensure_contact(contact)?;
        proposal.decline(reason, now)?;
        tx.save_proposal(proposal.clone())?;
        audit::record(
            tx,
            Proposal::aggregate_type(),
            proposal_id.aggregate_id(),
            "declined",
            json!({ "reason": proposal.decline_reason() }),
            now,
        )?;

        let body = match proposal.decline_reason() {
            Some(reason) => format!("{} was declined: {reason}", proposal.title()),
            None => format!("{} was declined.", proposal.title()),
        };
        let deferred = tx.deferred();
        deferred.on_commit(
            "sync portal proposal",
            SideEffect::SyncProposal(ProposalSnapshot::from(&proposal)),
        );
        deferred.on_commit(
            "publish proposal declined",
            SideEffect::Publish(WorkflowEvent::ProposalDeclined {
                proposal_id: proposal_id.aggregate_id(),
                reason: proposal.decline_reason().map(str::to_string),
                occurred_at: now,
            }),
        );
        deferred.on_commit(
            "notify creator: proposal declined",
            SideEffect::Notify(
                Notification::new(
                    Recipient::Member(proposal.created_by()),
                    "proposal.declined",
                    format!("Proposal {} declined", proposal.number()),
                    body,
                )
                .about(Proposal::aggregate_type(), proposal_id.aggregate_id()),
            ),
        );
        info!(proposal_id = %proposal_id, "proposal declined");
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_core::{ActorRole, DomainError, MemberId, OrgId, TenantContext, TenantId};
    use praxis_parties::Customer;
    use praxis_proposals::ProposalStatus;

    use crate::store::{Database, InMemoryDatabase};

    fn workflow() -> ProposalWorkflow {
        ProposalWorkflow::from_config(&WorkflowConfig::default())
    }

    fn draft(tx: &mut dyn Transaction) -> Proposal {
        let customer = Customer::prospect(CustomerId::new(), "Acme LLP");
        let customer_id = customer.id_typed();
        tx.save_customer(customer).unwrap();
        workflow()
            .create(
                tx,
                NewProposal {
                    title: "Tax return 2026".to_string(),
                    customer_id,
                    fee: FeeArrangement::Fixed {
                        amount: Decimal::new(900_000, 2),
                    },
                    currency: None,
                },
                Utc::now(),
            )
            .unwrap()
    }

    fn ctx() -> TenantContext {
        TenantContext::new(TenantId::new(), OrgId::new(), MemberId::new(), ActorRole::Member)
    }

    fn drafts(percentages: &[i64]) -> Vec<MilestoneDraft> {
        percentages
            .iter()
            .map(|p| MilestoneDraft {
                description: format!("{p}%"),
                percentage: Decimal::from(*p),
                relative_due_days: 14,
            })
            .collect()
    }

    #[test]
    fn create_numbers_proposals_in_order() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let first = draft(&mut tx);
        let second = draft(&mut tx);

        assert_eq!(first.number(), "PROP-0001");
        assert_eq!(second.number(), "PROP-0002");
        assert_eq!(first.currency(), "USD");
        assert_eq!(first.created_by(), tx.context().actor_id());
    }

    #[test]
    fn bad_milestone_schedule_leaves_the_proposal_untouched() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let proposal = draft(&mut tx);
        let id = proposal.id_typed();

        workflow()
            .replace_milestones(&mut tx, id, drafts(&[50, 50]), Utc::now())
            .unwrap();
        let err = workflow()
            .replace_milestones(&mut tx, id, drafts(&[50, 30, 10]), Utc::now())
            .unwrap_err();

        assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
        assert_eq!(tx.load_proposal(id).unwrap().milestones().len(), 2);
        assert_eq!(tx.audit_trail(id.aggregate_id()).unwrap().len(), 2);
    }

    #[test]
    fn sent_proposal_rejects_edits() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let id = draft(&mut tx).id_typed();
        let contact = PortalContactId::new();
        workflow()
            .edit(&mut tx, id, "contact_bound", Utc::now(), |p| p.bind_portal_contact(contact))
            .unwrap();

        let sent = workflow().send(&mut tx, id, Utc::now()).unwrap();
        assert_eq!(sent.status(), ProposalStatus::Sent);
        assert_eq!(tx.deferred().len(), 2);

        let err = workflow()
            .edit(&mut tx, id, "renamed", Utc::now(), |p| p.rename("Something else"))
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[test]
    fn decline_requires_the_bound_contact() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let id = draft(&mut tx).id_typed();
        let contact = PortalContactId::new();
        workflow()
            .edit(&mut tx, id, "contact_bound", Utc::now(), |p| p.bind_portal_contact(contact))
            .unwrap();
        workflow().send(&mut tx, id, Utc::now()).unwrap();

        let err = workflow()
            .decline(&mut tx, id, PortalContactId::new(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Mismatch(_))));

        let declined = workflow()
            .decline(&mut tx, id, contact, Some("Too expensive".to_string()), Utc::now())
            .unwrap();
        assert_eq!(declined.status(), ProposalStatus::Declined);
        assert_eq!(declined.decline_reason(), Some("Too expensive"));
    }
}
