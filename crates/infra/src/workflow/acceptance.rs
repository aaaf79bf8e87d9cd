//! Proposal acceptance.
//!
//! Accepting a proposal turns it into billable work in one transaction:
//!
//! 1. SENT → ACCEPTED, audited
//! 2. PROSPECT customer → ONBOARDING (project creation is refused for prospects)
//! 3. project, from the proposal's template when it names one
//! 4. proposal team onto the project
//! 5. invoices, for FIXED fees only: one for the whole fee, or one per milestone
//!
//! Any failure rolls all of it back and the proposal's creator is notified
//! after the rollback.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use praxis_billing::{BillingEntityFactory, Invoice, InvoiceId};
use praxis_core::{AggregateRoot, DomainError, MemberId};
use praxis_events::WorkflowEvent;
use praxis_parties::{LifecycleStatus, PortalContactId, ProjectId};
use praxis_proposals::{Proposal, ProposalId, ProposalStatus};

use crate::deferred::{Notification, ProposalSnapshot, Recipient, SideEffect};
use crate::error::WorkflowResult;
use crate::ports::{NewProject, ProjectService};
use crate::store::{Transaction, audit};

/// What an acceptance produced. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub proposal_id: ProposalId,
    pub project_id: ProjectId,
    pub assigned_member_ids: Vec<MemberId>,
    pub created_invoice_ids: Vec<InvoiceId>,
    pub accepted_at: DateTime<Utc>,
}

pub struct ProposalAcceptanceOrchestrator {
    projects: Arc<dyn ProjectService>,
    payment_terms_days: u32,
}

impl ProposalAcceptanceOrchestrator {
    pub fn new(projects: Arc<dyn ProjectService>, payment_terms_days: u32) -> Self {
        Self {
            projects,
            payment_terms_days,
        }
    }

    /// Accept `proposal_id` on behalf of `contact`.
    ///
    /// Accepting an already ACCEPTED proposal returns the original outcome.
    #[instrument(skip(self, tx), fields(tenant_id = %tx.context().tenant_id()))]
    pub fn accept(
        &self,
        tx: &mut dyn Transaction,
        proposal_id: ProposalId,
        contact: PortalContactId,
        now: DateTime<Utc>,
    ) -> WorkflowResult<OrchestrationResult> {
        let mut proposal = tx.load_proposal(proposal_id)?;
        proposal.ensure_contact(contact)?;

        if proposal.status() == ProposalStatus::Accepted {
            debug!(proposal_id = %proposal_id, "proposal already accepted");
            return previous_outcome(&*tx, &proposal);
        }

        proposal.accept(now)?;
        tx.deferred().on_rollback(
            "notify creator: acceptance failed",
            SideEffect::Notify(
                Notification::new(
                    Recipient::Member(proposal.created_by()),
                    "proposal.acceptance_failed",
                    format!("Proposal {} could not be accepted", proposal.number()),
                    format!(
                        "The client accepted {} but setting up the engagement failed. Nothing was created.",
                        proposal.title()
                    ),
                )
                .about(Proposal::aggregate_type(), proposal_id.aggregate_id()),
            ),
        );
        tx.save_proposal(proposal.clone())?;
        audit::record(
            tx,
            Proposal::aggregate_type(),
            proposal_id.aggregate_id(),
            "accepted",
            json!({ "portal_contact_id": contact }),
            now,
        )?;

        let customer = tx.load_customer(proposal.customer_id())?;
        if customer.lifecycle_status() == LifecycleStatus::Prospect {
            self.projects.transition_customer(
                tx,
                proposal.customer_id(),
                LifecycleStatus::Onboarding,
                now,
            )?;
        }

        let project_id = self.projects.create_project(
            tx,
            NewProject {
                customer_id: proposal.customer_id(),
                title: proposal.title().to_string(),
                template_id: proposal.project_template_id(),
                created_by: proposal.created_by(),
                created_at: now,
            },
        )?;

        let mut assigned_member_ids = Vec::with_capacity(proposal.team().len());
        for member in proposal.team() {
            self.projects
                .add_member(tx, project_id, member.member_id, member.role.clone(), now)?;
            assigned_member_ids.push(member.member_id);
        }

        let created_invoice_ids = self.create_billing(tx, &mut proposal, now)?;

        proposal.link_project(project_id)?;
        tx.save_proposal(proposal.clone())?;

        let deferred = tx.deferred();
        deferred.on_commit(
            "sync portal proposal",
            SideEffect::SyncProposal(ProposalSnapshot::from(&proposal)),
        );
        deferred.on_commit(
            "publish proposal accepted",
            SideEffect::Publish(WorkflowEvent::ProposalAccepted {
                proposal_id: proposal_id.aggregate_id(),
                project_id: project_id.aggregate_id(),
                invoice_ids: created_invoice_ids.iter().map(|id| id.aggregate_id()).collect(),
                occurred_at: now,
            }),
        );
        deferred.on_commit(
            "notify creator: proposal accepted",
            SideEffect::Notify(
                Notification::new(
                    Recipient::Member(proposal.created_by()),
                    "proposal.accepted",
                    format!("Proposal {} accepted", proposal.number()),
                    format!("{} was accepted. The project has been set up.", proposal.title()),
                )
                .about(Proposal::aggregate_type(), proposal_id.aggregate_id()),
            ),
        );

        info!(
            proposal_id = %proposal_id,
            project_id = %project_id,
            members = assigned_member_ids.len(),
            invoices = created_invoice_ids.len(),
            "proposal accepted"
        );
        Ok(OrchestrationResult {
            proposal_id,
            project_id,
            assigned_member_ids,
            created_invoice_ids,
            accepted_at: now,
        })
    }

    fn create_billing(
        &self,
        tx: &mut dyn Transaction,
        proposal: &mut Proposal,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Vec<InvoiceId>> {
        let Some(fixed_fee) = proposal.fee().fixed_amount() else {
            debug!(fee_model = %proposal.fee_model(), "no invoices at acceptance");
            return Ok(Vec::new());
        };

        let factory = BillingEntityFactory::new(proposal.currency(), self.payment_terms_days);
        let origin = proposal.id_typed().aggregate_id();
        let milestones = proposal.milestone_billing();

        if milestones.is_empty() {
            let invoice = factory.fixed_fee_invoice(
                origin,
                proposal.customer_id(),
                proposal.created_by(),
                proposal.title(),
                fixed_fee,
                now,
            )?;
            return Ok(vec![save_new_invoice(tx, invoice, now)?]);
        }

        let mut created = Vec::with_capacity(milestones.len());
        for (milestone_id, billing) in milestones {
            let invoice = factory.milestone_invoice(
                origin,
                proposal.customer_id(),
                proposal.created_by(),
                fixed_fee,
                &billing,
                now,
            )?;
            let invoice_id = save_new_invoice(tx, invoice, now)?;
            proposal.link_milestone_invoice(milestone_id, invoice_id)?;
            created.push(invoice_id);
        }
        Ok(created)
    }
}

fn save_new_invoice(tx: &mut dyn Transaction, invoice: Invoice, now: DateTime<Utc>) -> WorkflowResult<InvoiceId> {
    let invoice_id = invoice.id_typed();
    let details = json!({
        "origin": invoice.origin(),
        "total": invoice.total(),
        "due_date": invoice.due_date(),
    });
    tx.save_invoice(invoice)?;
    audit::record(
        tx,
        Invoice::aggregate_type(),
        invoice_id.aggregate_id(),
        "created",
        details,
        now,
    )?;
    Ok(invoice_id)
}

fn previous_outcome(tx: &dyn Transaction, proposal: &Proposal) -> WorkflowResult<OrchestrationResult> {
    let incomplete = || {
        DomainError::conflict(format!(
            "proposal {} is accepted but its engagement is incomplete",
            proposal.number()
        ))
    };
    let project_id = proposal.created_project_id().ok_or_else(incomplete)?;
    let accepted_at = proposal.accepted_at().ok_or_else(incomplete)?;
    let created_invoice_ids = tx
        .invoices_for_proposal(proposal.id_typed())?
        .iter()
        .map(Invoice::id_typed)
        .collect();

    Ok(OrchestrationResult {
        proposal_id: proposal.id_typed(),
        project_id,
        assigned_member_ids: proposal.team().iter().map(|m| m.member_id).collect(),
        created_invoice_ids,
        accepted_at,
    })
}
