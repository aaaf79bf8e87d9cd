//! Entry point for callers: one method per workflow operation, each run in
//! its own transaction through the [`TransactionRunner`].

use std::sync::Arc;

use rust_decimal::Decimal;

use praxis_billing::{Invoice, InvoiceId, InvoiceLineId};
use praxis_core::{MemberId, TenantBinding, TenantContext};
use praxis_parties::{PortalContactId, ProjectTemplateId};
use praxis_proposals::{FeeArrangement, Proposal, ProposalId};

use crate::clock::{Clock, SystemClock};
use crate::config::WorkflowConfig;
use crate::deferred::DeferredEventDispatcher;
use crate::error::WorkflowResult;
use crate::ports::{CheckoutSession, Collaborators, ProjectService};
use crate::runner::TransactionRunner;
use crate::sequence::{DocumentKind, SequenceAllocator};
use crate::store::Database;
use crate::workflow::{
    InvoiceWorkflow, MilestoneDraft, NewInvoice, NewProposal, OrchestrationResult,
    PaymentReconciliationEngine, PaymentSessionWorkflow, ProposalAcceptanceOrchestrator,
    ProposalExpiry, ProposalWorkflow, ReconciliationOutcome, SweepReport, WebhookResult,
};

pub struct WorkflowEngine<D> {
    runner: TransactionRunner<D>,
    clock: Arc<dyn Clock>,
    numbers: SequenceAllocator,
    proposals: ProposalWorkflow,
    acceptance: ProposalAcceptanceOrchestrator,
    expiry: ProposalExpiry,
    invoices: InvoiceWorkflow,
    sessions: PaymentSessionWorkflow,
    reconciliation: PaymentReconciliationEngine,
}

impl<D: Database> WorkflowEngine<D> {
    pub fn new(
        db: D,
        collaborators: Collaborators,
        projects: Arc<dyn ProjectService>,
        config: &WorkflowConfig,
    ) -> Self {
        let sessions = PaymentSessionWorkflow::new(collaborators.payments.clone());
        Self {
            runner: TransactionRunner::new(db, DeferredEventDispatcher::new(collaborators)),
            clock: Arc::new(SystemClock),
            numbers: SequenceAllocator::from_config(config),
            proposals: ProposalWorkflow::from_config(config),
            acceptance: ProposalAcceptanceOrchestrator::new(projects, config.default_payment_terms_days),
            expiry: ProposalExpiry,
            invoices: InvoiceWorkflow::from_config(config),
            sessions,
            reconciliation: PaymentReconciliationEngine,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn runner(&self) -> &TransactionRunner<D> {
        &self.runner
    }

    /// Allocate a document number on its own.
    pub fn allocate_number(&self, ctx: TenantContext, kind: DocumentKind) -> WorkflowResult<String> {
        self.runner.execute(ctx, |tx| self.numbers.allocate(tx, kind))
    }

    // Proposals

    pub fn create_proposal(&self, ctx: TenantContext, new: NewProposal) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| self.proposals.create(tx, new, now))
    }

    pub fn rename_proposal(&self, ctx: TenantContext, id: ProposalId, title: String) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner
            .execute(ctx, |tx| self.proposals.edit(tx, id, "renamed", now, |p| p.rename(title)))
    }

    pub fn set_proposal_fee(&self, ctx: TenantContext, id: ProposalId, fee: FeeArrangement) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner
            .execute(ctx, |tx| self.proposals.edit(tx, id, "fee_changed", now, |p| p.set_fee(fee)))
    }

    pub fn bind_portal_contact(
        &self,
        ctx: TenantContext,
        id: ProposalId,
        contact: PortalContactId,
    ) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| {
            self.proposals
                .edit(tx, id, "contact_bound", now, |p| p.bind_portal_contact(contact))
        })
    }

    pub fn set_project_template(
        &self,
        ctx: TenantContext,
        id: ProposalId,
        template: Option<ProjectTemplateId>,
    ) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| {
            self.proposals
                .edit(tx, id, "template_changed", now, |p| p.use_template(template))
        })
    }

    pub fn add_team_member(
        &self,
        ctx: TenantContext,
        id: ProposalId,
        member_id: MemberId,
        role: Option<String>,
    ) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| {
            self.proposals
                .edit(tx, id, "team_member_added", now, |p| p.add_team_member(member_id, role))
        })
    }

    pub fn remove_team_member(&self, ctx: TenantContext, id: ProposalId, member_id: MemberId) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| {
            self.proposals
                .edit(tx, id, "team_member_removed", now, |p| p.remove_team_member(member_id))
        })
    }

    pub fn replace_milestones(
        &self,
        ctx: TenantContext,
        id: ProposalId,
        milestones: Vec<MilestoneDraft>,
    ) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner
            .execute(ctx, |tx| self.proposals.replace_milestones(tx, id, milestones, now))
    }

    pub fn send_proposal(&self, ctx: TenantContext, id: ProposalId) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| self.proposals.send(tx, id, now))
    }

    pub fn accept_proposal(
        &self,
        ctx: TenantContext,
        id: ProposalId,
        contact: PortalContactId,
    ) -> WorkflowResult<OrchestrationResult> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| self.acceptance.accept(tx, id, contact, now))
    }

    pub fn decline_proposal(
        &self,
        ctx: TenantContext,
        id: ProposalId,
        contact: PortalContactId,
        reason: Option<String>,
    ) -> WorkflowResult<Proposal> {
        let now = self.clock.now();
        self.runner
            .execute(ctx, |tx| self.proposals.decline(tx, id, contact, reason, now))
    }

    pub fn expire_overdue_proposals(&self, tenants: &[TenantBinding]) -> SweepReport {
        self.expiry.sweep(&self.runner, tenants, self.clock.now())
    }

    // Invoices

    pub fn create_invoice(&self, ctx: TenantContext, new: NewInvoice) -> WorkflowResult<Invoice> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| self.invoices.create_draft(tx, new, now))
    }

    pub fn add_invoice_line(
        &self,
        ctx: TenantContext,
        id: InvoiceId,
        description: String,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> WorkflowResult<InvoiceLineId> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| {
            self.invoices
                .add_line(tx, id, description, quantity, unit_price, now)
        })
    }

    pub fn update_invoice_line(
        &self,
        ctx: TenantContext,
        id: InvoiceId,
        line_id: InvoiceLineId,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> WorkflowResult<Invoice> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| {
            self.invoices
                .update_line(tx, id, line_id, quantity, unit_price, now)
        })
    }

    pub fn remove_invoice_line(&self, ctx: TenantContext, id: InvoiceId, line_id: InvoiceLineId) -> WorkflowResult<Invoice> {
        let now = self.clock.now();
        self.runner
            .execute(ctx, |tx| self.invoices.remove_line(tx, id, line_id, now))
    }

    pub fn set_invoice_tax(&self, ctx: TenantContext, id: InvoiceId, tax_amount: Decimal) -> WorkflowResult<Invoice> {
        let now = self.clock.now();
        self.runner
            .execute(ctx, |tx| self.invoices.set_tax_amount(tx, id, tax_amount, now))
    }

    pub fn approve_invoice(&self, ctx: TenantContext, id: InvoiceId) -> WorkflowResult<Invoice> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| self.invoices.approve(tx, id, now))
    }

    pub fn send_invoice(&self, ctx: TenantContext, id: InvoiceId) -> WorkflowResult<Invoice> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| self.invoices.send(tx, id, now))
    }

    pub fn void_invoice(&self, ctx: TenantContext, id: InvoiceId, reason: Option<String>) -> WorkflowResult<Invoice> {
        let now = self.clock.now();
        self.runner.execute(ctx, |tx| self.invoices.void(tx, id, reason, now))
    }

    pub fn record_manual_payment(
        &self,
        ctx: TenantContext,
        id: InvoiceId,
        payment_reference: Option<String>,
    ) -> WorkflowResult<Invoice> {
        let now = self.clock.now();
        self.runner
            .execute(ctx, |tx| self.invoices.record_payment(tx, id, payment_reference, now))
    }

    // Payments

    pub fn create_payment_session(
        &self,
        ctx: TenantContext,
        id: InvoiceId,
        provider_slug: &str,
    ) -> WorkflowResult<CheckoutSession> {
        let now = self.clock.now();
        self.runner
            .execute(ctx, |tx| self.sessions.create_session(tx, id, provider_slug, now))
    }

    /// Apply a verified provider callback for `tenant`. Runs as the system
    /// actor.
    pub fn reconcile_payment(
        &self,
        tenant: TenantBinding,
        callback: &WebhookResult,
        provider_slug: &str,
    ) -> WorkflowResult<ReconciliationOutcome> {
        let now = self.clock.now();
        self.runner.execute(TenantContext::system(tenant), |tx| {
            self.reconciliation.reconcile(tx, callback, provider_slug, now)
        })
    }
}
