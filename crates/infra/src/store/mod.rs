//! Tenant-scoped persistence gateway.
//!
//! A [`Transaction`] is opened for one [`TenantContext`] and sees only that
//! tenant's rows. Writes are invisible to other transactions until commit;
//! rolling back discards them, releases any counter rows the transaction
//! advanced, and restores those counters.

pub mod audit;
pub mod in_memory;
mod table;

use praxis_billing::{Invoice, InvoiceId, PaymentEvent};
use praxis_core::{AggregateId, DomainError, TenantContext};
use praxis_parties::{Customer, CustomerId, Project, ProjectId, ProjectMember, ProjectTemplate, ProjectTemplateId};
use praxis_proposals::{Proposal, ProposalId, ProposalStatus};

use crate::deferred::DeferredQueue;
use crate::error::{StoreResult, WorkflowResult};
use crate::sequence::DocumentKind;

pub use audit::AuditRecord;
pub use in_memory::{InMemoryDatabase, InMemoryTransaction};

/// One unit of work against one tenant.
pub trait Transaction {
    fn context(&self) -> &TenantContext;

    /// Side effects waiting for this transaction's outcome.
    fn deferred(&mut self) -> &mut DeferredQueue;

    fn take_deferred(&mut self) -> DeferredQueue;

    /// Advance the (tenant, kind) counter, locking it until this transaction ends.
    fn next_sequence_value(&mut self, kind: DocumentKind) -> StoreResult<u64>;

    fn find_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>>;
    fn save_customer(&mut self, customer: Customer) -> StoreResult<()>;

    fn find_project_template(&self, id: ProjectTemplateId) -> StoreResult<Option<ProjectTemplate>>;
    fn save_project_template(&mut self, template: ProjectTemplate) -> StoreResult<()>;

    fn find_project(&self, id: ProjectId) -> StoreResult<Option<Project>>;
    fn save_project(&mut self, project: Project) -> StoreResult<()>;
    fn project_members(&self, project_id: ProjectId) -> StoreResult<Vec<ProjectMember>>;
    fn save_project_member(&mut self, member: ProjectMember) -> StoreResult<()>;

    fn find_proposal(&self, id: ProposalId) -> StoreResult<Option<Proposal>>;
    fn proposals_by_status(&self, status: ProposalStatus) -> StoreResult<Vec<Proposal>>;
    fn save_proposal(&mut self, proposal: Proposal) -> StoreResult<()>;

    fn find_invoice(&self, id: InvoiceId) -> StoreResult<Option<Invoice>>;
    /// Invoices generated from a proposal, in creation order.
    fn invoices_for_proposal(&self, proposal_id: ProposalId) -> StoreResult<Vec<Invoice>>;
    fn save_invoice(&mut self, invoice: Invoice) -> StoreResult<()>;

    /// Ledger rows for an invoice, oldest first.
    fn payment_events_for_invoice(&self, invoice_id: InvoiceId) -> StoreResult<Vec<PaymentEvent>>;
    fn append_payment_event(&mut self, event: PaymentEvent) -> StoreResult<()>;

    fn append_audit(&mut self, record: AuditRecord) -> StoreResult<()>;
    fn audit_trail(&self, entity_id: AggregateId) -> StoreResult<Vec<AuditRecord>>;

    fn commit(self) -> StoreResult<()>
    where
        Self: Sized;

    fn rollback(self) -> StoreResult<()>
    where
        Self: Sized;

    fn load_customer(&self, id: CustomerId) -> WorkflowResult<Customer> {
        self.find_customer(id)?
            .ok_or_else(|| DomainError::not_found("customer", id).into())
    }

    fn load_proposal(&self, id: ProposalId) -> WorkflowResult<Proposal> {
        self.find_proposal(id)?
            .ok_or_else(|| DomainError::not_found("proposal", id).into())
    }

    fn load_invoice(&self, id: InvoiceId) -> WorkflowResult<Invoice> {
        self.find_invoice(id)?
            .ok_or_else(|| DomainError::not_found("invoice", id).into())
    }
}

/// Source of transactions.
pub trait Database: Send + Sync {
    type Tx: Transaction + 'static;

    fn begin(&self, ctx: TenantContext) -> StoreResult<Self::Tx>;
}

impl<D> Database for std::sync::Arc<D>
where
    D: Database + ?Sized,
{
    type Tx = D::Tx;

    fn begin(&self, ctx: TenantContext) -> StoreResult<Self::Tx> {
        (**self).begin(ctx)
    }
}
