//! In-memory persistence gateway.
//!
//! Intended for tests/dev. Committed rows live behind one `RwLock`; each
//! transaction stages its writes locally and applies them in one step on
//! commit (last writer wins for everything except counters, which are
//! row-locked in [`CounterTable`]).

use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use uuid::Uuid;

use praxis_billing::{Invoice, InvoiceId, PaymentEvent, PaymentEventId};
use praxis_core::{AggregateId, MemberId, TenantContext, TenantId};
use praxis_parties::{
    Customer, CustomerId, Project, ProjectId, ProjectMember, ProjectTemplate, ProjectTemplateId,
};
use praxis_proposals::{Proposal, ProposalId, ProposalStatus};

use super::audit::AuditRecord;
use super::table::{Staged, TenantTable};
use super::{Database, Transaction};
use crate::deferred::DeferredQueue;
use crate::error::{StoreError, StoreResult};
use crate::sequence::{CounterTable, DocumentKind, TxId};

#[derive(Debug, Default)]
struct Tables {
    customers: TenantTable<CustomerId, Customer>,
    templates: TenantTable<ProjectTemplateId, ProjectTemplate>,
    projects: TenantTable<ProjectId, Project>,
    project_members: TenantTable<(ProjectId, MemberId), ProjectMember>,
    proposals: TenantTable<ProposalId, Proposal>,
    invoices: TenantTable<InvoiceId, Invoice>,
    payment_events: TenantTable<PaymentEventId, PaymentEvent>,
    audit: TenantTable<Uuid, AuditRecord>,
}

#[derive(Debug, Default)]
struct Writes {
    customers: Staged<CustomerId, Customer>,
    templates: Staged<ProjectTemplateId, ProjectTemplate>,
    projects: Staged<ProjectId, Project>,
    project_members: Staged<(ProjectId, MemberId), ProjectMember>,
    proposals: Staged<ProposalId, Proposal>,
    invoices: Staged<InvoiceId, Invoice>,
    payment_events: Staged<PaymentEventId, PaymentEvent>,
    audit: Staged<Uuid, AuditRecord>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    counters: CounterTable,
}

/// Cloneable handle; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    shared: Arc<Shared>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed value the next allocation for (tenant, kind) would receive.
    pub fn peek_sequence(&self, tenant_id: TenantId, kind: DocumentKind) -> StoreResult<u64> {
        self.shared.counters.peek(tenant_id, kind)
    }
}

impl Database for InMemoryDatabase {
    type Tx = InMemoryTransaction;

    fn begin(&self, ctx: TenantContext) -> StoreResult<InMemoryTransaction> {
        let id = self.shared.counters.begin();
        debug!(tenant_id = %ctx.tenant_id(), tx = ?id, "transaction started");
        Ok(InMemoryTransaction {
            shared: self.shared.clone(),
            deferred: DeferredQueue::new(ctx.binding()),
            ctx,
            id,
            writes: Writes::default(),
            finished: false,
        })
    }
}

#[derive(Debug)]
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    ctx: TenantContext,
    id: TxId,
    writes: Writes,
    deferred: DeferredQueue,
    finished: bool,
}

impl InMemoryTransaction {
    fn tenant(&self) -> TenantId {
        self.ctx.tenant_id()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StoreResult<T> {
        let tables = self
            .shared
            .tables
            .read()
            .map_err(|_| StoreError::Poisoned("tables"))?;
        Ok(f(&tables))
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.finished {
            Err(StoreError::Finished)
        } else {
            Ok(())
        }
    }

    fn finish_rollback(&mut self) -> StoreResult<()> {
        self.finished = true;
        self.writes = Writes::default();
        self.shared.counters.rollback(self.id)
    }
}

impl Transaction for InMemoryTransaction {
    fn context(&self) -> &TenantContext {
        &self.ctx
    }

    fn deferred(&mut self) -> &mut DeferredQueue {
        &mut self.deferred
    }

    fn take_deferred(&mut self) -> DeferredQueue {
        std::mem::replace(&mut self.deferred, DeferredQueue::new(self.ctx.binding()))
    }

    fn next_sequence_value(&mut self, kind: DocumentKind) -> StoreResult<u64> {
        self.ensure_open()?;
        self.shared.counters.next_value(self.id, self.tenant(), kind)
    }

    fn find_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        if let Some(staged) = self.writes.customers.get(&id) {
            return Ok(Some(staged.clone()));
        }
        self.read(|t| t.customers.get(self.tenant(), &id).cloned())
    }

    fn save_customer(&mut self, customer: Customer) -> StoreResult<()> {
        self.ensure_open()?;
        self.writes.customers.put(customer.id_typed(), customer);
        Ok(())
    }

    fn find_project_template(&self, id: ProjectTemplateId) -> StoreResult<Option<ProjectTemplate>> {
        if let Some(staged) = self.writes.templates.get(&id) {
            return Ok(Some(staged.clone()));
        }
        self.read(|t| t.templates.get(self.tenant(), &id).cloned())
    }

    fn save_project_template(&mut self, template: ProjectTemplate) -> StoreResult<()> {
        self.ensure_open()?;
        self.writes.templates.put(template.id, template);
        Ok(())
    }

    fn find_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        if let Some(staged) = self.writes.projects.get(&id) {
            return Ok(Some(staged.clone()));
        }
        self.read(|t| t.projects.get(self.tenant(), &id).cloned())
    }

    fn save_project(&mut self, project: Project) -> StoreResult<()> {
        self.ensure_open()?;
        self.writes.projects.put(project.id, project);
        Ok(())
    }

    fn project_members(&self, project_id: ProjectId) -> StoreResult<Vec<ProjectMember>> {
        self.read(|t| {
            t.project_members
                .list_with(self.tenant(), &self.writes.project_members, |m| m.project_id == project_id)
        })
    }

    fn save_project_member(&mut self, member: ProjectMember) -> StoreResult<()> {
        self.ensure_open()?;
        self.writes
            .project_members
            .put((member.project_id, member.member_id), member);
        Ok(())
    }

    fn find_proposal(&self, id: ProposalId) -> StoreResult<Option<Proposal>> {
        if let Some(staged) = self.writes.proposals.get(&id) {
            return Ok(Some(staged.clone()));
        }
        self.read(|t| t.proposals.get(self.tenant(), &id).cloned())
    }

    fn proposals_by_status(&self, status: ProposalStatus) -> StoreResult<Vec<Proposal>> {
        self.read(|t| {
            t.proposals
                .list_with(self.tenant(), &self.writes.proposals, |p| p.status() == status)
        })
    }

    fn save_proposal(&mut self, proposal: Proposal) -> StoreResult<()> {
        self.ensure_open()?;
        self.writes.proposals.put(proposal.id_typed(), proposal);
        Ok(())
    }

    fn find_invoice(&self, id: InvoiceId) -> StoreResult<Option<Invoice>> {
        if let Some(staged) = self.writes.invoices.get(&id) {
            return Ok(Some(staged.clone()));
        }
        self.read(|t| t.invoices.get(self.tenant(), &id).cloned())
    }

    fn invoices_for_proposal(&self, proposal_id: ProposalId) -> StoreResult<Vec<Invoice>> {
        let origin = proposal_id.aggregate_id();
        self.read(|t| {
            t.invoices.list_with(self.tenant(), &self.writes.invoices, |i| {
                i.origin().is_some_and(|o| o.proposal_id == origin)
            })
        })
    }

    fn save_invoice(&mut self, invoice: Invoice) -> StoreResult<()> {
        self.ensure_open()?;
        self.writes.invoices.put(invoice.id_typed(), invoice);
        Ok(())
    }

    fn payment_events_for_invoice(&self, invoice_id: InvoiceId) -> StoreResult<Vec<PaymentEvent>> {
        self.read(|t| {
            t.payment_events
                .list_with(self.tenant(), &self.writes.payment_events, |e| e.invoice_id == invoice_id)
        })
    }

    fn append_payment_event(&mut self, event: PaymentEvent) -> StoreResult<()> {
        self.ensure_open()?;
        self.writes.payment_events.put(event.id, event);
        Ok(())
    }

    fn append_audit(&mut self, record: AuditRecord) -> StoreResult<()> {
        self.ensure_open()?;
        if record.tenant_id != self.tenant() {
            return Err(StoreError::TenantIsolation(format!(
                "audit record for tenant {} written in transaction for {}",
                record.tenant_id,
                self.tenant()
            )));
        }
        self.writes.audit.put(record.id, record);
        Ok(())
    }

    fn audit_trail(&self, entity_id: AggregateId) -> StoreResult<Vec<AuditRecord>> {
        self.read(|t| {
            t.audit
                .list_with(self.tenant(), &self.writes.audit, |r| r.entity_id == entity_id)
        })
    }

    fn commit(mut self) -> StoreResult<()> {
        self.ensure_open()?;
        let tenant = self.tenant();
        let writes = std::mem::take(&mut self.writes);
        {
            let mut tables = self
                .shared
                .tables
                .write()
                .map_err(|_| StoreError::Poisoned("tables"))?;
            tables.customers.apply(tenant, writes.customers);
            tables.templates.apply(tenant, writes.templates);
            tables.projects.apply(tenant, writes.projects);
            tables.project_members.apply(tenant, writes.project_members);
            tables.proposals.apply(tenant, writes.proposals);
            tables.invoices.apply(tenant, writes.invoices);
            tables.payment_events.apply(tenant, writes.payment_events);
            tables.audit.apply(tenant, writes.audit);
        }
        self.finished = true;
        self.shared.counters.commit(self.id)?;
        debug!(tenant_id = %tenant, tx = ?self.id, "transaction committed");
        Ok(())
    }

    fn rollback(mut self) -> StoreResult<()> {
        self.ensure_open()?;
        debug!(tenant_id = %self.tenant(), tx = ?self.id, "transaction rolled back");
        self.finish_rollback()
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!(tenant_id = %self.tenant(), tx = ?self.id, "transaction dropped without commit, rolling back");
            if let Err(e) = self.finish_rollback() {
                warn!(error = %e, "rollback on drop failed");
            }
        }
    }
}
