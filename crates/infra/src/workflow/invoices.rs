use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::info;

use praxis_billing::{BillingEntityFactory, Invoice, InvoiceId, InvoiceLine, InvoiceLineId, PaymentEvent};
use praxis_core::{AggregateRoot, DomainResult, Entity};
use praxis_events::WorkflowEvent;
use praxis_parties::CustomerId;

use super::sessions::cancel_open_sessions;
use crate::config::WorkflowConfig;
use crate::deferred::SideEffect;
use crate::error::WorkflowResult;
use crate::sequence::{DocumentKind, SequenceAllocator};
use crate::store::{Transaction, audit};

/// Hand-written invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub customer_id: CustomerId,
    pub description: String,
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct InvoiceWorkflow {
    numbers: SequenceAllocator,
    factory: BillingEntityFactory,
}

impl InvoiceWorkflow {
    pub fn new(numbers: SequenceAllocator, factory: BillingEntityFactory) -> Self {
        Self { numbers, factory }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(
            SequenceAllocator::from_config(config),
            BillingEntityFactory::new(config.default_currency.clone(), config.default_payment_terms_days),
        )
    }

    /// DRAFT invoice with one line.
    pub fn create_draft(&self, tx: &mut dyn Transaction, new: NewInvoice, now: DateTime<Utc>) -> WorkflowResult<Invoice> {
        tx.load_customer(new.customer_id)?;
        let invoice = self.factory.draft_with_line(
            new.customer_id,
            tx.context().actor_id(),
            new.description,
            new.amount,
            new.due_date,
            now,
        )?;
        let details = json!({ "total": invoice.total(), "due_date": invoice.due_date() });
        save_and_audit(tx, invoice, "created", details, now)
    }

    pub fn add_line(
        &self,
        tx: &mut dyn Transaction,
        invoice_id: InvoiceId,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
        now: DateTime<Utc>,
    ) -> WorkflowResult<InvoiceLineId> {
        let line = InvoiceLine::new(description, quantity, unit_price)?;
        let line_id = *line.id();
        self.edit(tx, invoice_id, "line_added", now, |i| i.add_line(line))?;
        Ok(line_id)
    }

    pub fn update_line(
        &self,
        tx: &mut dyn Transaction,
        invoice_id: InvoiceId,
        line_id: InvoiceLineId,
        quantity: Decimal,
        unit_price: Decimal,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Invoice> {
        self.edit(tx, invoice_id, "line_updated", now, |i| {
            i.update_line(line_id, quantity, unit_price)
        })
    }

    pub fn remove_line(
        &self,
        tx: &mut dyn Transaction,
        invoice_id: InvoiceId,
        line_id: InvoiceLineId,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Invoice> {
        self.edit(tx, invoice_id, "line_removed", now, |i| i.remove_line(line_id).map(drop))
    }

    pub fn set_tax_amount(
        &self,
        tx: &mut dyn Transaction,
        invoice_id: InvoiceId,
        tax_amount: Decimal,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Invoice> {
        self.edit(tx, invoice_id, "tax_set", now, |i| i.set_tax_amount(tax_amount))
    }

    /// Apply a DRAFT-only change and audit it with the new totals.
    pub fn edit(
        &self,
        tx: &mut dyn Transaction,
        invoice_id: InvoiceId,
        action: &str,
        now: DateTime<Utc>,
        change: impl FnOnce(&mut Invoice) -> DomainResult<()>,
    ) -> WorkflowResult<Invoice> {
        let mut invoice = tx.load_invoice(invoice_id)?;
        change(&mut invoice)?;
        let details = json!({
            "subtotal": invoice.subtotal(),
            "tax_amount": invoice.tax_amount(),
            "total": invoice.total(),
        });
        save_and_audit(tx, invoice, action, details, now)
    }

    /// DRAFT → APPROVED. The invoice is checked before the counter row is
    /// locked; the number is allocated in the same transaction, so a failed
    /// approval leaves no gap.
    pub fn approve(&self, tx: &mut dyn Transaction, invoice_id: InvoiceId, now: DateTime<Utc>) -> WorkflowResult<Invoice> {
        let mut invoice = tx.load_invoice(invoice_id)?;
        invoice.ensure_approvable()?;
        let number = self.numbers.allocate(tx, DocumentKind::Invoice)?;
        invoice.approve(number.clone())?;
        tx.deferred().on_commit(
            "publish invoice approved",
            SideEffect::Publish(WorkflowEvent::InvoiceApproved {
                invoice_id: invoice_id.aggregate_id(),
                number: number.clone(),
                total: invoice.total(),
                occurred_at: now,
            }),
        );
        info!(invoice_id = %invoice_id, number = %number, "invoice approved");
        save_and_audit(tx, invoice, "approved", json!({ "number": number }), now)
    }

    /// APPROVED → SENT.
    pub fn send(&self, tx: &mut dyn Transaction, invoice_id: InvoiceId, now: DateTime<Utc>) -> WorkflowResult<Invoice> {
        let mut invoice = tx.load_invoice(invoice_id)?;
        invoice.send(now.date_naive())?;
        tx.deferred().on_commit(
            "publish invoice sent",
            SideEffect::Publish(WorkflowEvent::InvoiceSent {
                invoice_id: invoice_id.aggregate_id(),
                occurred_at: now,
            }),
        );
        let details = json!({ "issue_date": invoice.issue_date(), "due_date": invoice.due_date() });
        save_and_audit(tx, invoice, "sent", details, now)
    }

    /// APPROVED/SENT → VOID. Any open checkout session is cancelled.
    pub fn void(
        &self,
        tx: &mut dyn Transaction,
        invoice_id: InvoiceId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Invoice> {
        let mut invoice = tx.load_invoice(invoice_id)?;
        invoice.void(reason.clone())?;
        cancel_open_sessions(tx, &mut invoice, now)?;
        tx.deferred().on_commit(
            "publish invoice voided",
            SideEffect::Publish(WorkflowEvent::InvoiceVoided {
                invoice_id: invoice_id.aggregate_id(),
                reason: reason.clone(),
                occurred_at: now,
            }),
        );
        info!(invoice_id = %invoice_id, "invoice voided");
        save_and_audit(tx, invoice, "voided", json!({ "reason": reason }), now)
    }

    /// SENT → PAID for a payment taken outside checkout.
    pub fn record_payment(
        &self,
        tx: &mut dyn Transaction,
        invoice_id: InvoiceId,
        payment_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Invoice> {
        let mut invoice = tx.load_invoice(invoice_id)?;
        invoice.mark_paid(payment_reference.clone(), now)?;
        cancel_open_sessions(tx, &mut invoice, now)?;
        tx.append_payment_event(PaymentEvent::manual(
            invoice_id,
            invoice.total(),
            invoice.currency(),
            payment_reference.clone(),
            now,
        ))?;
        tx.deferred().on_commit(
            "publish invoice paid",
            SideEffect::Publish(WorkflowEvent::InvoicePaid {
                invoice_id: invoice_id.aggregate_id(),
                payment_reference: payment_reference.clone(),
                amount: invoice.total(),
                occurred_at: now,
            }),
        );
        info!(invoice_id = %invoice_id, "manual payment recorded");
        save_and_audit(
            tx,
            invoice,
            "paid",
            json!({ "provider": "manual", "payment_reference": payment_reference }),
            now,
        )
    }
}

fn save_and_audit(
    tx: &mut dyn Transaction,
    invoice: Invoice,
    action: &str,
    details: JsonValue,
    now: DateTime<Utc>,
) -> WorkflowResult<Invoice> {
    let invoice_id = invoice.id_typed();
    tx.save_invoice(invoice.clone())?;
    audit::record(
        tx,
        Invoice::aggregate_type(),
        invoice_id.aggregate_id(),
        action,
        details,
        now,
    )?;
    Ok(invoice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_billing::InvoiceStatus;
    use praxis_core::{ActorRole, DomainError, MemberId, OrgId, TenantContext, TenantId};
    use praxis_parties::Customer;

    use crate::store::{Database, InMemoryDatabase};

    fn ctx() -> TenantContext {
        TenantContext::new(TenantId::new(), OrgId::new(), MemberId::new(), ActorRole::Admin)
    }

    fn workflow() -> InvoiceWorkflow {
        InvoiceWorkflow::from_config(&WorkflowConfig::default())
    }

    fn draft(tx: &mut dyn Transaction) -> Invoice {
        let customer = Customer::prospect(CustomerId::new(), "Acme LLP");
        let customer_id = customer.id_typed();
        tx.save_customer(customer).unwrap();
        workflow()
            .create_draft(
                tx,
                NewInvoice {
                    customer_id,
                    description: "Payroll, March".to_string(),
                    amount: Decimal::new(40_000, 2),
                    due_date: None,
                },
                Utc::now(),
            )
            .unwrap()
    }

    #[test]
    fn line_changes_recompute_totals() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let id = draft(&mut tx).id_typed();

        let line_id = workflow()
            .add_line(&mut tx, id, "Filing fee", Decimal::from(3), Decimal::new(3_333, 2), Utc::now())
            .unwrap();
        let invoice = workflow()
            .set_tax_amount(&mut tx, id, Decimal::new(1_000, 2), Utc::now())
            .unwrap();
        assert_eq!(invoice.subtotal(), Decimal::new(49_999, 2));
        assert_eq!(invoice.total(), Decimal::new(50_999, 2));

        let invoice = workflow().remove_line(&mut tx, id, line_id, Utc::now()).unwrap();
        assert_eq!(invoice.total(), Decimal::new(41_000, 2));
    }

    #[test]
    fn approval_numbers_and_locks_the_invoice() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let id = draft(&mut tx).id_typed();

        let approved = workflow().approve(&mut tx, id, Utc::now()).unwrap();
        assert_eq!(approved.number(), Some("INV-0001"));
        assert_eq!(approved.status(), InvoiceStatus::Approved);

        let err = workflow()
            .set_tax_amount(&mut tx, id, Decimal::ONE, Utc::now())
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));

        let err = workflow().approve(&mut tx, id, Utc::now()).unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::InvalidState { .. })));
    }

    #[test]
    fn manual_payment_appends_a_ledger_row() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let id = draft(&mut tx).id_typed();
        workflow().approve(&mut tx, id, Utc::now()).unwrap();
        workflow().send(&mut tx, id, Utc::now()).unwrap();

        let paid = workflow()
            .record_payment(&mut tx, id, Some("wire 4471".to_string()), Utc::now())
            .unwrap();

        assert_eq!(paid.status(), InvoiceStatus::Paid);
        let ledger = tx.payment_events_for_invoice(id).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].provider_slug, "manual");
        assert_eq!(ledger[0].amount, Decimal::new(40_000, 2));
    }
}
