//! Checkout sessions offered for SENT invoices.
//!
//! At most one session per invoice is open at a time: opening a new one
//! cancels whatever was open before, and the provider is told to expire the
//! old session once the change has committed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use praxis_billing::{Invoice, InvoiceId, PaymentEvent, PaymentEventStatus};
use praxis_core::{AggregateRoot, DomainError};

use crate::deferred::SideEffect;
use crate::error::{WorkflowError, WorkflowResult};
use crate::ports::{CheckoutRequest, CheckoutSession, PaymentGateways};
use crate::store::{Transaction, audit};

/// Callback metadata key carrying the invoice id.
pub const INVOICE_ID_KEY: &str = "invoice_id";
/// Callback metadata key carrying the tenant id.
pub const TENANT_ID_KEY: &str = "tenant_id";

#[derive(Debug, Clone, Default)]
pub struct PaymentSessionWorkflow {
    gateways: PaymentGateways,
}

impl PaymentSessionWorkflow {
    pub fn new(gateways: PaymentGateways) -> Self {
        Self { gateways }
    }

    pub fn create_session(
        &self,
        tx: &mut dyn Transaction,
        invoice_id: InvoiceId,
        provider_slug: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<CheckoutSession> {
        let mut invoice = tx.load_invoice(invoice_id)?;
        if !invoice.is_payable() {
            return Err(DomainError::conflict(format!(
                "invoice {invoice_id} is not payable while {}",
                invoice.status()
            ))
            .into());
        }
        let gateway = self
            .gateways
            .get(provider_slug)
            .ok_or_else(|| DomainError::not_found("payment provider", provider_slug))?;

        cancel_open_sessions(tx, &mut invoice, now)?;

        let request = CheckoutRequest {
            invoice_id,
            invoice_number: invoice.number().unwrap_or_default().to_string(),
            amount: invoice.total(),
            currency: invoice.currency().to_string(),
            metadata: BTreeMap::from([
                (INVOICE_ID_KEY.to_string(), invoice_id.to_string()),
                (TENANT_ID_KEY.to_string(), tx.context().tenant_id().to_string()),
            ]),
        };
        let session = gateway
            .create_checkout_session(tx.context(), &request)
            .map_err(|e| WorkflowError::collaborator(format!("{provider_slug}: {e:#}")))?;

        // The provider already holds the session; expire it if this
        // transaction does not commit.
        tx.deferred().on_rollback(
            "expire orphaned checkout session",
            SideEffect::ExpirePaymentSession {
                provider_slug: provider_slug.to_string(),
                session_id: session.session_id.clone(),
            },
        );

        tx.append_payment_event(PaymentEvent::session_created(
            invoice_id,
            provider_slug,
            session.session_id.clone(),
            invoice.total(),
            invoice.currency(),
            now,
        ))?;
        invoice.attach_payment_session(session.session_id.clone())?;
        tx.save_invoice(invoice)?;
        audit::record(
            tx,
            Invoice::aggregate_type(),
            invoice_id.aggregate_id(),
            "payment_session_created",
            json!({ "provider": provider_slug, "session_id": session.session_id }),
            now,
        )?;
        info!(invoice_id = %invoice_id, session_id = %session.session_id, provider = provider_slug, "checkout session created");
        Ok(session)
    }
}

/// Latest ledger row of each session, keyed by session id.
pub(crate) fn latest_by_session(events: Vec<PaymentEvent>) -> BTreeMap<String, PaymentEvent> {
    let mut latest = BTreeMap::new();
    for event in events {
        if let Some(session_id) = event.session_id.clone() {
            latest.insert(session_id, event);
        }
    }
    latest
}

/// Mark every still-open session of `invoice` CANCELLED and have the
/// provider expire it after commit. Returns the cancelled session ids.
pub(crate) fn cancel_open_sessions(
    tx: &mut dyn Transaction,
    invoice: &mut Invoice,
    now: DateTime<Utc>,
) -> WorkflowResult<Vec<String>> {
    let open: Vec<PaymentEvent> = latest_by_session(tx.payment_events_for_invoice(invoice.id_typed())?)
        .into_values()
        .filter(|e| e.status.is_open())
        .collect();

    let mut cancelled = Vec::with_capacity(open.len());
    for event in open {
        let Some(session_id) = event.session_id.clone() else {
            continue;
        };
        warn!(invoice_id = %invoice.id_typed(), session_id = %session_id, "cancelling open checkout session");
        tx.append_payment_event(event.follow_up(PaymentEventStatus::Cancelled, None, now))?;
        tx.deferred().on_commit(
            "expire superseded checkout session",
            SideEffect::ExpirePaymentSession {
                provider_slug: event.provider_slug.clone(),
                session_id: session_id.clone(),
            },
        );
        invoice.detach_payment_session(&session_id);
        cancelled.push(session_id);
    }
    Ok(cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use praxis_billing::InvoiceLine;
    use praxis_core::{ActorRole, MemberId, OrgId, TenantContext, TenantId};
    use praxis_parties::CustomerId;
    use rust_decimal::Decimal;

    use crate::ports::FakePaymentGateway;
    use crate::store::{Database, InMemoryDatabase};

    fn ctx() -> TenantContext {
        TenantContext::new(TenantId::new(), OrgId::new(), MemberId::new(), ActorRole::Admin)
    }

    fn sent_invoice(tx: &mut dyn Transaction) -> InvoiceId {
        let mut invoice = Invoice::draft(InvoiceId::new(), CustomerId::new(), "USD", MemberId::new(), Utc::now());
        invoice
            .add_line(InvoiceLine::new("Advisory", Decimal::ONE, Decimal::new(120_000, 2)).unwrap())
            .unwrap();
        invoice.approve("INV-0001".to_string()).unwrap();
        invoice.send(Utc::now().date_naive()).unwrap();
        let id = invoice.id_typed();
        tx.save_invoice(invoice).unwrap();
        id
    }

    #[test]
    fn new_session_cancels_the_open_one() {
        let gateway = Arc::new(FakePaymentGateway::new("stripe"));
        let workflow = PaymentSessionWorkflow::new(PaymentGateways::new().with(gateway.clone()));
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let invoice_id = sent_invoice(&mut tx);

        let first = workflow.create_session(&mut tx, invoice_id, "stripe", Utc::now()).unwrap();
        let second = workflow.create_session(&mut tx, invoice_id, "stripe", Utc::now()).unwrap();

        let latest = latest_by_session(tx.payment_events_for_invoice(invoice_id).unwrap());
        assert_eq!(latest[&first.session_id].status, PaymentEventStatus::Cancelled);
        assert_eq!(latest[&second.session_id].status, PaymentEventStatus::Created);
        assert_eq!(
            tx.load_invoice(invoice_id).unwrap().payment_session_id(),
            Some(second.session_id.as_str())
        );
        assert_eq!(gateway.created().len(), 2);
        assert_eq!(
            gateway.created()[0].1.metadata.get(INVOICE_ID_KEY),
            Some(&invoice_id.to_string())
        );
    }

    #[test]
    fn draft_invoice_gets_no_session() {
        let workflow = PaymentSessionWorkflow::new(
            PaymentGateways::new().with(Arc::new(FakePaymentGateway::new("stripe"))),
        );
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let invoice = Invoice::draft(InvoiceId::new(), CustomerId::new(), "USD", MemberId::new(), Utc::now());
        let invoice_id = invoice.id_typed();
        tx.save_invoice(invoice).unwrap();

        let err = workflow
            .create_session(&mut tx, invoice_id, "stripe", Utc::now())
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[test]
    fn gateway_failure_is_a_collaborator_error() {
        let gateway = Arc::new(FakePaymentGateway::new("stripe"));
        gateway.fail_all(true);
        let workflow = PaymentSessionWorkflow::new(PaymentGateways::new().with(gateway));
        let db = InMemoryDatabase::new();
        let mut tx = db.begin(ctx()).unwrap();
        let invoice_id = sent_invoice(&mut tx);

        let err = workflow
            .create_session(&mut tx, invoice_id, "stripe", Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Collaborator(_)));
        assert!(tx.payment_events_for_invoice(invoice_id).unwrap().is_empty());
    }
}
