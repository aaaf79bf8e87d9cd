mod common;

use std::collections::BTreeMap;

use praxis_billing::{InvoiceId, InvoiceStatus, PaymentEventStatus};
use praxis_core::{DomainError, TenantContext};
use praxis_events::WorkflowEvent;
use praxis_infra::deferred::Recipient;
use praxis_infra::workflow::{DropReason, NewInvoice, ReconciliationOutcome, WebhookResult};
use praxis_infra::{Transaction, WorkflowError};

use common::{Harness, binding, dec, tenant};

/// A SENT invoice for 1200.00 with an open checkout session.
fn open_session(h: &Harness, ctx: TenantContext) -> (InvoiceId, String) {
    let customer_id = h.prospect(ctx);
    let invoice = h
        .engine
        .create_invoice(
            ctx,
            NewInvoice {
                customer_id,
                description: "Bookkeeping, Q1".to_string(),
                amount: dec("1200.00"),
                due_date: None,
            },
        )
        .unwrap();
    let id = invoice.id_typed();
    h.engine.approve_invoice(ctx, id).unwrap();
    h.engine.send_invoice(ctx, id).unwrap();
    let session = h.engine.create_payment_session(ctx, id, "stripe").unwrap();
    h.events.drain();
    (id, session.session_id)
}

fn callback(h: &Harness, status: &str, session_id: &str) -> WebhookResult {
    let (_, request) = h.gateway.created().pop().unwrap();
    WebhookResult {
        status: status.to_string(),
        session_id: session_id.to_string(),
        payment_reference: Some("pi_3Nx".to_string()),
        metadata: request.metadata,
    }
}

#[test]
fn completed_callback_pays_the_invoice_once() {
    let h = Harness::new();
    let ctx = tenant();
    let (invoice_id, session_id) = open_session(&h, ctx);
    let paid = callback(&h, "completed", &session_id);

    let first = h.engine.reconcile_payment(binding(&ctx), &paid, "stripe").unwrap();
    let second = h.engine.reconcile_payment(binding(&ctx), &paid, "stripe").unwrap();

    assert_eq!(first, ReconciliationOutcome::Paid { invoice_id });
    assert_eq!(second, ReconciliationOutcome::AlreadyPaid { invoice_id });
    h.read(ctx, |tx| {
        let invoice = tx.load_invoice(invoice_id).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.payment_reference(), Some("pi_3Nx"));
        assert_eq!(invoice.payment_session_id(), None);
        let statuses: Vec<_> = tx
            .payment_events_for_invoice(invoice_id)
            .unwrap()
            .into_iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(statuses, [PaymentEventStatus::Created, PaymentEventStatus::Completed]);
    });
    let paid_events = h
        .events
        .drain()
        .into_iter()
        .filter(|e| matches!(e.payload(), WorkflowEvent::InvoicePaid { .. }))
        .count();
    assert_eq!(paid_events, 1);
}

#[test]
fn forged_session_is_dropped() {
    let h = Harness::new();
    let ctx = tenant();
    let (invoice_id, _) = open_session(&h, ctx);

    let forged = callback(&h, "COMPLETED", "cs_forged");
    let outcome = h.engine.reconcile_payment(binding(&ctx), &forged, "stripe").unwrap();
    assert_eq!(outcome, ReconciliationOutcome::Dropped(DropReason::UnknownSession));

    let wrong_provider = callback(&h, "COMPLETED", "cs_test_1");
    let outcome = h
        .engine
        .reconcile_payment(binding(&ctx), &wrong_provider, "paypal")
        .unwrap();
    assert_eq!(outcome, ReconciliationOutcome::Dropped(DropReason::UnknownSession));

    h.read(ctx, |tx| {
        assert_eq!(tx.load_invoice(invoice_id).unwrap().status(), InvoiceStatus::Sent);
    });
    assert!(h.events.drain().is_empty());
}

#[test]
fn callbacks_without_a_known_invoice_are_dropped() {
    let h = Harness::new();
    let ctx = tenant();
    let (_, session_id) = open_session(&h, ctx);

    let mut missing = callback(&h, "COMPLETED", &session_id);
    missing.metadata = BTreeMap::new();
    assert_eq!(
        h.engine.reconcile_payment(binding(&ctx), &missing, "stripe").unwrap(),
        ReconciliationOutcome::Dropped(DropReason::MissingInvoiceReference)
    );

    let mut unknown = callback(&h, "COMPLETED", &session_id);
    unknown
        .metadata
        .insert("invoice_id".to_string(), InvoiceId::new().to_string());
    assert_eq!(
        h.engine.reconcile_payment(binding(&ctx), &unknown, "stripe").unwrap(),
        ReconciliationOutcome::Dropped(DropReason::UnknownInvoice)
    );

    // Another tenant cannot see the invoice at all.
    let other = tenant();
    let replayed = callback(&h, "COMPLETED", &session_id);
    assert_eq!(
        h.engine.reconcile_payment(binding(&other), &replayed, "stripe").unwrap(),
        ReconciliationOutcome::Dropped(DropReason::UnknownInvoice)
    );
}

#[test]
fn failed_attempt_alerts_admins_and_keeps_the_invoice_payable() {
    let h = Harness::new();
    let ctx = tenant();
    let (invoice_id, session_id) = open_session(&h, ctx);
    let failed = callback(&h, "FAILED", &session_id);

    let first = h.engine.reconcile_payment(binding(&ctx), &failed, "stripe").unwrap();
    let repeat = h.engine.reconcile_payment(binding(&ctx), &failed, "stripe").unwrap();

    assert_eq!(first, ReconciliationOutcome::PaymentFailed { invoice_id });
    assert_eq!(repeat, ReconciliationOutcome::Duplicate { invoice_id });
    let sent = h.notifications.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.recipient, Recipient::Admins);
    assert_eq!(sent[0].1.kind, "invoice.payment_failed");

    // The client retries on the same session and succeeds.
    let paid = callback(&h, "COMPLETED", &session_id);
    assert_eq!(
        h.engine.reconcile_payment(binding(&ctx), &paid, "stripe").unwrap(),
        ReconciliationOutcome::Paid { invoice_id }
    );
}

#[test]
fn expired_session_notifies_the_creator() {
    let h = Harness::new();
    let ctx = tenant();
    let (invoice_id, session_id) = open_session(&h, ctx);

    let expired = callback(&h, "EXPIRED", &session_id);
    assert_eq!(
        h.engine.reconcile_payment(binding(&ctx), &expired, "stripe").unwrap(),
        ReconciliationOutcome::SessionExpired { invoice_id }
    );

    let sent = h.notifications.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.recipient, Recipient::Member(ctx.actor_id()));
    assert_eq!(sent[0].1.kind, "invoice.payment_expired");
    h.read(ctx, |tx| {
        let invoice = tx.load_invoice(invoice_id).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Sent);
        assert_eq!(invoice.payment_session_id(), None);
    });

    // A late completion for the expired session is not applied.
    let late = callback(&h, "COMPLETED", &session_id);
    assert_eq!(
        h.engine.reconcile_payment(binding(&ctx), &late, "stripe").unwrap(),
        ReconciliationOutcome::Dropped(DropReason::SessionClosed)
    );
}

#[test]
fn unrecognized_status_is_ignored() {
    let h = Harness::new();
    let ctx = tenant();
    let (_, session_id) = open_session(&h, ctx);

    let outcome = h
        .engine
        .reconcile_payment(binding(&ctx), &callback(&h, "requires_action", &session_id), "stripe")
        .unwrap();

    assert_eq!(
        outcome,
        ReconciliationOutcome::Ignored {
            status: "requires_action".to_string()
        }
    );
}

#[test]
fn new_session_replaces_the_open_one() {
    let h = Harness::new();
    let ctx = tenant();
    let (invoice_id, first) = open_session(&h, ctx);

    let second = h.engine.create_payment_session(ctx, invoice_id, "stripe").unwrap();

    assert_ne!(second.session_id, first);
    assert_eq!(h.gateway.expired(), [(ctx.tenant_id(), first.clone())]);
    let (_, request) = h.gateway.created().pop().unwrap();
    assert_eq!(request.amount, dec("1200.00"));
    assert_eq!(request.metadata.get("tenant_id"), Some(&ctx.tenant_id().to_string()));
    assert_eq!(request.metadata.get("invoice_id"), Some(&invoice_id.to_string()));
    h.read(ctx, |tx| {
        let invoice = tx.load_invoice(invoice_id).unwrap();
        assert_eq!(invoice.payment_session_id(), Some(second.session_id.as_str()));
    });

    let stale = callback(&h, "COMPLETED", &first);
    assert_eq!(
        h.engine.reconcile_payment(binding(&ctx), &stale, "stripe").unwrap(),
        ReconciliationOutcome::Dropped(DropReason::SessionClosed)
    );
}

#[test]
fn draft_invoice_cannot_open_a_session() {
    let h = Harness::new();
    let ctx = tenant();
    let customer_id = h.prospect(ctx);
    let invoice = h
        .engine
        .create_invoice(
            ctx,
            NewInvoice {
                customer_id,
                description: "Payroll setup".to_string(),
                amount: dec("300"),
                due_date: None,
            },
        )
        .unwrap();

    let err = h
        .engine
        .create_payment_session(ctx, invoice.id_typed(), "stripe")
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Domain(DomainError::Conflict(_))));
    assert!(h.gateway.created().is_empty());
}

#[test]
fn gateway_outage_leaves_no_session_behind() {
    let h = Harness::new();
    let ctx = tenant();
    let (invoice_id, first) = open_session(&h, ctx);
    h.gateway.fail_all(true);

    let err = h
        .engine
        .create_payment_session(ctx, invoice_id, "stripe")
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Collaborator(_)));
    h.read(ctx, |tx| {
        let invoice = tx.load_invoice(invoice_id).unwrap();
        assert_eq!(invoice.payment_session_id(), Some(first.as_str()));
    });
}
