//! Reconciliation of payment-provider callbacks.
//!
//! Callbacks arrive at least once, already signature-checked and normalized
//! into a [`WebhookResult`]. Unknown, forged and duplicate callbacks are
//! dropped with a log line and never surface as errors to the provider.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use praxis_billing::{Invoice, InvoiceId, InvoiceStatus, PaymentEvent, PaymentEventStatus};
use praxis_core::AggregateRoot;
use praxis_events::WorkflowEvent;

use super::sessions::{INVOICE_ID_KEY, latest_by_session};
use crate::deferred::{Notification, Recipient, SideEffect};
use crate::error::WorkflowResult;
use crate::store::{Transaction, audit};

/// Provider callback, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResult {
    pub status: String,
    pub session_id: String,
    pub payment_reference: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Callback statuses the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackStatus {
    Completed,
    Failed,
    Expired,
}

impl CallbackStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    fn ledger_status(self) -> PaymentEventStatus {
        match self {
            Self::Completed => PaymentEventStatus::Completed,
            Self::Failed => PaymentEventStatus::Failed,
            Self::Expired => PaymentEventStatus::Expired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No parseable invoice id in the metadata.
    MissingInvoiceReference,
    UnknownInvoice,
    /// No CREATED/PENDING ledger row for this session.
    UnknownSession,
    /// The session was completed, expired or cancelled earlier.
    SessionClosed,
    /// The invoice can no longer take payments.
    NotPayable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    Paid { invoice_id: InvoiceId },
    AlreadyPaid { invoice_id: InvoiceId },
    PaymentFailed { invoice_id: InvoiceId },
    SessionExpired { invoice_id: InvoiceId },
    /// The same outcome was already recorded for the session.
    Duplicate { invoice_id: InvoiceId },
    Dropped(DropReason),
    /// Status the engine does not act on.
    Ignored { status: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentReconciliationEngine;

impl PaymentReconciliationEngine {
    #[instrument(
        skip(self, tx, callback, now),
        fields(tenant_id = %tx.context().tenant_id(), session_id = %callback.session_id)
    )]
    pub fn reconcile(
        &self,
        tx: &mut dyn Transaction,
        callback: &WebhookResult,
        provider_slug: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<ReconciliationOutcome> {
        let Some(invoice_id) = callback
            .metadata
            .get(INVOICE_ID_KEY)
            .and_then(|raw| raw.parse::<InvoiceId>().ok())
        else {
            warn!("callback without invoice reference dropped");
            return Ok(ReconciliationOutcome::Dropped(DropReason::MissingInvoiceReference));
        };
        let Some(mut invoice) = tx.find_invoice(invoice_id)? else {
            warn!(invoice_id = %invoice_id, "callback for unknown invoice dropped");
            return Ok(ReconciliationOutcome::Dropped(DropReason::UnknownInvoice));
        };

        let events = tx.payment_events_for_invoice(invoice_id)?;
        let known_session = events.iter().any(|e| {
            e.status.is_open()
                && e.provider_slug == provider_slug
                && e.session_id.as_deref() == Some(callback.session_id.as_str())
        });
        if !known_session {
            warn!(invoice_id = %invoice_id, provider = provider_slug, "callback for unknown session dropped");
            return Ok(ReconciliationOutcome::Dropped(DropReason::UnknownSession));
        }
        let Some(latest) = latest_by_session(events).remove(&callback.session_id) else {
            return Ok(ReconciliationOutcome::Dropped(DropReason::UnknownSession));
        };

        let Some(status) = CallbackStatus::parse(&callback.status) else {
            info!(invoice_id = %invoice_id, status = %callback.status, "callback status ignored");
            return Ok(ReconciliationOutcome::Ignored {
                status: callback.status.clone(),
            });
        };

        if status == CallbackStatus::Completed && invoice.status() == InvoiceStatus::Paid {
            debug!(invoice_id = %invoice_id, "invoice already paid");
            return Ok(ReconciliationOutcome::AlreadyPaid { invoice_id });
        }
        if latest.status == status.ledger_status() {
            debug!(invoice_id = %invoice_id, status = %latest.status, "outcome already recorded");
            return Ok(ReconciliationOutcome::Duplicate { invoice_id });
        }
        if latest_closes_session(latest.status) {
            warn!(invoice_id = %invoice_id, status = %latest.status, "callback for closed session dropped");
            return Ok(ReconciliationOutcome::Dropped(DropReason::SessionClosed));
        }
        if !invoice.is_payable() {
            warn!(invoice_id = %invoice_id, invoice_status = %invoice.status(), "callback for unpayable invoice dropped");
            return Ok(ReconciliationOutcome::Dropped(DropReason::NotPayable));
        }

        match status {
            CallbackStatus::Completed => {
                self.complete(tx, &mut invoice, &latest, callback, now)?;
                Ok(ReconciliationOutcome::Paid { invoice_id })
            }
            CallbackStatus::Failed => {
                self.fail(tx, &invoice, &latest, callback, now)?;
                Ok(ReconciliationOutcome::PaymentFailed { invoice_id })
            }
            CallbackStatus::Expired => {
                self.expire(tx, &mut invoice, &latest, callback, now)?;
                Ok(ReconciliationOutcome::SessionExpired { invoice_id })
            }
        }
    }

    fn complete(
        &self,
        tx: &mut dyn Transaction,
        invoice: &mut Invoice,
        latest: &PaymentEvent,
        callback: &WebhookResult,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let invoice_id = invoice.id_typed();
        invoice.mark_paid(callback.payment_reference.clone(), now)?;
        invoice.detach_payment_session(&callback.session_id);
        tx.save_invoice(invoice.clone())?;
        tx.append_payment_event(latest.follow_up(
            PaymentEventStatus::Completed,
            callback.payment_reference.clone(),
            now,
        ))?;
        audit::record(
            tx,
            Invoice::aggregate_type(),
            invoice_id.aggregate_id(),
            "paid",
            json!({
                "provider": latest.provider_slug,
                "session_id": callback.session_id,
                "payment_reference": callback.payment_reference,
            }),
            now,
        )?;
        tx.deferred().on_commit(
            "publish invoice paid",
            SideEffect::Publish(WorkflowEvent::InvoicePaid {
                invoice_id: invoice_id.aggregate_id(),
                payment_reference: callback.payment_reference.clone(),
                amount: invoice.total(),
                occurred_at: now,
            }),
        );
        info!(invoice_id = %invoice_id, "invoice paid");
        Ok(())
    }

    fn fail(
        &self,
        tx: &mut dyn Transaction,
        invoice: &Invoice,
        latest: &PaymentEvent,
        callback: &WebhookResult,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let invoice_id = invoice.id_typed();
        tx.append_payment_event(latest.follow_up(PaymentEventStatus::Failed, None, now))?;
        audit::record(
            tx,
            Invoice::aggregate_type(),
            invoice_id.aggregate_id(),
            "payment_failed",
            json!({ "provider": latest.provider_slug, "session_id": callback.session_id }),
            now,
        )?;

        let number = invoice.number().unwrap_or_default();
        let deferred = tx.deferred();
        deferred.on_commit(
            "notify admins: payment failed",
            SideEffect::Notify(
                Notification::new(
                    Recipient::Admins,
                    "invoice.payment_failed",
                    format!("Payment failed for {number}"),
                    format!("A payment attempt of {} {} failed.", invoice.total(), invoice.currency()),
                )
                .about(Invoice::aggregate_type(), invoice_id.aggregate_id()),
            ),
        );
        deferred.on_commit(
            "publish payment failed",
            SideEffect::Publish(WorkflowEvent::PaymentFailed {
                invoice_id: invoice_id.aggregate_id(),
                session_id: callback.session_id.clone(),
                occurred_at: now,
            }),
        );
        warn!(invoice_id = %invoice_id, "payment failed");
        Ok(())
    }

    fn expire(
        &self,
        tx: &mut dyn Transaction,
        invoice: &mut Invoice,
        latest: &PaymentEvent,
        callback: &WebhookResult,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let invoice_id = invoice.id_typed();
        tx.append_payment_event(latest.follow_up(PaymentEventStatus::Expired, None, now))?;
        invoice.detach_payment_session(&callback.session_id);
        tx.save_invoice(invoice.clone())?;

        let number = invoice.number().unwrap_or_default();
        let deferred = tx.deferred();
        deferred.on_commit(
            "notify creator: checkout expired",
            SideEffect::Notify(
                Notification::new(
                    Recipient::Member(invoice.created_by()),
                    "invoice.payment_expired",
                    format!("Checkout expired for {number}"),
                    "The client did not complete the checkout in time. The invoice is still payable.",
                )
                .about(Invoice::aggregate_type(), invoice_id.aggregate_id()),
            ),
        );
        deferred.on_commit(
            "publish payment expired",
            SideEffect::Publish(WorkflowEvent::PaymentExpired {
                invoice_id: invoice_id.aggregate_id(),
                session_id: callback.session_id.clone(),
                occurred_at: now,
            }),
        );
        info!(invoice_id = %invoice_id, "checkout session expired");
        Ok(())
    }
}

/// A failed attempt leaves the session usable; these outcomes do not.
fn latest_closes_session(status: PaymentEventStatus) -> bool {
    matches!(
        status,
        PaymentEventStatus::Completed | PaymentEventStatus::Expired | PaymentEventStatus::Cancelled
    )
}
