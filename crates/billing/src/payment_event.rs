//! Payment-attempt ledger.
//!
//! Each row records one observation about a payment attempt against an
//! invoice. Rows are appended, not rewritten: a checkout that completes shows
//! up as a CREATED row followed by a COMPLETED row with the same session id.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use praxis_core::{AggregateRoot, Enforcement, Lifecycle, typed_id};

use crate::invoice::InvoiceId;

typed_id!(
    /// Payment event identifier.
    PaymentEventId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEventStatus {
    Created,
    Pending,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl PaymentEventStatus {
    /// A session in this state may still be settled by a provider callback.
    pub fn is_open(self) -> bool {
        matches!(self, PaymentEventStatus::Created | PaymentEventStatus::Pending)
    }
}

impl core::fmt::Display for PaymentEventStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PaymentEventStatus::Created => "CREATED",
            PaymentEventStatus::Pending => "PENDING",
            PaymentEventStatus::Completed => "COMPLETED",
            PaymentEventStatus::Failed => "FAILED",
            PaymentEventStatus::Expired => "EXPIRED",
            PaymentEventStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl Lifecycle for PaymentEventStatus {
    const ALL: &'static [Self] = &[
        PaymentEventStatus::Created,
        PaymentEventStatus::Pending,
        PaymentEventStatus::Completed,
        PaymentEventStatus::Failed,
        PaymentEventStatus::Expired,
        PaymentEventStatus::Cancelled,
    ];
    const ENTITY: &'static str = "payment_event";

    fn can_transition(self, target: Self) -> bool {
        use PaymentEventStatus::*;
        matches!(
            (self, target),
            (Created, Pending)
                | (Created, Cancelled)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Expired)
        )
    }

    // Providers report outcomes straight from CREATED; the ledger records
    // them and only logs the deviation.
    fn enforcement() -> Enforcement {
        Enforcement::Advisory
    }
}

/// Aggregate root: PaymentEvent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: PaymentEventId,
    pub invoice_id: InvoiceId,
    pub provider_slug: String,
    pub session_id: Option<String>,
    pub status: PaymentEventStatus,
    pub amount: Decimal,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentEvent {
    /// First row for a newly created checkout session.
    pub fn session_created(
        invoice_id: InvoiceId,
        provider_slug: impl Into<String>,
        session_id: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentEventId::new(),
            invoice_id,
            provider_slug: provider_slug.into(),
            session_id: Some(session_id.into()),
            status: PaymentEventStatus::Created,
            amount,
            currency: currency.into(),
            payment_reference: None,
            recorded_at,
        }
    }

    /// Row recording a payment taken outside any checkout session.
    pub fn manual(
        invoice_id: InvoiceId,
        amount: Decimal,
        currency: impl Into<String>,
        payment_reference: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentEventId::new(),
            invoice_id,
            provider_slug: "manual".to_string(),
            session_id: None,
            status: PaymentEventStatus::Completed,
            amount,
            currency: currency.into(),
            payment_reference,
            recorded_at,
        }
    }

    /// Next row for the same session, carrying the observed `status`.
    ///
    /// The transition from this row's status is checked in advisory mode.
    pub fn follow_up(
        &self,
        status: PaymentEventStatus,
        payment_reference: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let status = self
            .status
            .transition(status, "record payment outcome")
            .unwrap_or(status);
        Self {
            id: PaymentEventId::new(),
            invoice_id: self.invoice_id,
            provider_slug: self.provider_slug.clone(),
            session_id: self.session_id.clone(),
            status,
            amount: self.amount,
            currency: self.currency.clone(),
            payment_reference,
            recorded_at,
        }
    }

    pub fn is_open_session(&self, session_id: &str) -> bool {
        self.status.is_open() && self.session_id.as_deref() == Some(session_id)
    }
}

impl AggregateRoot for PaymentEvent {
    type Id = PaymentEventId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn aggregate_type() -> &'static str {
        "billing.payment_event"
    }
}
