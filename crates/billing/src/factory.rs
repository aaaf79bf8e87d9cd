//! Draft invoice construction.
//!
//! Amounts are rounded where they are computed: a milestone invoice carries
//! `round(fee × percentage / 100)` as a single line, so its subtotal needs no
//! further rounding.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;

use praxis_core::{AggregateId, DomainError, DomainResult, MemberId, percentage_of};
use praxis_parties::CustomerId;

use crate::invoice::{Invoice, InvoiceId, InvoiceLine, InvoiceOrigin};

/// Longest due-date offset, in days, that terms or milestones may use.
pub const MAX_DUE_DAYS: u32 = 3650;

/// One milestone's share of a fixed fee, as needed to bill it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneBilling {
    pub milestone_id: AggregateId,
    pub description: String,
    pub percentage: Decimal,
    pub relative_due_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEntityFactory {
    currency: String,
    default_terms_days: u32,
}

impl BillingEntityFactory {
    pub fn new(currency: impl Into<String>, default_terms_days: u32) -> Self {
        Self {
            currency: currency.into(),
            default_terms_days,
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn default_terms_days(&self) -> u32 {
        self.default_terms_days
    }

    /// DRAFT invoice with a single line of quantity 1.
    ///
    /// `due_date` defaults to the default payment terms counted from `now`.
    pub fn draft_with_line(
        &self,
        customer_id: CustomerId,
        created_by: MemberId,
        description: impl Into<String>,
        amount: Decimal,
        due_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        let mut invoice = Invoice::draft(
            InvoiceId::new(),
            customer_id,
            self.currency.clone(),
            created_by,
            now,
        );
        invoice.add_line(InvoiceLine::new(description, Decimal::ONE, amount)?)?;
        let due = match due_date {
            Some(due) => due,
            None => offset_days(now.date_naive(), self.default_terms_days)?,
        };
        invoice.set_due_date(due)?;
        Ok(invoice)
    }

    /// Full fixed fee as one invoice, linked back to its proposal.
    pub fn fixed_fee_invoice(
        &self,
        proposal_id: AggregateId,
        customer_id: CustomerId,
        created_by: MemberId,
        description: impl Into<String>,
        fixed_fee: Decimal,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        let mut invoice =
            self.draft_with_line(customer_id, created_by, description, fixed_fee, None, now)?;
        invoice.set_origin(InvoiceOrigin {
            proposal_id,
            milestone_id: None,
        });
        Ok(invoice)
    }

    /// One milestone's share of `fixed_fee`, due `relative_due_days` after `now`.
    pub fn milestone_invoice(
        &self,
        proposal_id: AggregateId,
        customer_id: CustomerId,
        created_by: MemberId,
        fixed_fee: Decimal,
        milestone: &MilestoneBilling,
        now: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        if milestone.percentage <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "milestone {} has no billable percentage",
                milestone.milestone_id
            )));
        }
        let amount = percentage_of(fixed_fee, milestone.percentage);
        let due = offset_days(now.date_naive(), milestone.relative_due_days)?;
        let mut invoice = self.draft_with_line(
            customer_id,
            created_by,
            milestone.description.clone(),
            amount,
            Some(due),
            now,
        )?;
        invoice.set_origin(InvoiceOrigin {
            proposal_id,
            milestone_id: Some(milestone.milestone_id),
        });
        Ok(invoice)
    }
}

impl Default for BillingEntityFactory {
    fn default() -> Self {
        Self::new("USD", 30)
    }
}

fn offset_days(date: NaiveDate, days: u32) -> DomainResult<NaiveDate> {
    if days > MAX_DUE_DAYS {
        return Err(DomainError::validation(format!(
            "due date offset of {days} days exceeds {MAX_DUE_DAYS}"
        )));
    }
    date.checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| DomainError::validation(format!("due date {date} + {days} days is out of range")))
}
