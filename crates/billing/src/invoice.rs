use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use praxis_core::{
    AggregateId, AggregateRoot, DomainError, DomainResult, Entity, Lifecycle, MemberId,
    ensure_editable, line_amount, typed_id,
};
use praxis_parties::CustomerId;

typed_id!(
    /// Invoice identifier (tenant-scoped).
    InvoiceId
);

typed_id!(
    /// Invoice line identifier.
    InvoiceLineId
);

/// Invoice status lifecycle.
///
/// DRAFT → APPROVED → SENT → PAID, with VOID reachable from APPROVED and SENT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Approved,
    Sent,
    Paid,
    Void,
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Approved => "APPROVED",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Void => "VOID",
        };
        f.write_str(s)
    }
}

impl Lifecycle for InvoiceStatus {
    const ALL: &'static [Self] = &[
        InvoiceStatus::Draft,
        InvoiceStatus::Approved,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Void,
    ];
    const ENTITY: &'static str = "invoice";

    fn can_transition(self, target: Self) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, target),
            (Draft, Approved) | (Approved, Sent) | (Approved, Void) | (Sent, Paid) | (Sent, Void)
        )
    }
}

/// Account a payment for this invoice settles into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentDestination {
    #[default]
    Operating,
    Trust,
}

/// Where an invoice came from when it was generated rather than hand-written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceOrigin {
    pub proposal_id: AggregateId,
    pub milestone_id: Option<AggregateId>,
}

/// Invoice line. `amount` is always `round(quantity × unit_price)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    id: InvoiceLineId,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    amount: Decimal,
}

impl InvoiceLine {
    pub fn new(
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> DomainResult<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(DomainError::validation("invoice line description is required"));
        }
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("invoice line quantity must be positive"));
        }
        if unit_price < Decimal::ZERO {
            return Err(DomainError::validation("invoice line unit price cannot be negative"));
        }

        Ok(Self {
            id: InvoiceLineId::new(),
            description,
            quantity,
            unit_price,
            amount: line_amount(quantity, unit_price),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

impl Entity for InvoiceLine {
    type Id = InvoiceLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    customer_id: CustomerId,
    number: Option<String>,
    status: InvoiceStatus,
    currency: String,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    lines: Vec<InvoiceLine>,
    subtotal: Decimal,
    tax_amount: Decimal,
    total: Decimal,
    payment_session_id: Option<String>,
    payment_reference: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    void_reason: Option<String>,
    payment_destination: PaymentDestination,
    origin: Option<InvoiceOrigin>,
    created_by: MemberId,
    created_at: DateTime<Utc>,
}

impl Invoice {
    /// A new, empty DRAFT invoice.
    pub fn draft(
        id: InvoiceId,
        customer_id: CustomerId,
        currency: impl Into<String>,
        created_by: MemberId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id,
            number: None,
            status: InvoiceStatus::Draft,
            currency: currency.into(),
            issue_date: None,
            due_date: None,
            lines: Vec::new(),
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            payment_session_id: None,
            payment_reference: None,
            paid_at: None,
            void_reason: None,
            payment_destination: PaymentDestination::default(),
            origin: None,
            created_by,
            created_at,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    pub fn tax_amount(&self) -> Decimal {
        self.tax_amount
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn payment_session_id(&self) -> Option<&str> {
        self.payment_session_id.as_deref()
    }

    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    pub fn payment_destination(&self) -> PaymentDestination {
        self.payment_destination
    }

    pub fn origin(&self) -> Option<InvoiceOrigin> {
        self.origin
    }

    pub fn created_by(&self) -> MemberId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_editable(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }

    pub fn is_payable(&self) -> bool {
        self.status == InvoiceStatus::Sent
    }

    fn ensure_editable(&self) -> DomainResult<()> {
        ensure_editable(self.status, InvoiceStatus::Draft, "invoice")
    }

    fn recalculate(&mut self) {
        self.subtotal = self.lines.iter().map(InvoiceLine::amount).sum();
        self.total = self.subtotal + self.tax_amount;
    }

    pub fn add_line(&mut self, line: InvoiceLine) -> DomainResult<()> {
        self.ensure_editable()?;
        self.lines.push(line);
        self.recalculate();
        Ok(())
    }

    pub fn update_line(
        &mut self,
        line_id: InvoiceLineId,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> DomainResult<()> {
        self.ensure_editable()?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| DomainError::not_found("invoice line", line_id))?;
        let replacement = InvoiceLine::new(line.description.clone(), quantity, unit_price)?;
        line.quantity = replacement.quantity;
        line.unit_price = replacement.unit_price;
        line.amount = replacement.amount;
        self.recalculate();
        Ok(())
    }

    pub fn remove_line(&mut self, line_id: InvoiceLineId) -> DomainResult<InvoiceLine> {
        self.ensure_editable()?;
        let idx = self
            .lines
            .iter()
            .position(|l| l.id == line_id)
            .ok_or_else(|| DomainError::not_found("invoice line", line_id))?;
        let removed = self.lines.remove(idx);
        self.recalculate();
        Ok(removed)
    }

    pub fn set_tax_amount(&mut self, tax_amount: Decimal) -> DomainResult<()> {
        self.ensure_editable()?;
        if tax_amount < Decimal::ZERO {
            return Err(DomainError::validation("tax amount cannot be negative"));
        }
        self.tax_amount = praxis_core::round_money(tax_amount);
        self.recalculate();
        Ok(())
    }

    pub fn set_due_date(&mut self, due_date: NaiveDate) -> DomainResult<()> {
        self.ensure_editable()?;
        self.due_date = Some(due_date);
        Ok(())
    }

    pub fn set_payment_destination(&mut self, destination: PaymentDestination) -> DomainResult<()> {
        self.ensure_editable()?;
        self.payment_destination = destination;
        Ok(())
    }

    pub(crate) fn set_origin(&mut self, origin: InvoiceOrigin) {
        self.origin = Some(origin);
    }

    /// DRAFT → APPROVED, assigning the allocated document number.
    pub fn approve(&mut self, number: String) -> DomainResult<()> {
        self.status = self.ensure_approvable()?;
        self.number = Some(number);
        Ok(())
    }

    /// Checks `approve` makes, without changing anything. Lets callers
    /// refuse before allocating a number.
    pub fn ensure_approvable(&self) -> DomainResult<InvoiceStatus> {
        let next = self.status.transition(InvoiceStatus::Approved, "approve invoice")?;
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot approve an invoice without lines"));
        }
        Ok(next)
    }

    /// APPROVED → SENT. The issue date defaults to `today` when not set.
    pub fn send(&mut self, today: NaiveDate) -> DomainResult<()> {
        self.status = self.status.transition(InvoiceStatus::Sent, "send invoice")?;
        self.issue_date.get_or_insert(today);
        Ok(())
    }

    /// APPROVED/SENT → VOID.
    pub fn void(&mut self, reason: Option<String>) -> DomainResult<()> {
        self.status = self.status.transition(InvoiceStatus::Void, "void invoice")?;
        self.void_reason = reason;
        self.payment_session_id = None;
        Ok(())
    }

    /// SENT → PAID.
    pub fn mark_paid(
        &mut self,
        payment_reference: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.status = self.status.transition(InvoiceStatus::Paid, "mark invoice paid")?;
        self.payment_reference = payment_reference;
        self.paid_at = Some(paid_at);
        Ok(())
    }

    /// Record the checkout session currently offered for this invoice.
    pub fn attach_payment_session(&mut self, session_id: String) -> DomainResult<()> {
        if !self.is_payable() {
            return Err(DomainError::conflict(format!(
                "invoice {} is not payable while {}",
                self.id, self.status
            )));
        }
        self.payment_session_id = Some(session_id);
        Ok(())
    }

    /// Forget the current session if it is `session_id`.
    pub fn detach_payment_session(&mut self, session_id: &str) {
        if self.payment_session_id.as_deref() == Some(session_id) {
            self.payment_session_id = None;
        }
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn aggregate_type() -> &'static str {
        "billing.invoice"
    }
}
