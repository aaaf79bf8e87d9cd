//! Catalogue of workflow events published after commit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use praxis_core::AggregateId;

use crate::Event;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    ProposalSent {
        proposal_id: AggregateId,
        number: String,
        occurred_at: DateTime<Utc>,
    },
    ProposalAccepted {
        proposal_id: AggregateId,
        project_id: AggregateId,
        invoice_ids: Vec<AggregateId>,
        occurred_at: DateTime<Utc>,
    },
    ProposalDeclined {
        proposal_id: AggregateId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    ProposalExpired {
        proposal_id: AggregateId,
        occurred_at: DateTime<Utc>,
    },
    InvoiceApproved {
        invoice_id: AggregateId,
        number: String,
        total: Decimal,
        occurred_at: DateTime<Utc>,
    },
    InvoiceSent {
        invoice_id: AggregateId,
        occurred_at: DateTime<Utc>,
    },
    InvoicePaid {
        invoice_id: AggregateId,
        payment_reference: Option<String>,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    },
    InvoiceVoided {
        invoice_id: AggregateId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    PaymentFailed {
        invoice_id: AggregateId,
        session_id: String,
        occurred_at: DateTime<Utc>,
    },
    PaymentExpired {
        invoice_id: AggregateId,
        session_id: String,
        occurred_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// The aggregate the event is about.
    pub fn aggregate(&self) -> (AggregateId, &'static str) {
        match self {
            WorkflowEvent::ProposalSent { proposal_id, .. }
            | WorkflowEvent::ProposalAccepted { proposal_id, .. }
            | WorkflowEvent::ProposalDeclined { proposal_id, .. }
            | WorkflowEvent::ProposalExpired { proposal_id, .. } => {
                (*proposal_id, "proposals.proposal")
            }
            WorkflowEvent::InvoiceApproved { invoice_id, .. }
            | WorkflowEvent::InvoiceSent { invoice_id, .. }
            | WorkflowEvent::InvoicePaid { invoice_id, .. }
            | WorkflowEvent::InvoiceVoided { invoice_id, .. }
            | WorkflowEvent::PaymentFailed { invoice_id, .. }
            | WorkflowEvent::PaymentExpired { invoice_id, .. } => (*invoice_id, "billing.invoice"),
        }
    }
}

impl Event for WorkflowEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::ProposalSent { .. } => "proposals.proposal.sent",
            WorkflowEvent::ProposalAccepted { .. } => "proposals.proposal.accepted",
            WorkflowEvent::ProposalDeclined { .. } => "proposals.proposal.declined",
            WorkflowEvent::ProposalExpired { .. } => "proposals.proposal.expired",
            WorkflowEvent::InvoiceApproved { .. } => "billing.invoice.approved",
            WorkflowEvent::InvoiceSent { .. } => "billing.invoice.sent",
            WorkflowEvent::InvoicePaid { .. } => "billing.invoice.paid",
            WorkflowEvent::InvoiceVoided { .. } => "billing.invoice.voided",
            WorkflowEvent::PaymentFailed { .. } => "billing.payment.failed",
            WorkflowEvent::PaymentExpired { .. } => "billing.payment.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkflowEvent::ProposalSent { occurred_at, .. }
            | WorkflowEvent::ProposalAccepted { occurred_at, .. }
            | WorkflowEvent::ProposalDeclined { occurred_at, .. }
            | WorkflowEvent::ProposalExpired { occurred_at, .. }
            | WorkflowEvent::InvoiceApproved { occurred_at, .. }
            | WorkflowEvent::InvoiceSent { occurred_at, .. }
            | WorkflowEvent::InvoicePaid { occurred_at, .. }
            | WorkflowEvent::InvoiceVoided { occurred_at, .. }
            | WorkflowEvent::PaymentFailed { occurred_at, .. }
            | WorkflowEvent::PaymentExpired { occurred_at, .. } => *occurred_at,
        }
    }
}
