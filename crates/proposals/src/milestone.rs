use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use praxis_billing::{InvoiceId, MAX_DUE_DAYS, MilestoneBilling};
use praxis_core::{DomainError, DomainResult, Entity, typed_id};

typed_id!(
    /// Proposal milestone identifier.
    ProposalMilestoneId
);

/// A billing milestone of a fixed-fee proposal.
///
/// `percentage` is the share of the fixed fee billed when the proposal is
/// accepted; the invoice falls due `relative_due_days` after acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalMilestone {
    id: ProposalMilestoneId,
    description: String,
    percentage: Decimal,
    relative_due_days: u32,
    invoice_id: Option<InvoiceId>,
}

impl ProposalMilestone {
    pub fn new(
        description: impl Into<String>,
        percentage: Decimal,
        relative_due_days: u32,
    ) -> DomainResult<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(DomainError::validation("milestone description is required"));
        }
        if percentage <= Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "milestone percentage must be in (0, 100], got {percentage}"
            )));
        }
        if relative_due_days > MAX_DUE_DAYS {
            return Err(DomainError::validation(format!(
                "milestone falls due {relative_due_days} days after acceptance, at most {MAX_DUE_DAYS} allowed"
            )));
        }
        Ok(Self {
            id: ProposalMilestoneId::new(),
            description,
            percentage,
            relative_due_days,
            invoice_id: None,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn percentage(&self) -> Decimal {
        self.percentage
    }

    pub fn relative_due_days(&self) -> u32 {
        self.relative_due_days
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    pub(crate) fn link_invoice(&mut self, invoice_id: InvoiceId) -> DomainResult<()> {
        match self.invoice_id {
            Some(existing) if existing != invoice_id => Err(DomainError::conflict(format!(
                "milestone {} is already billed by invoice {existing}",
                self.id
            ))),
            _ => {
                self.invoice_id = Some(invoice_id);
                Ok(())
            }
        }
    }

    pub fn billing(&self) -> MilestoneBilling {
        MilestoneBilling {
            milestone_id: self.id.aggregate_id(),
            description: self.description.clone(),
            percentage: self.percentage,
            relative_due_days: self.relative_due_days,
        }
    }
}

impl Entity for ProposalMilestone {
    type Id = ProposalMilestoneId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A milestone set is valid when empty or when its percentages add up to
/// exactly 100.00.
pub fn validate_milestone_set(milestones: &[ProposalMilestone]) -> DomainResult<()> {
    if milestones.is_empty() {
        return Ok(());
    }
    let total: Decimal = milestones.iter().map(ProposalMilestone::percentage).sum();
    if total != Decimal::ONE_HUNDRED {
        return Err(DomainError::validation(format!(
            "milestone percentages must sum to 100.00, got {total}"
        )));
    }
    Ok(())
}
