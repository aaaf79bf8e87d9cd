//! Gap-free document numbering.
//!
//! One counter row per (tenant, document kind). Allocation goes through the
//! active transaction: the counter advance commits or rolls back together
//! with the caller's work, and concurrent allocators in the same tenant wait
//! on the row instead of racing.

pub mod counter;
pub mod postgres;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WorkflowConfig;
use crate::error::WorkflowResult;
use crate::store::Transaction;

pub use counter::{CounterTable, TxId};
pub use postgres::PgSequenceCounter;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Proposal,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Proposal => "proposal",
        }
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats counter values as document numbers (`INV-0001`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceAllocator {
    invoice_prefix: String,
    proposal_prefix: String,
    min_digits: usize,
}

impl SequenceAllocator {
    pub fn new(
        invoice_prefix: impl Into<String>,
        proposal_prefix: impl Into<String>,
        min_digits: usize,
    ) -> Self {
        Self {
            invoice_prefix: invoice_prefix.into(),
            proposal_prefix: proposal_prefix.into(),
            min_digits,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(
            config.invoice_prefix.clone(),
            config.proposal_prefix.clone(),
            config.sequence_min_digits,
        )
    }

    pub fn prefix(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Invoice => &self.invoice_prefix,
            DocumentKind::Proposal => &self.proposal_prefix,
        }
    }

    pub fn format(&self, kind: DocumentKind, value: u64) -> String {
        format!("{}-{:0width$}", self.prefix(kind), value, width = self.min_digits)
    }

    /// Next number for `kind` in the transaction's tenant.
    pub fn allocate(&self, tx: &mut dyn Transaction, kind: DocumentKind) -> WorkflowResult<String> {
        let value = tx.next_sequence_value(kind)?;
        let number = self.format(kind, value);
        debug!(
            tenant_id = %tx.context().tenant_id(),
            kind = %kind,
            number = %number,
            "allocated document number"
        );
        Ok(number)
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}
