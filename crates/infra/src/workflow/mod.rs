//! Workflow operations.
//!
//! Every operation takes the caller's open [`Transaction`](crate::store::Transaction)
//! and a timestamp; none of them commits. Side effects are queued on the
//! transaction and run by the dispatcher once the outcome is known.

pub mod acceptance;
pub mod expiry;
pub mod invoices;
pub mod payments;
pub mod proposals;
pub mod sessions;

pub use acceptance::{OrchestrationResult, ProposalAcceptanceOrchestrator};
pub use expiry::{ProposalExpiry, SweepFailure, SweepReport};
pub use invoices::{InvoiceWorkflow, NewInvoice};
pub use payments::{
    CallbackStatus, DropReason, PaymentReconciliationEngine, ReconciliationOutcome, WebhookResult,
};
pub use proposals::{MilestoneDraft, NewProposal, ProposalWorkflow};
pub use sessions::PaymentSessionWorkflow;
