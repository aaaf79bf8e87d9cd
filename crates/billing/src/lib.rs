//! Billing domain module.
//!
//! Invoices (with their lines), the payment-event ledger and the factory that
//! builds draft invoices from proposal data. Pure domain logic: no IO, no
//! storage, no clocks (callers pass timestamps in).

pub mod factory;
pub mod invoice;
pub mod payment_event;

pub use factory::{BillingEntityFactory, MAX_DUE_DAYS, MilestoneBilling};
pub use invoice::{
    Invoice, InvoiceId, InvoiceLine, InvoiceLineId, InvoiceOrigin, InvoiceStatus,
    PaymentDestination,
};
pub use payment_event::{PaymentEvent, PaymentEventId, PaymentEventStatus};
