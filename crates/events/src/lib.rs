//! Workflow events and their post-commit distribution.
//!
//! Events in this crate describe facts that became durable when a tenant
//! transaction committed. They are published only by the deferred dispatcher,
//! never from inside a transaction.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod tenant;
pub mod workflow;

pub use bus::{BusError, EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
pub use tenant::TenantScoped;
pub use workflow::WorkflowEvent;
