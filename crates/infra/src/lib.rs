//! Infrastructure layer: persistence gateway, sequence allocation, the
//! transaction runner with its deferred side effects, and the workflows that
//! run on top of them.

pub mod clock;
pub mod config;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod ports;
pub mod runner;
pub mod sequence;
pub mod store;
pub mod workflow;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::WorkflowConfig;
pub use deferred::{DeferredEventDispatcher, DeferredQueue, DispatchReport, SideEffect, TransactionOutcome};
pub use engine::WorkflowEngine;
pub use error::{StoreError, StoreResult, WorkflowError, WorkflowResult};
pub use runner::TransactionRunner;
pub use sequence::{DocumentKind, SequenceAllocator};
pub use store::{Database, InMemoryDatabase, Transaction};
