//! Post-commit event distribution.
//!
//! The bus carries committed workflow events to in-process consumers (read
//! models, integration relays). Delivery is at-least-once and best-effort;
//! the transaction that produced an event has already committed by the time
//! it is published, so a publish failure never undoes business state.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use thiserror::Error;

use praxis_core::TenantId;

use crate::TenantScoped;

/// Failure to hand a message to the bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("event bus lock poisoned")]
    Poisoned,
    #[error("event bus closed")]
    Closed,
}

/// A single subscriber's view of the bus (broadcast: every subscriber sees
/// every message published after it subscribed).
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

impl<M: TenantScoped> Subscription<M> {
    /// Buffered messages for `tenant_id`; anything else is discarded.
    pub fn drain_for(&self, tenant_id: TenantId) -> Vec<M> {
        self.receiver
            .try_iter()
            .filter(|m| m.belongs_to(tenant_id))
            .collect()
    }
}

/// Transport-agnostic pub/sub.
pub trait EventBus<M>: Send + Sync {
    fn publish(&self, message: M) -> Result<(), BusError>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    fn publish(&self, message: M) -> Result<(), BusError> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
