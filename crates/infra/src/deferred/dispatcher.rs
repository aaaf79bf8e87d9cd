use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use anyhow::anyhow;
use tracing::{error, info, info_span};

use praxis_core::TenantContext;
use praxis_events::{Event, EventBus, EventEnvelope};

use super::{DeferredAction, SideEffect, TransactionOutcome};
use crate::ports::Collaborators;

/// What happened to the actions of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub executed: Vec<String>,
    /// (label, error) per failed action.
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs deferred actions once their transaction's outcome is known.
///
/// Each action runs under a system context rebuilt from the tenant captured
/// when it was queued. A failing or panicking action is logged and skipped;
/// the others still run.
#[derive(Clone)]
pub struct DeferredEventDispatcher {
    collaborators: Collaborators,
}

impl DeferredEventDispatcher {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn dispatch(&self, actions: Vec<DeferredAction>, outcome: &TransactionOutcome) -> DispatchReport {
        let mut report = DispatchReport::default();
        for action in actions {
            let ctx = TenantContext::system(action.binding);
            let span = info_span!(
                "deferred_action",
                label = %action.label,
                tenant_id = %ctx.tenant_id(),
            );
            let _entered = span.enter();

            let effect = action.effect;
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.run(&ctx, effect, outcome)))
                .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))));
            match result {
                Ok(()) => {
                    info!("deferred action executed");
                    report.executed.push(action.label);
                }
                Err(e) => {
                    error!(error = %e, "deferred action failed");
                    report.failed.push((action.label, format!("{e:#}")));
                }
            }
        }
        report
    }

    fn run(&self, ctx: &TenantContext, effect: SideEffect, outcome: &TransactionOutcome) -> anyhow::Result<()> {
        match effect {
            SideEffect::Notify(mut notification) => {
                if let TransactionOutcome::RolledBack { reason } = outcome {
                    notification.details = Some(reason.clone());
                }
                self.collaborators.notifications.send(ctx, &notification)
            }
            SideEffect::SyncProposal(snapshot) => self.collaborators.read_model.sync_proposal(ctx, &snapshot),
            SideEffect::Publish(event) => {
                let (aggregate_id, aggregate_type) = event.aggregate();
                let event_type = event.event_type();
                self.collaborators
                    .events
                    .publish(EventEnvelope::new(ctx.binding(), aggregate_id, aggregate_type, event))
                    .map_err(|e| anyhow!("publishing {event_type}: {e}"))
            }
            SideEffect::ExpirePaymentSession {
                provider_slug,
                session_id,
            } => {
                let gateway = self
                    .collaborators
                    .payments
                    .get(&provider_slug)
                    .ok_or_else(|| anyhow!("no payment gateway registered for {provider_slug}"))?;
                gateway.expire_session(ctx, &session_id)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
