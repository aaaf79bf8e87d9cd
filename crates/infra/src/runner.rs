//! Transaction boundary for workflow operations.
//!
//! ```text
//! begin(ctx)
//!   ↓
//! work(&mut tx)  ── Err ──→ take deferred → rollback → dispatch on-rollback actions
//!   ↓ Ok
//! take deferred → commit ── Err ──→ dispatch on-rollback actions
//!   ↓ Ok
//! dispatch on-commit actions
//! ```
//!
//! Deferred actions are taken off the transaction before it ends, so they
//! only ever run once its outcome is final.

use tracing::{error, warn};

use praxis_core::TenantContext;

use crate::deferred::{DeferredEventDispatcher, DispatchReport, TransactionOutcome};
use crate::error::WorkflowResult;
use crate::store::{Database, Transaction};

pub struct TransactionRunner<D> {
    db: D,
    dispatcher: DeferredEventDispatcher,
}

impl<D: Database> TransactionRunner<D> {
    pub fn new(db: D, dispatcher: DeferredEventDispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn dispatcher(&self) -> &DeferredEventDispatcher {
        &self.dispatcher
    }

    /// Run `work` as one atomic unit for `ctx`'s tenant.
    pub fn execute<T>(
        &self,
        ctx: TenantContext,
        work: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<T>,
    ) -> WorkflowResult<T> {
        self.execute_with_report(ctx, work).0
    }

    /// As [`execute`](Self::execute), also returning what the deferred
    /// dispatch did.
    pub fn execute_with_report<T>(
        &self,
        ctx: TenantContext,
        work: impl FnOnce(&mut dyn Transaction) -> WorkflowResult<T>,
    ) -> (WorkflowResult<T>, DispatchReport) {
        let mut tx = match self.db.begin(ctx) {
            Ok(tx) => tx,
            Err(e) => return (Err(e.into()), DispatchReport::default()),
        };

        match work(&mut tx) {
            Ok(value) => {
                let deferred = tx.take_deferred();
                match tx.commit() {
                    Ok(()) => {
                        let outcome = TransactionOutcome::Committed;
                        let report = self.dispatcher.dispatch(deferred.for_outcome(&outcome), &outcome);
                        (Ok(value), report)
                    }
                    Err(e) => {
                        error!(tenant_id = %ctx.tenant_id(), error = %e, "commit failed");
                        let outcome = TransactionOutcome::RolledBack {
                            reason: e.to_string(),
                        };
                        let report = self.dispatcher.dispatch(deferred.for_outcome(&outcome), &outcome);
                        (Err(e.into()), report)
                    }
                }
            }
            Err(e) => {
                warn!(tenant_id = %ctx.tenant_id(), error = %e, "rolling back");
                let deferred = tx.take_deferred();
                if let Err(rollback_err) = tx.rollback() {
                    error!(tenant_id = %ctx.tenant_id(), error = %rollback_err, "rollback failed");
                }
                let outcome = TransactionOutcome::RolledBack {
                    reason: e.to_string(),
                };
                let report = self.dispatcher.dispatch(deferred.for_outcome(&outcome), &outcome);
                (Err(e), report)
            }
        }
    }
}
