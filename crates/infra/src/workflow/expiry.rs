//! Scheduled expiry of proposals whose validity has run out.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info, info_span};

use praxis_core::{AggregateRoot, TenantBinding, TenantContext, TenantId};
use praxis_events::WorkflowEvent;
use praxis_proposals::{Proposal, ProposalId, ProposalStatus};

use crate::deferred::{ProposalSnapshot, SideEffect};
use crate::error::WorkflowResult;
use crate::runner::TransactionRunner;
use crate::store::{Database, Transaction, audit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub tenant_id: TenantId,
    pub error: String,
}

/// Outcome of one sweep over many tenants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<(TenantId, Vec<ProposalId>)>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn expired_count(&self) -> usize {
        self.expired.iter().map(|(_, ids)| ids.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalExpiry;

impl ProposalExpiry {
    /// Expire every overdue SENT proposal of the transaction's tenant.
    pub fn expire_overdue(&self, tx: &mut dyn Transaction, now: DateTime<Utc>) -> WorkflowResult<Vec<ProposalId>> {
        let overdue: Vec<Proposal> = tx
            .proposals_by_status(ProposalStatus::Sent)?
            .into_iter()
            .filter(|p| p.is_overdue(now))
            .collect();

        let mut expired = Vec::with_capacity(overdue.len());
        for mut proposal in overdue {
            let proposal_id = proposal.id_typed();
            proposal.expire(now)?;
            tx.save_proposal(proposal.clone())?;
            audit::record(
                tx,
                Proposal::aggregate_type(),
                proposal_id.aggregate_id(),
                "expired",
                json!({ "expires_at": proposal.expires_at() }),
                now,
            )?;

            let deferred = tx.deferred();
            deferred.on_commit(
                "sync portal proposal",
                SideEffect::SyncProposal(ProposalSnapshot::from(&proposal)),
            );
            deferred.on_commit(
                "publish proposal expired",
                SideEffect::Publish(WorkflowEvent::ProposalExpired {
                    proposal_id: proposal_id.aggregate_id(),
                    occurred_at: now,
                }),
            );
            expired.push(proposal_id);
        }
        Ok(expired)
    }

    /// One transaction per tenant. A failing tenant is reported and the
    /// sweep moves on.
    pub fn sweep<D: Database>(
        &self,
        runner: &TransactionRunner<D>,
        tenants: &[TenantBinding],
        now: DateTime<Utc>,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        for binding in tenants {
            let span = info_span!("proposal_expiry", tenant_id = %binding.tenant_id);
            let _entered = span.enter();

            match runner.execute(TenantContext::system(*binding), |tx| self.expire_overdue(tx, now)) {
                Ok(ids) => {
                    if !ids.is_empty() {
                        info!(expired = ids.len(), "expired overdue proposals");
                    }
                    report.expired.push((binding.tenant_id, ids));
                }
                Err(e) => {
                    error!(error = %e, "proposal expiry failed for tenant");
                    report.failures.push(SweepFailure {
                        tenant_id: binding.tenant_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }
}
