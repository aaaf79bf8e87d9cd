mod common;

use std::sync::Arc;

use praxis_core::{AggregateId, DomainError};
use praxis_events::{EventBus, WorkflowEvent};
use praxis_infra::deferred::{DeferredEventDispatcher, Notification, Recipient, SideEffect};
use praxis_infra::ports::{
    Collaborators, PaymentGateways, RecordingNotificationSender, RecordingReadModelWriter,
};
use praxis_infra::{InMemoryDatabase, Transaction, TransactionRunner, WorkflowResult};

use common::{Bus, tenant};

struct Setup {
    runner: TransactionRunner<InMemoryDatabase>,
    notifications: Arc<RecordingNotificationSender>,
    bus: Arc<Bus>,
}

fn setup() -> Setup {
    praxis_observability::init_for_tests();
    let notifications = Arc::new(RecordingNotificationSender::new());
    let bus = Arc::new(Bus::new());
    let runner = TransactionRunner::new(
        InMemoryDatabase::new(),
        DeferredEventDispatcher::new(Collaborators {
            notifications: notifications.clone(),
            read_model: Arc::new(RecordingReadModelWriter::new()),
            events: bus.clone(),
            payments: PaymentGateways::new(),
        }),
    );
    Setup {
        runner,
        notifications,
        bus,
    }
}

fn notice(kind: &str) -> SideEffect {
    SideEffect::Notify(Notification::new(Recipient::Admins, kind, kind, kind))
}

fn expired_event() -> SideEffect {
    SideEffect::Publish(WorkflowEvent::ProposalExpired {
        proposal_id: AggregateId::new(),
        occurred_at: chrono::Utc::now(),
    })
}

#[test]
fn rollback_runs_only_rollback_actions_for_the_callers_tenant() {
    let s = setup();
    let sub = s.bus.subscribe();
    let ctx = tenant();

    let (result, report) = s.runner.execute_with_report(ctx, |tx| -> WorkflowResult<()> {
        tx.deferred().on_commit("publish", expired_event());
        tx.deferred().on_commit("notify on commit", notice("committed"));
        tx.deferred().on_rollback("notify on rollback", notice("rolled_back"));
        Err(DomainError::conflict("customer is offboarded").into())
    });

    assert!(result.is_err());
    assert_eq!(report.executed, ["notify on rollback"]);
    assert!(sub.drain().is_empty());
    let sent = s.notifications.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, ctx.tenant_id());
    assert_eq!(sent[0].1.kind, "rolled_back");
    assert_eq!(sent[0].1.details.as_deref(), Some("conflict: customer is offboarded"));
}

#[test]
fn commit_runs_only_commit_actions() {
    let s = setup();
    let sub = s.bus.subscribe();
    let ctx = tenant();

    let (result, report) = s.runner.execute_with_report(ctx, |tx| -> WorkflowResult<u32> {
        tx.deferred().on_commit("publish", expired_event());
        tx.deferred().on_rollback("notify on rollback", notice("rolled_back"));
        Ok(7)
    });

    assert_eq!(result.unwrap(), 7);
    assert_eq!(report.executed, ["publish"]);
    assert!(s.notifications.sent().is_empty());
    let published = sub.drain();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].tenant_id(), ctx.tenant_id());
}

#[test]
fn failing_collaborator_does_not_undo_the_commit() {
    let s = setup();
    s.notifications.fail_all(true);
    let sub = s.bus.subscribe();
    let ctx = tenant();

    let (result, report) = s.runner.execute_with_report(ctx, |tx| -> WorkflowResult<()> {
        tx.deferred().on_commit("notify", notice("committed"));
        tx.deferred().on_commit("publish", expired_event());
        Ok(())
    });

    assert!(result.is_ok());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.executed, ["publish"]);
    assert_eq!(sub.drain().len(), 1);
}

#[test]
fn concurrent_tenants_keep_their_own_bindings() {
    let s = Arc::new(setup());
    let tenants: Vec<_> = (0..8).map(|_| tenant()).collect();

    let handles: Vec<_> = tenants
        .iter()
        .copied()
        .map(|ctx| {
            let s = s.clone();
            std::thread::spawn(move || {
                s.runner
                    .execute(ctx, |tx| -> WorkflowResult<()> {
                        tx.deferred().on_commit("notify", notice("committed"));
                        Ok(())
                    })
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut seen: Vec<_> = s.notifications.sent().into_iter().map(|(t, _)| t).collect();
    let mut expected: Vec<_> = tenants.iter().map(|c| c.tenant_id()).collect();
    seen.sort();
    expected.sort();
    assert_eq!(seen, expected);
}
