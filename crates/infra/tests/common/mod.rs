#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use praxis_core::{ActorRole, MemberId, OrgId, TenantBinding, TenantContext, TenantId};
use praxis_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription, WorkflowEvent};
use praxis_infra::ports::{
    Collaborators, FakePaymentGateway, PaymentGateways, ProjectService, RecordingNotificationSender,
    RecordingReadModelWriter, StoreProjectService,
};
use praxis_infra::workflow::{MilestoneDraft, NewProposal};
use praxis_infra::{Database, FixedClock, InMemoryDatabase, Transaction, WorkflowConfig, WorkflowEngine};
use praxis_parties::{Customer, CustomerId, PortalContactId};
use praxis_proposals::{FeeArrangement, ProposalId};

pub type Bus = InMemoryEventBus<EventEnvelope<WorkflowEvent>>;

pub struct Harness {
    pub db: InMemoryDatabase,
    pub engine: WorkflowEngine<InMemoryDatabase>,
    pub clock: Arc<FixedClock>,
    pub notifications: Arc<RecordingNotificationSender>,
    pub read_model: Arc<RecordingReadModelWriter>,
    pub gateway: Arc<FakePaymentGateway>,
    pub events: Subscription<EventEnvelope<WorkflowEvent>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_projects(Arc::new(StoreProjectService))
    }

    pub fn with_projects(projects: Arc<dyn ProjectService>) -> Self {
        praxis_observability::init_for_tests();

        let db = InMemoryDatabase::new();
        let notifications = Arc::new(RecordingNotificationSender::new());
        let read_model = Arc::new(RecordingReadModelWriter::new());
        let gateway = Arc::new(FakePaymentGateway::new("stripe"));
        let bus = Arc::new(Bus::new());
        let events = bus.subscribe();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));

        let collaborators = Collaborators {
            notifications: notifications.clone(),
            read_model: read_model.clone(),
            events: bus,
            payments: PaymentGateways::new().with(gateway.clone()),
        };
        let engine = WorkflowEngine::new(db.clone(), collaborators, projects, &WorkflowConfig::default())
            .with_clock(clock.clone());

        Self {
            db,
            engine,
            clock,
            notifications,
            read_model,
            gateway,
            events,
        }
    }

    /// Run `f` in a committed transaction of its own.
    pub fn seed<T>(&self, ctx: TenantContext, f: impl FnOnce(&mut dyn Transaction) -> T) -> T {
        let mut tx = self.db.begin(ctx).unwrap();
        let value = f(&mut tx);
        tx.commit().unwrap();
        value
    }

    /// Look at committed state without changing it.
    pub fn read<T>(&self, ctx: TenantContext, f: impl FnOnce(&dyn Transaction) -> T) -> T {
        let tx = self.db.begin(ctx).unwrap();
        let value = f(&tx);
        tx.rollback().unwrap();
        value
    }

    pub fn prospect(&self, ctx: TenantContext) -> CustomerId {
        self.seed(ctx, |tx| {
            let customer = Customer::prospect(CustomerId::new(), "Hollis & Reed LLP");
            let id = customer.id_typed();
            tx.save_customer(customer).unwrap();
            id
        })
    }

    /// A SENT proposal with a bound contact and the given team.
    pub fn sent_proposal(
        &self,
        ctx: TenantContext,
        fee: FeeArrangement,
        milestones: Vec<MilestoneDraft>,
        team: &[MemberId],
    ) -> (ProposalId, PortalContactId) {
        let customer_id = self.prospect(ctx);
        let proposal = self
            .engine
            .create_proposal(
                ctx,
                NewProposal {
                    title: "Annual accounts and tax".to_string(),
                    customer_id,
                    fee,
                    currency: None,
                },
            )
            .unwrap();
        let id = proposal.id_typed();
        let contact = PortalContactId::new();
        self.engine.bind_portal_contact(ctx, id, contact).unwrap();
        for member in team {
            self.engine
                .add_team_member(ctx, id, *member, Some("Associate".to_string()))
                .unwrap();
        }
        if !milestones.is_empty() {
            self.engine.replace_milestones(ctx, id, milestones).unwrap();
        }
        self.engine.send_proposal(ctx, id).unwrap();
        (id, contact)
    }
}

pub fn tenant() -> TenantContext {
    TenantContext::new(TenantId::new(), OrgId::new(), MemberId::new(), ActorRole::Admin)
}

pub fn binding(ctx: &TenantContext) -> TenantBinding {
    ctx.binding()
}

pub fn fixed(amount: i64) -> FeeArrangement {
    FeeArrangement::Fixed {
        amount: Decimal::from(amount),
    }
}

pub fn milestones(percentages: &[i64]) -> Vec<MilestoneDraft> {
    percentages
        .iter()
        .enumerate()
        .map(|(i, p)| MilestoneDraft {
            description: format!("Phase {}", i + 1),
            percentage: Decimal::from(*p),
            relative_due_days: 30 * (i as u32 + 1),
        })
        .collect()
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}
