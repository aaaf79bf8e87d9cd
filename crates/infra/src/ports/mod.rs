//! Collaborator interfaces consumed by the workflows.
//!
//! The project service works inside the caller's transaction. Notification,
//! read-model and payment-gateway calls only ever happen from deferred
//! actions or, for checkout session creation, inside the request that asked
//! for a session.

pub mod memory;
pub mod projects;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use praxis_billing::InvoiceId;
use praxis_core::{MemberId, TenantContext};
use praxis_events::{EventBus, EventEnvelope, WorkflowEvent};
use praxis_parties::{CustomerId, LifecycleStatus, MemberAddition, ProjectId, ProjectTemplateId};

use crate::deferred::{Notification, ProposalSnapshot};
use crate::error::WorkflowResult;
use crate::store::Transaction;

pub use memory::{FakePaymentGateway, RecordingNotificationSender, RecordingReadModelWriter};
pub use projects::StoreProjectService;

/// Project and customer operations used by proposal acceptance.
pub trait ProjectService: Send + Sync {
    /// Move the customer to `target`, returning the previous status.
    fn transition_customer(
        &self,
        tx: &mut dyn Transaction,
        customer_id: CustomerId,
        target: LifecycleStatus,
        now: DateTime<Utc>,
    ) -> WorkflowResult<LifecycleStatus>;

    fn create_project(&self, tx: &mut dyn Transaction, request: NewProject) -> WorkflowResult<ProjectId>;

    /// Adding a member who is already on the project succeeds.
    fn add_member(
        &self,
        tx: &mut dyn Transaction,
        project_id: ProjectId,
        member_id: MemberId,
        role: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<MemberAddition>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub customer_id: CustomerId,
    pub title: String,
    pub template_id: Option<ProjectTemplateId>,
    pub created_by: MemberId,
    pub created_at: DateTime<Utc>,
}

pub trait NotificationSender: Send + Sync {
    fn send(&self, ctx: &TenantContext, notification: &Notification) -> anyhow::Result<()>;
}

/// Client-portal read path.
pub trait PortalReadModelWriter: Send + Sync {
    fn sync_proposal(&self, ctx: &TenantContext, snapshot: &ProposalSnapshot) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub amount: Decimal,
    pub currency: String,
    /// Echoed back in every callback for this session.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
}

pub trait PaymentGateway: Send + Sync {
    fn slug(&self) -> &str;

    fn create_checkout_session(
        &self,
        ctx: &TenantContext,
        request: &CheckoutRequest,
    ) -> anyhow::Result<CheckoutSession>;

    fn expire_session(&self, ctx: &TenantContext, session_id: &str) -> anyhow::Result<()>;
}

/// Payment gateways by provider slug.
#[derive(Clone, Default)]
pub struct PaymentGateways {
    by_slug: BTreeMap<String, Arc<dyn PaymentGateway>>,
}

impl PaymentGateways {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.by_slug.insert(gateway.slug().to_string(), gateway);
        self
    }

    pub fn get(&self, slug: &str) -> Option<&Arc<dyn PaymentGateway>> {
        self.by_slug.get(slug)
    }
}

impl core::fmt::Debug for PaymentGateways {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.by_slug.keys()).finish()
    }
}

pub type WorkflowEventBus = dyn EventBus<EventEnvelope<WorkflowEvent>>;

/// Everything deferred actions talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub notifications: Arc<dyn NotificationSender>,
    pub read_model: Arc<dyn PortalReadModelWriter>,
    pub events: Arc<WorkflowEventBus>,
    pub payments: PaymentGateways,
}
