//! In-memory collaborators for tests/dev.
//!
//! Each one records what it was asked to do, together with the tenant it was
//! called for, and can be told to fail.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{anyhow, bail};

use praxis_core::{TenantContext, TenantId};

use super::{CheckoutRequest, CheckoutSession, NotificationSender, PaymentGateway, PortalReadModelWriter};
use crate::deferred::{Notification, ProposalSnapshot};

fn snapshot<T: Clone>(records: &Mutex<Vec<T>>) -> Vec<T> {
    records.lock().map(|r| r.clone()).unwrap_or_default()
}

fn record<T>(records: &Mutex<Vec<T>>, value: T) -> anyhow::Result<()> {
    records
        .lock()
        .map_err(|_| anyhow!("recording lock poisoned"))?
        .push(value);
    Ok(())
}

#[derive(Debug, Default)]
pub struct RecordingNotificationSender {
    sent: Mutex<Vec<(TenantId, Notification)>>,
    failing: AtomicBool,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(TenantId, Notification)> {
        snapshot(&self.sent)
    }
}

impl NotificationSender for RecordingNotificationSender {
    fn send(&self, ctx: &TenantContext, notification: &Notification) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("notification service unavailable");
        }
        record(&self.sent, (ctx.tenant_id(), notification.clone()))
    }
}

#[derive(Debug, Default)]
pub struct RecordingReadModelWriter {
    synced: Mutex<Vec<(TenantId, ProposalSnapshot)>>,
}

impl RecordingReadModelWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synced(&self) -> Vec<(TenantId, ProposalSnapshot)> {
        snapshot(&self.synced)
    }
}

impl PortalReadModelWriter for RecordingReadModelWriter {
    fn sync_proposal(&self, ctx: &TenantContext, snapshot: &ProposalSnapshot) -> anyhow::Result<()> {
        record(&self.synced, (ctx.tenant_id(), snapshot.clone()))
    }
}

/// Gateway handing out sequential `cs_test_<n>` sessions.
#[derive(Debug)]
pub struct FakePaymentGateway {
    slug: String,
    next_session: AtomicU64,
    created: Mutex<Vec<(TenantId, CheckoutRequest)>>,
    expired: Mutex<Vec<(TenantId, String)>>,
    failing: AtomicBool,
}

impl FakePaymentGateway {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            next_session: AtomicU64::new(1),
            created: Mutex::new(Vec::new()),
            expired: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<(TenantId, CheckoutRequest)> {
        snapshot(&self.created)
    }

    pub fn expired(&self) -> Vec<(TenantId, String)> {
        snapshot(&self.expired)
    }
}

impl PaymentGateway for FakePaymentGateway {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn create_checkout_session(
        &self,
        ctx: &TenantContext,
        request: &CheckoutRequest,
    ) -> anyhow::Result<CheckoutSession> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("{} unavailable", self.slug);
        }
        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        let session_id = format!("cs_test_{n}");
        record(&self.created, (ctx.tenant_id(), request.clone()))?;
        Ok(CheckoutSession {
            checkout_url: format!("https://pay.example.test/{}/{session_id}", self.slug),
            session_id,
        })
    }

    fn expire_session(&self, ctx: &TenantContext, session_id: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("{} unavailable", self.slug);
        }
        record(&self.expired, (ctx.tenant_id(), session_id.to_string()))
    }
}
