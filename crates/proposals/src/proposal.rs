use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use praxis_billing::{InvoiceId, MilestoneBilling};
use praxis_core::{
    AggregateRoot, DomainError, DomainResult, Entity, Lifecycle, MemberId, ensure_editable,
    typed_id,
};
use praxis_parties::{CustomerId, PortalContactId, ProjectId, ProjectTemplateId};

use crate::milestone::{ProposalMilestone, ProposalMilestoneId, validate_milestone_set};

typed_id!(
    /// Proposal identifier (tenant-scoped).
    ProposalId
);

/// Proposal status lifecycle.
///
/// DRAFT → SENT → {ACCEPTED, DECLINED, EXPIRED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Draft,
    Sent,
    Accepted,
    Declined,
    Expired,
}

impl core::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ProposalStatus::Draft => "DRAFT",
            ProposalStatus::Sent => "SENT",
            ProposalStatus::Accepted => "ACCEPTED",
            ProposalStatus::Declined => "DECLINED",
            ProposalStatus::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

impl Lifecycle for ProposalStatus {
    const ALL: &'static [Self] = &[
        ProposalStatus::Draft,
        ProposalStatus::Sent,
        ProposalStatus::Accepted,
        ProposalStatus::Declined,
        ProposalStatus::Expired,
    ];
    const ENTITY: &'static str = "proposal";

    fn can_transition(self, target: Self) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, target),
            (Draft, Sent) | (Sent, Accepted) | (Sent, Declined) | (Sent, Expired)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeModel {
    Fixed,
    Hourly,
    Retainer,
}

impl core::fmt::Display for FeeModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            FeeModel::Fixed => "FIXED",
            FeeModel::Hourly => "HOURLY",
            FeeModel::Retainer => "RETAINER",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetainerPeriod {
    Monthly,
    Quarterly,
    Annually,
}

/// Fee terms, one shape per fee model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeArrangement {
    Fixed { amount: Decimal },
    Hourly { rate: Decimal },
    Retainer { amount: Decimal, period: RetainerPeriod },
}

impl FeeArrangement {
    pub fn model(&self) -> FeeModel {
        match self {
            FeeArrangement::Fixed { .. } => FeeModel::Fixed,
            FeeArrangement::Hourly { .. } => FeeModel::Hourly,
            FeeArrangement::Retainer { .. } => FeeModel::Retainer,
        }
    }

    /// Amount billed at acceptance; only fixed fees have one.
    pub fn fixed_amount(&self) -> Option<Decimal> {
        match self {
            FeeArrangement::Fixed { amount } => Some(*amount),
            _ => None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        let (field, value) = match self {
            FeeArrangement::Fixed { amount } => ("fixed fee amount", amount),
            FeeArrangement::Hourly { rate } => ("hourly rate", rate),
            FeeArrangement::Retainer { amount, .. } => ("retainer amount", amount),
        };
        if *value <= Decimal::ZERO {
            return Err(DomainError::validation(format!("{field} must be positive")));
        }
        Ok(())
    }

    pub fn summary(&self, currency: &str) -> String {
        match self {
            FeeArrangement::Fixed { amount } => format!("FIXED {amount} {currency}"),
            FeeArrangement::Hourly { rate } => format!("HOURLY {rate} {currency}/h"),
            FeeArrangement::Retainer { amount, period } => {
                format!("RETAINER {amount} {currency} {period:?}")
            }
        }
    }
}

/// Member of the firm staffed onto the project once the proposal is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub member_id: MemberId,
    pub role: Option<String>,
}

/// Aggregate root: Proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    id: ProposalId,
    number: String,
    title: String,
    customer_id: CustomerId,
    portal_contact_id: Option<PortalContactId>,
    status: ProposalStatus,
    fee: FeeArrangement,
    currency: String,
    project_template_id: Option<ProjectTemplateId>,
    milestones: Vec<ProposalMilestone>,
    team: Vec<TeamMember>,
    created_by: MemberId,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    accepted_at: Option<DateTime<Utc>>,
    declined_at: Option<DateTime<Utc>>,
    expired_at: Option<DateTime<Utc>>,
    decline_reason: Option<String>,
    created_project_id: Option<ProjectId>,
}

impl Proposal {
    /// A new DRAFT proposal carrying an already allocated `number`.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        id: ProposalId,
        number: String,
        title: impl Into<String>,
        customer_id: CustomerId,
        fee: FeeArrangement,
        currency: impl Into<String>,
        created_by: MemberId,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::validation("proposal title is required"));
        }
        Ok(Self {
            id,
            number,
            title,
            customer_id,
            portal_contact_id: None,
            status: ProposalStatus::Draft,
            fee,
            currency: currency.into(),
            project_template_id: None,
            milestones: Vec::new(),
            team: Vec::new(),
            created_by,
            created_at,
            sent_at: None,
            expires_at: None,
            accepted_at: None,
            declined_at: None,
            expired_at: None,
            decline_reason: None,
            created_project_id: None,
        })
    }

    pub fn id_typed(&self) -> ProposalId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn portal_contact_id(&self) -> Option<PortalContactId> {
        self.portal_contact_id
    }

    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    pub fn fee(&self) -> &FeeArrangement {
        &self.fee
    }

    pub fn fee_model(&self) -> FeeModel {
        self.fee.model()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn fee_summary(&self) -> String {
        self.fee.summary(&self.currency)
    }

    pub fn project_template_id(&self) -> Option<ProjectTemplateId> {
        self.project_template_id
    }

    pub fn milestones(&self) -> &[ProposalMilestone] {
        &self.milestones
    }

    pub fn team(&self) -> &[TeamMember] {
        &self.team
    }

    pub fn created_by(&self) -> MemberId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.accepted_at
    }

    pub fn declined_at(&self) -> Option<DateTime<Utc>> {
        self.declined_at
    }

    pub fn expired_at(&self) -> Option<DateTime<Utc>> {
        self.expired_at
    }

    pub fn decline_reason(&self) -> Option<&str> {
        self.decline_reason.as_deref()
    }

    pub fn created_project_id(&self) -> Option<ProjectId> {
        self.created_project_id
    }

    pub fn is_editable(&self) -> bool {
        self.status == ProposalStatus::Draft
    }

    fn ensure_editable(&self) -> DomainResult<()> {
        ensure_editable(self.status, ProposalStatus::Draft, "proposal")
    }

    pub fn rename(&mut self, title: impl Into<String>) -> DomainResult<()> {
        self.ensure_editable()?;
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::validation("proposal title is required"));
        }
        self.title = title;
        Ok(())
    }

    /// Replace the fee terms. Milestones only make sense for fixed fees and
    /// are dropped when switching away from one.
    pub fn set_fee(&mut self, fee: FeeArrangement) -> DomainResult<()> {
        self.ensure_editable()?;
        if fee.model() != FeeModel::Fixed {
            self.milestones.clear();
        }
        self.fee = fee;
        Ok(())
    }

    pub fn bind_portal_contact(&mut self, contact: PortalContactId) -> DomainResult<()> {
        self.ensure_editable()?;
        self.portal_contact_id = Some(contact);
        Ok(())
    }

    pub fn use_template(&mut self, template: Option<ProjectTemplateId>) -> DomainResult<()> {
        self.ensure_editable()?;
        self.project_template_id = template;
        Ok(())
    }

    /// Add `member_id` to the team, or update their role if already on it.
    pub fn add_team_member(&mut self, member_id: MemberId, role: Option<String>) -> DomainResult<()> {
        self.ensure_editable()?;
        match self.team.iter_mut().find(|m| m.member_id == member_id) {
            Some(existing) => existing.role = role,
            None => self.team.push(TeamMember { member_id, role }),
        }
        Ok(())
    }

    pub fn remove_team_member(&mut self, member_id: MemberId) -> DomainResult<()> {
        self.ensure_editable()?;
        let before = self.team.len();
        self.team.retain(|m| m.member_id != member_id);
        if self.team.len() == before {
            return Err(DomainError::not_found("team member", member_id));
        }
        Ok(())
    }

    /// Swap the whole milestone set. The new set is validated before the old
    /// one is touched.
    pub fn replace_milestones(&mut self, milestones: Vec<ProposalMilestone>) -> DomainResult<()> {
        self.ensure_editable()?;
        if !milestones.is_empty() && self.fee_model() != FeeModel::Fixed {
            return Err(DomainError::validation(format!(
                "milestones require a FIXED fee, proposal {} is {}",
                self.number,
                self.fee_model()
            )));
        }
        validate_milestone_set(&milestones)?;
        self.milestones = milestones;
        Ok(())
    }

    /// DRAFT → SENT. The proposal stays open for `validity` from `now`.
    pub fn send(&mut self, now: DateTime<Utc>, validity: Duration) -> DomainResult<()> {
        let next = self.status.transition(ProposalStatus::Sent, "send proposal")?;
        if self.portal_contact_id.is_none() {
            return Err(DomainError::validation(format!(
                "proposal {} has no portal contact to send to",
                self.number
            )));
        }
        self.fee.validate()?;
        validate_milestone_set(&self.milestones)?;
        let expires_at = now.checked_add_signed(validity).ok_or_else(|| {
            DomainError::validation(format!(
                "proposal {} validity of {} days is out of range",
                self.number,
                validity.num_days()
            ))
        })?;

        self.status = next;
        self.sent_at = Some(now);
        self.expires_at = Some(expires_at);
        Ok(())
    }

    /// Fails with `Mismatch` unless `contact` is the bound portal contact.
    pub fn ensure_contact(&self, contact: PortalContactId) -> DomainResult<()> {
        if self.portal_contact_id == Some(contact) {
            Ok(())
        } else {
            Err(DomainError::mismatch(format!(
                "portal contact {contact} is not the recipient of proposal {}",
                self.number
            )))
        }
    }

    /// SENT → ACCEPTED.
    pub fn accept(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = self.status.transition(ProposalStatus::Accepted, "accept proposal")?;
        self.accepted_at = Some(now);
        Ok(())
    }

    /// SENT → DECLINED.
    pub fn decline(&mut self, reason: Option<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = self.status.transition(ProposalStatus::Declined, "decline proposal")?;
        self.decline_reason = reason.filter(|r| !r.trim().is_empty());
        self.declined_at = Some(now);
        Ok(())
    }

    /// SENT → EXPIRED.
    pub fn expire(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = self.status.transition(ProposalStatus::Expired, "expire proposal")?;
        self.expired_at = Some(now);
        Ok(())
    }

    /// Still SENT but past its expiry time.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Sent && self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn link_project(&mut self, project_id: ProjectId) -> DomainResult<()> {
        if self.status != ProposalStatus::Accepted {
            return Err(DomainError::conflict(format!(
                "cannot link a project to proposal {} while {}",
                self.number, self.status
            )));
        }
        self.created_project_id = Some(project_id);
        Ok(())
    }

    pub fn link_milestone_invoice(
        &mut self,
        milestone_id: ProposalMilestoneId,
        invoice_id: InvoiceId,
    ) -> DomainResult<()> {
        let milestone = self
            .milestones
            .iter_mut()
            .find(|m| *m.id() == milestone_id)
            .ok_or_else(|| DomainError::not_found("proposal milestone", milestone_id))?;
        milestone.link_invoice(invoice_id)
    }

    /// Milestones in billing form, in their defined order.
    pub fn milestone_billing(&self) -> Vec<(ProposalMilestoneId, MilestoneBilling)> {
        self.milestones
            .iter()
            .map(|m| (*m.id(), m.billing()))
            .collect()
    }
}

impl AggregateRoot for Proposal {
    type Id = ProposalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn aggregate_type() -> &'static str {
        "proposals.proposal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn fixed(amount: &str) -> FeeArrangement {
        FeeArrangement::Fixed { amount: d(amount) }
    }

    fn draft() -> Proposal {
        Proposal::draft(
            ProposalId::new(),
            "PROP-0007".to_string(),
            "Annual audit",
            CustomerId::new(),
            fixed("9000"),
            "USD",
            MemberId::new(),
            Utc::now(),
        )
        .unwrap()
    }

    fn sent() -> (Proposal, PortalContactId) {
        let mut proposal = draft();
        let contact = PortalContactId::new();
        proposal.bind_portal_contact(contact).unwrap();
        proposal.send(Utc::now(), Duration::days(30)).unwrap();
        (proposal, contact)
    }

    fn milestones(pcts: &[&str]) -> Vec<ProposalMilestone> {
        pcts.iter()
            .map(|p| ProposalMilestone::new(format!("{p}%"), d(p), 30).unwrap())
            .collect()
    }

    #[test]
    fn invalid_milestone_set_leaves_existing_milestones() {
        let mut proposal = draft();
        proposal.replace_milestones(milestones(&["50", "30", "20"])).unwrap();

        let err = proposal
            .replace_milestones(milestones(&["50", "30", "19.99"]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(proposal.milestones().len(), 3);
        assert_eq!(proposal.milestones()[2].percentage(), d("20"));
    }

    #[test]
    fn milestones_need_fixed_fee() {
        let mut proposal = draft();
        proposal
            .set_fee(FeeArrangement::Hourly { rate: d("250") })
            .unwrap();
        assert!(proposal.replace_milestones(milestones(&["100"])).is_err());
        assert!(proposal.replace_milestones(Vec::new()).is_ok());
    }

    #[test]
    fn switching_away_from_fixed_clears_milestones() {
        let mut proposal = draft();
        proposal.replace_milestones(milestones(&["60", "40"])).unwrap();
        proposal
            .set_fee(FeeArrangement::Retainer {
                amount: d("1500"),
                period: RetainerPeriod::Monthly,
            })
            .unwrap();
        assert!(proposal.milestones().is_empty());
        assert_eq!(proposal.fee_model(), FeeModel::Retainer);
    }

    #[test]
    fn sending_requires_contact_and_fee() {
        let mut proposal = draft();
        let err = proposal.send(Utc::now(), Duration::days(30)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(proposal.status(), ProposalStatus::Draft);

        proposal.bind_portal_contact(PortalContactId::new()).unwrap();
        proposal.set_fee(fixed("0")).unwrap();
        assert!(proposal.send(Utc::now(), Duration::days(30)).is_err());

        proposal.set_fee(fixed("9000")).unwrap();
        let now = Utc::now();
        proposal.send(now, Duration::days(30)).unwrap();
        assert_eq!(proposal.status(), ProposalStatus::Sent);
        assert_eq!(proposal.expires_at(), Some(now + Duration::days(30)));
    }

    #[test]
    fn validity_past_the_calendar_is_rejected() {
        let mut proposal = draft();
        proposal.bind_portal_contact(PortalContactId::new()).unwrap();

        let err = proposal
            .send(Utc::now(), Duration::days(100_000_000))
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(proposal.status(), ProposalStatus::Draft);
        assert_eq!(proposal.sent_at(), None);
    }

    #[test]
    fn sent_proposal_is_frozen() {
        let (mut proposal, _) = sent();
        assert!(matches!(
            proposal.rename("Changed"),
            Err(DomainError::Conflict(_))
        ));
        assert!(matches!(
            proposal.add_team_member(MemberId::new(), None),
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(proposal.title(), "Annual audit");
    }

    #[test]
    fn wrong_contact_is_mismatch() {
        let (proposal, contact) = sent();
        assert!(proposal.ensure_contact(contact).is_ok());
        let err = proposal.ensure_contact(PortalContactId::new()).unwrap_err();
        assert!(matches!(err, DomainError::Mismatch(_)));
    }

    #[test]
    fn decline_records_reason() {
        let (mut proposal, _) = sent();
        proposal
            .decline(Some("Budget moved to next year".to_string()), Utc::now())
            .unwrap();
        assert_eq!(proposal.status(), ProposalStatus::Declined);
        assert_eq!(proposal.decline_reason(), Some("Budget moved to next year"));
        assert!(proposal.accept(Utc::now()).is_err());
    }

    #[test]
    fn overdue_only_while_sent() {
        let (mut proposal, _) = sent();
        let later = Utc::now() + Duration::days(31);
        assert!(proposal.is_overdue(later));
        proposal.expire(later).unwrap();
        assert!(!proposal.is_overdue(later));
        assert!(proposal.status().is_terminal());
    }

    #[test]
    fn team_membership_is_unique() {
        let mut proposal = draft();
        let member = MemberId::new();
        proposal.add_team_member(member, None).unwrap();
        proposal
            .add_team_member(member, Some("Lead".to_string()))
            .unwrap();
        assert_eq!(proposal.team().len(), 1);
        assert_eq!(proposal.team()[0].role.as_deref(), Some("Lead"));

        proposal.remove_team_member(member).unwrap();
        assert!(matches!(
            proposal.remove_team_member(member),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn project_link_requires_acceptance() {
        let (mut proposal, _) = sent();
        assert!(proposal.link_project(ProjectId::new()).is_err());
        proposal.accept(Utc::now()).unwrap();
        let project = ProjectId::new();
        proposal.link_project(project).unwrap();
        assert_eq!(proposal.created_project_id(), Some(project));
    }

    proptest! {
        #[test]
        fn transition_table_is_closed(from in 0usize..5, to in 0usize..5) {
            let from = ProposalStatus::ALL[from];
            let to = ProposalStatus::ALL[to];
            let allowed = matches!(
                (from, to),
                (ProposalStatus::Draft, ProposalStatus::Sent)
                    | (ProposalStatus::Sent, ProposalStatus::Accepted)
                    | (ProposalStatus::Sent, ProposalStatus::Declined)
                    | (ProposalStatus::Sent, ProposalStatus::Expired)
            );
            let result = from.transition(to, "table check");
            if allowed {
                prop_assert_eq!(result, Ok(to));
            } else {
                let is_invalid_state = matches!(result, Err(DomainError::InvalidState { .. }));
                prop_assert!(is_invalid_state);
            }
        }
    }
}
