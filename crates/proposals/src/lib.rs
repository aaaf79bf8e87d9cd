//! Proposals domain module.
//!
//! A proposal is authored while DRAFT, sent to a customer's portal contact,
//! and then accepted, declined or left to expire. Accepting a fixed-fee
//! proposal bills it, either in full or per milestone.

pub mod milestone;
pub mod proposal;

pub use milestone::{ProposalMilestone, ProposalMilestoneId, validate_milestone_set};
pub use proposal::{
    FeeArrangement, FeeModel, Proposal, ProposalId, ProposalStatus, RetainerPeriod, TeamMember,
};
