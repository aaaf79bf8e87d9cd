//! Customers and projects.
//!
//! Customers carry their own lifecycle, which gates project creation.
//! Projects are created by the proposal acceptance workflow and staffed from
//! the proposal team (plus template defaults).

pub mod customer;
pub mod project;

pub use customer::{Customer, CustomerId, LifecycleStatus, PortalContactId};
pub use project::{
    MemberAddition, Project, ProjectId, ProjectMember, ProjectTemplate, ProjectTemplateId,
};
