use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use praxis_core::{AggregateRoot, MemberId, typed_id};

use crate::customer::CustomerId;

typed_id!(
    /// Project identifier (tenant-scoped).
    ProjectId
);

typed_id!(
    /// Project template identifier.
    ProjectTemplateId
);

/// Aggregate root: Project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub customer_id: CustomerId,
    pub title: String,
    pub template_id: Option<ProjectTemplateId>,
    pub created_by: MemberId,
    pub created_at: DateTime<Utc>,
}

impl AggregateRoot for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn aggregate_type() -> &'static str {
        "parties.project"
    }
}

/// Membership of a tenant member on a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub project_id: ProjectId,
    pub member_id: MemberId,
    pub role: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Outcome of adding a member to a project.
///
/// Adding someone who is already on the project is not an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemberAddition {
    Added,
    AlreadyPresent,
}

/// Reusable project blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTemplate {
    pub id: ProjectTemplateId,
    pub name: String,
    /// Members every project created from this template starts with.
    pub default_members: Vec<(MemberId, Option<String>)>,
}

impl AggregateRoot for ProjectTemplate {
    type Id = ProjectTemplateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn aggregate_type() -> &'static str {
        "parties.project_template"
    }
}
