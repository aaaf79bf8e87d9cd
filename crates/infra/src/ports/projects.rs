use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use praxis_core::{AggregateRoot, DomainError, MemberId};
use praxis_parties::{
    Customer, CustomerId, LifecycleStatus, MemberAddition, Project, ProjectId, ProjectMember,
};

use super::{NewProject, ProjectService};
use crate::error::WorkflowResult;
use crate::store::{Transaction, audit};

/// Project service backed directly by the persistence gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreProjectService;

impl ProjectService for StoreProjectService {
    fn transition_customer(
        &self,
        tx: &mut dyn Transaction,
        customer_id: CustomerId,
        target: LifecycleStatus,
        now: DateTime<Utc>,
    ) -> WorkflowResult<LifecycleStatus> {
        let mut customer = tx.load_customer(customer_id)?;
        let previous = customer.transition_lifecycle(target, now)?;
        tx.save_customer(customer)?;
        audit::record(
            tx,
            Customer::aggregate_type(),
            customer_id.aggregate_id(),
            "lifecycle_changed",
            json!({ "from": previous, "to": target }),
            now,
        )?;
        info!(customer_id = %customer_id, from = %previous, to = %target, "customer lifecycle changed");
        Ok(previous)
    }

    fn create_project(&self, tx: &mut dyn Transaction, request: NewProject) -> WorkflowResult<ProjectId> {
        let customer = tx.load_customer(request.customer_id)?;
        customer.ensure_can_start_projects()?;

        let template = match request.template_id {
            Some(id) => Some(
                tx.find_project_template(id)?
                    .ok_or_else(|| DomainError::not_found("project template", id))?,
            ),
            None => None,
        };

        let project = Project {
            id: ProjectId::new(),
            customer_id: request.customer_id,
            title: request.title,
            template_id: request.template_id,
            created_by: request.created_by,
            created_at: request.created_at,
        };
        let project_id = project.id;
        tx.save_project(project)?;

        if let Some(template) = template {
            for (member_id, role) in template.default_members {
                self.add_member(tx, project_id, member_id, role, request.created_at)?;
            }
        }

        audit::record(
            tx,
            Project::aggregate_type(),
            project_id.aggregate_id(),
            "created",
            json!({ "customer_id": request.customer_id, "template_id": request.template_id }),
            request.created_at,
        )?;
        info!(project_id = %project_id, customer_id = %request.customer_id, "project created");
        Ok(project_id)
    }

    fn add_member(
        &self,
        tx: &mut dyn Transaction,
        project_id: ProjectId,
        member_id: MemberId,
        role: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<MemberAddition> {
        if tx.find_project(project_id)?.is_none() {
            return Err(DomainError::not_found("project", project_id).into());
        }
        if tx
            .project_members(project_id)?
            .iter()
            .any(|m| m.member_id == member_id)
        {
            debug!(project_id = %project_id, member_id = %member_id, "member already on project");
            return Ok(MemberAddition::AlreadyPresent);
        }
        tx.save_project_member(ProjectMember {
            project_id,
            member_id,
            role,
            added_at: now,
        })?;
        Ok(MemberAddition::Added)
    }
}
