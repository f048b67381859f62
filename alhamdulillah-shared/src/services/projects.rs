//! Projects and project membership

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::error::{ServiceError, ServiceResult};
use crate::auth::authorization::{require_admin, require_self_or_admin};
use crate::models::project::{
    dates_are_ordered, CreateProject, Project, ProjectFilter, ProjectMember, ProjectMemberDetail,
    ProjectStatus, UpdateProject, DEFAULT_CATEGORY, DEFAULT_MEMBER_ROLE,
};
use crate::models::user::User;
use crate::pagination::{Page, PageRequest};
use crate::store::Store;

/// Input for a new project
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub location: Option<String>,
    pub contact_number: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub initial_investment: i64,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    pub user_id: Uuid,
    pub role: Option<String>,
}

fn non_blank(value: &str, field: &str) -> ServiceResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn check_shape(investment: i64, start: Option<NaiveDate>, end: Option<NaiveDate>) -> ServiceResult<()> {
    if investment < 0 {
        return Err(ServiceError::Validation(
            "Initial investment cannot be negative".to_string(),
        ));
    }
    if !dates_are_ordered(start, end) {
        return Err(ServiceError::Validation(
            "End date cannot be before the start date".to_string(),
        ));
    }
    Ok(())
}

async fn load(store: &dyn Store, id: Uuid) -> ServiceResult<Project> {
    store
        .find_project(id)
        .await?
        .ok_or(ServiceError::NotFound("Project"))
}

pub async fn list(
    store: &dyn Store,
    filter: ProjectFilter,
    page: PageRequest,
) -> ServiceResult<Page<Project>> {
    Ok(store.list_projects(&filter, page).await?)
}

pub async fn get(store: &dyn Store, id: Uuid) -> ServiceResult<Project> {
    load(store, id).await
}

/// Creates a project owned by the caller
///
/// # Errors
///
/// - `Forbidden` below ADMIN
/// - `Validation` for a blank name or description, a negative investment
///   or an end date before the start date
pub async fn create(store: &dyn Store, actor: &User, input: NewProject) -> ServiceResult<Project> {
    require_admin(actor)?;

    let name = non_blank(&input.name, "Name")?;
    let description = non_blank(&input.description, "Description")?;
    check_shape(input.initial_investment, input.start_date, input.end_date)?;

    let category = input
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let project = store
        .create_project(CreateProject {
            name,
            description,
            category,
            location: input.location,
            contact_number: input.contact_number,
            thumbnail: input.thumbnail,
            images: input.images,
            videos: input.videos,
            initial_investment: input.initial_investment,
            status: input.status.unwrap_or(ProjectStatus::Upcoming),
            start_date: input.start_date,
            end_date: input.end_date,
            created_by: Some(actor.id),
        })
        .await?;

    info!(project_id = %project.id, created_by = %actor.id, "Project created");
    Ok(project)
}

/// Applies a partial update; the merged date range must stay ordered
pub async fn update(
    store: &dyn Store,
    actor: &User,
    id: Uuid,
    mut patch: UpdateProject,
) -> ServiceResult<Project> {
    require_admin(actor)?;

    let current = load(store, id).await?;

    if let Some(name) = patch.name.take() {
        patch.name = Some(non_blank(&name, "Name")?);
    }
    if let Some(description) = patch.description.take() {
        patch.description = Some(non_blank(&description, "Description")?);
    }
    check_shape(
        patch.initial_investment.unwrap_or(current.initial_investment),
        patch.start_date.or(current.start_date),
        patch.end_date.or(current.end_date),
    )?;

    store
        .update_project(id, patch)
        .await?
        .ok_or(ServiceError::NotFound("Project"))
}

pub async fn delete(store: &dyn Store, actor: &User, id: Uuid) -> ServiceResult<()> {
    require_admin(actor)?;

    if !store.delete_project(id).await? {
        return Err(ServiceError::NotFound("Project"));
    }

    info!(project_id = %id, deleted_by = %actor.id, "Project deleted");
    Ok(())
}

pub async fn members(store: &dyn Store, project_id: Uuid) -> ServiceResult<Vec<ProjectMemberDetail>> {
    load(store, project_id).await?;
    Ok(store.list_project_members(project_id).await?)
}

/// Adds a user to a project
///
/// # Errors
///
/// - `Forbidden` below ADMIN
/// - `NotFound` for an unknown project or user
/// - `Conflict` if the user is already a member
pub async fn add_member(
    store: &dyn Store,
    actor: &User,
    project_id: Uuid,
    input: NewMember,
) -> ServiceResult<ProjectMember> {
    require_admin(actor)?;

    load(store, project_id).await?;
    store
        .find_user(input.user_id)
        .await?
        .ok_or(ServiceError::NotFound("User"))?;

    let role = input
        .role
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_MEMBER_ROLE.to_string());

    Ok(store.add_project_member(project_id, input.user_id, &role).await?)
}

/// Removes a member; members may leave on their own
pub async fn remove_member(
    store: &dyn Store,
    actor: &User,
    project_id: Uuid,
    user_id: Uuid,
) -> ServiceResult<()> {
    require_self_or_admin(actor, user_id)?;

    if !store.remove_project_member(project_id, user_id).await? {
        return Err(ServiceError::NotFound("Project member"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{CreateUser, UserRole, UserStatus};
    use crate::store::{MemoryStore, UserStore};

    async fn user(store: &MemoryStore, role: UserRole) -> User {
        store
            .create_user(CreateUser {
                name: format!("{} user", role.as_str()),
                email: format!("{}@example.com", Uuid::new_v4()),
                phone: None,
                address: None,
                password_hash: String::new(),
                role,
                status: UserStatus::Active,
            })
            .await
            .unwrap()
    }

    fn input(name: &str) -> NewProject {
        NewProject {
            name: name.to_string(),
            description: "Rice cultivation in Rangpur".to_string(),
            category: None,
            location: Some("Rangpur".to_string()),
            contact_number: None,
            thumbnail: None,
            images: vec![],
            videos: vec![],
            initial_investment: 50_000,
            status: None,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31),
        }
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let store = MemoryStore::new();
        let admin = user(&store, UserRole::Admin).await;

        let project = create(&store, &admin, input("  Paddy  ")).await.unwrap();
        assert_eq!(project.name, "Paddy");
        assert_eq!(project.category, DEFAULT_CATEGORY);
        assert_eq!(project.status, ProjectStatus::Upcoming);
        assert_eq!(project.created_by, Some(admin.id));
    }

    #[tokio::test]
    async fn test_members_cannot_create() {
        let store = MemoryStore::new();
        let member = user(&store, UserRole::Member).await;

        let err = create(&store, &member, input("Paddy")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_update_checks_merged_dates() {
        let store = MemoryStore::new();
        let admin = user(&store, UserRole::Admin).await;
        let project = create(&store, &admin, input("Paddy")).await.unwrap();

        let err = update(
            &store,
            &admin,
            project.id,
            UpdateProject {
                end_date: NaiveDate::from_ymd_opt(2023, 6, 1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let updated = update(
            &store,
            &admin,
            project.id,
            UpdateProject {
                status: Some(ProjectStatus::Ongoing),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.status, ProjectStatus::Ongoing);
    }

    #[tokio::test]
    async fn test_membership_rules() {
        let store = MemoryStore::new();
        let admin = user(&store, UserRole::Admin).await;
        let member = user(&store, UserRole::Member).await;
        let other = user(&store, UserRole::Member).await;
        let project = create(&store, &admin, input("Paddy")).await.unwrap();

        let joined = add_member(
            &store,
            &admin,
            project.id,
            NewMember {
                user_id: member.id,
                role: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(joined.role, DEFAULT_MEMBER_ROLE);

        let err = add_member(
            &store,
            &admin,
            project.id,
            NewMember {
                user_id: member.id,
                role: Some("Investor".to_string()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = remove_member(&store, &other, project.id, member.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        remove_member(&store, &member, project.id, member.id).await.unwrap();
        assert!(members(&store, project.id).await.unwrap().is_empty());
    }
}
