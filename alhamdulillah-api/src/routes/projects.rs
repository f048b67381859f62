//! Project endpoints
//!
//! # Endpoints
//!
//! - `GET /api/projects` - List, filters `status`, `searchTerm` (public)
//! - `GET /api/projects/:id` - One project (public)
//! - `POST /api/projects` - Create (ADMIN+)
//! - `PATCH /api/projects/:id` - Update (ADMIN+)
//! - `DELETE /api/projects/:id` - Delete (ADMIN+)
//! - `GET /api/projects/:id/members` - Members
//! - `POST /api/projects/:id/members` - Add a member (ADMIN+)
//! - `DELETE /api/projects/:id/members/:user_id` - Remove (ADMIN+ or the member)

use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiQuery},
    response::{ApiResponse, CacheTag},
};
use alhamdulillah_shared::{
    auth::middleware::AuthContext,
    models::project::{
        Project, ProjectFilter, ProjectMember, ProjectMemberDetail, ProjectStatus, UpdateProject,
    },
    pagination::PageRequest,
    services::projects::{self, NewMember, NewProject},
};
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: u32 = 12;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProjectsQuery {
    pub status: Option<ProjectStatus>,
    pub search_term: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListProjectsQuery>,
) -> ApiResult<ApiResponse<Vec<Project>>> {
    let filter = ProjectFilter {
        status: query.status,
        search: query.search_term.filter(|s| !s.trim().is_empty()),
    };
    let page = PageRequest::new(query.page, query.limit, DEFAULT_PAGE_SIZE);

    let projects = projects::list(state.store.as_ref(), filter, page).await?;
    Ok(ApiResponse::page("Projects fetched", projects))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<Project>> {
    let project = projects::get(state.store.as_ref(), id).await?;
    Ok(ApiResponse::ok("Project fetched", project))
}

pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewProject>,
) -> ApiResult<ApiResponse<Project>> {
    let project = projects::create(state.store.as_ref(), &auth.user, input).await?;
    Ok(ApiResponse::created("Project created", project).invalidates(&[CacheTag::Project]))
}

pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    ApiJson(patch): ApiJson<UpdateProject>,
) -> ApiResult<ApiResponse<Project>> {
    let project = projects::update(state.store.as_ref(), &auth.user, id, patch).await?;
    Ok(ApiResponse::ok("Project updated", project).invalidates(&[CacheTag::Project]))
}

/// Payments keep their records; their project link is cleared
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    projects::delete(state.store.as_ref(), &auth.user, id).await?;
    Ok(ApiResponse::ok("Project deleted", ()).invalidates(&[CacheTag::Project, CacheTag::Payment]))
}

pub async fn list_members(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<Vec<ProjectMemberDetail>>> {
    let members = projects::members(state.store.as_ref(), id).await?;
    Ok(ApiResponse::ok("Project members fetched", members))
}

pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<NewMember>,
) -> ApiResult<ApiResponse<ProjectMember>> {
    let member = projects::add_member(state.store.as_ref(), &auth.user, id, input).await?;
    Ok(ApiResponse::created("Member added", member).invalidates(&[CacheTag::Project]))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<()>> {
    projects::remove_member(state.store.as_ref(), &auth.user, id, user_id).await?;
    Ok(ApiResponse::ok("Member removed", ()).invalidates(&[CacheTag::Project]))
}
