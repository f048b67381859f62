//! Account administration endpoints
//!
//! # Endpoints
//!
//! - `GET /api/users` - List accounts (ADMIN+)
//! - `GET /api/users/:id` - One account (ADMIN+)
//! - `PATCH /api/users/me` - Update own name, phone, address
//! - `PATCH /api/users/:id` - Change role, status, permissions (ADMIN+)
//! - `DELETE /api/users/:id` - Delete an account (ADMIN+)

use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiQuery},
    response::{ApiResponse, CacheTag},
};
use alhamdulillah_shared::{
    auth::middleware::AuthContext,
    models::user::{AccessUpdate, ProfileUpdate, User, UserFilter, UserRole, UserStatus},
    pagination::PageRequest,
    services::users,
};
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    /// Name or email substring
    pub search_term: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccessRequest {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub permissions: Option<Vec<String>>,
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> ApiResult<ApiResponse<Vec<User>>> {
    let filter = UserFilter {
        search: query.search_term.filter(|s| !s.trim().is_empty()),
        role: query.role,
        status: query.status,
    };
    let page = PageRequest::new(query.page, query.limit, DEFAULT_PAGE_SIZE);

    let users = users::list(state.store.as_ref(), &auth.user, filter, page).await?;
    Ok(ApiResponse::page("Users fetched", users))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<User>> {
    let user = users::get(state.store.as_ref(), &auth.user, id).await?;
    Ok(ApiResponse::ok("User fetched", user))
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult<ApiResponse<User>> {
    let user = users::update_profile(state.store.as_ref(), &auth.user, update).await?;
    Ok(ApiResponse::ok("Profile updated", user).invalidates(&[CacheTag::Auth, CacheTag::User]))
}

/// Changes role, status or permissions
///
/// Only a super admin may grant administrator roles or modify another
/// administrator.
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateAccessRequest>,
) -> ApiResult<ApiResponse<User>> {
    let update = AccessUpdate {
        role: req.role,
        status: req.status,
        permissions: req.permissions,
    };

    let user = users::update_access(state.store.as_ref(), &auth.user, id, update).await?;
    Ok(ApiResponse::ok("User updated", user).invalidates(&[CacheTag::User, CacheTag::Auth]))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    users::delete(state.store.as_ref(), &auth.user, id).await?;
    Ok(ApiResponse::ok("User deleted", ()).invalidates(&[CacheTag::User]))
}
