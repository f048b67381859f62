//! Notice board endpoints
//!
//! Reads are public; writes need ADMIN or above.

use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiQuery},
    response::{ApiResponse, CacheTag},
};
use alhamdulillah_shared::{
    auth::middleware::AuthContext,
    models::notice::{Notice, UpdateNotice},
    pagination::PageRequest,
    services::notices::{self, NewNotice},
};
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ListNoticesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list_notices(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListNoticesQuery>,
) -> ApiResult<ApiResponse<Vec<Notice>>> {
    let page = PageRequest::new(query.page, query.limit, 10);
    let notices = notices::list(state.store.as_ref(), page).await?;
    Ok(ApiResponse::page("Notices fetched", notices))
}

pub async fn get_notice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<Notice>> {
    let notice = notices::get(state.store.as_ref(), id).await?;
    Ok(ApiResponse::ok("Notice fetched", notice))
}

pub async fn create_notice(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewNotice>,
) -> ApiResult<ApiResponse<Notice>> {
    let notice = notices::create(state.store.as_ref(), &auth.user, input).await?;
    Ok(ApiResponse::created("Notice published", notice).invalidates(&[CacheTag::Notice]))
}

pub async fn update_notice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    ApiJson(patch): ApiJson<UpdateNotice>,
) -> ApiResult<ApiResponse<Notice>> {
    let notice = notices::update(state.store.as_ref(), &auth.user, id, patch).await?;
    Ok(ApiResponse::ok("Notice updated", notice).invalidates(&[CacheTag::Notice]))
}

pub async fn delete_notice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    notices::delete(state.store.as_ref(), &auth.user, id).await?;
    Ok(ApiResponse::ok("Notice deleted", ()).invalidates(&[CacheTag::Notice]))
}
