//! Fund ledger and expense request endpoints
//!
//! # Endpoints
//!
//! - `POST /api/funds/transaction` - Record income or request an expense (ADMIN+)
//! - `GET /api/funds/summary` - Income, approved expenses and balance
//! - `GET /api/funds/history` - Every ledger entry, newest first
//! - `GET /api/funds/requests` - Expense requests, optional `status` (ADMIN+)
//! - `PATCH /api/funds/requests/:id/approve` - ADMIN verifies, SUPER_ADMIN approves
//! - `PATCH /api/funds/requests/:id/reject` - Reject with a reason (SUPER_ADMIN)

use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiQuery},
    response::{ApiResponse, CacheTag},
};
use alhamdulillah_shared::{
    auth::middleware::AuthContext,
    models::fund::{FundStatus, FundSummary, FundTransaction},
    pagination::PageRequest,
    services::{
        expenses::{self, ApprovalOutcome, ExpenseRequestView, Verification},
        ledger::{self, NewTransaction},
    },
};
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestsQuery {
    pub status: Option<FundStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    /// Required; checked by the workflow so a missing reason is a 422
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn add_transaction(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewTransaction>,
) -> ApiResult<ApiResponse<FundTransaction>> {
    let entry = ledger::add_transaction(state.store.as_ref(), &auth.user, input).await?;
    Ok(ApiResponse::created("Transaction recorded", entry).invalidates(&[CacheTag::Fund]))
}

pub async fn summary(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> ApiResult<ApiResponse<FundSummary>> {
    let summary = ledger::summary(state.store.as_ref()).await?;
    Ok(ApiResponse::ok("Fund summary fetched", summary))
}

pub async fn history(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<ApiResponse<Vec<FundTransaction>>> {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_PAGE_SIZE);
    let history = ledger::history(state.store.as_ref(), page).await?;
    Ok(ApiResponse::page("Fund history fetched", history))
}

pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<RequestsQuery>,
) -> ApiResult<ApiResponse<Vec<ExpenseRequestView>>> {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_PAGE_SIZE);
    let requests =
        expenses::list_requests(state.store.as_ref(), &auth.user, query.status, page).await?;
    Ok(ApiResponse::page("Expense requests fetched", requests))
}

/// ADMIN: records a verification. SUPER_ADMIN: final approval once the
/// configured number of verifications is reached.
pub async fn approve_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<FundTransaction>> {
    let outcome = expenses::approve(
        state.store.as_ref(),
        &auth.user,
        id,
        state.config.workflow.expense_min_verifications,
    )
    .await?;

    let response = match outcome {
        ApprovalOutcome::Verified(Verification {
            request,
            recorded: true,
        }) => ApiResponse::ok("Expense request verified", request),
        ApprovalOutcome::Verified(Verification {
            request,
            recorded: false,
        }) => ApiResponse::ok("You have already verified this request", request),
        ApprovalOutcome::Approved(request) => ApiResponse::ok("Expense request approved", request),
    };

    Ok(response.invalidates(&[CacheTag::Fund]))
}

pub async fn reject_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<RejectRequest>,
) -> ApiResult<ApiResponse<FundTransaction>> {
    let reason = req.reason.unwrap_or_default();
    let rejected = expenses::reject(state.store.as_ref(), &auth.user, id, &reason).await?;
    Ok(ApiResponse::ok("Expense request rejected", rejected).invalidates(&[CacheTag::Fund]))
}
