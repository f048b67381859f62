//! Expense approval workflow
//!
//! ```text
//! PENDING ──verify (ADMIN, repeatable)──► PENDING
//! PENDING ──final_approve (SUPER_ADMIN)──► APPROVED
//! PENDING ──reject (SUPER_ADMIN)─────────► REJECTED
//! ```
//!
//! Each store call is a compare-and-swap on `status = 'PENDING'`. When it
//! reports no change, the request is re-read to tell the caller why.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{ServiceError, ServiceResult};
use crate::auth::authorization::{require_admin, require_any_role, require_super_admin};
use crate::models::fund::{FundFilter, FundKind, FundStatus, FundTransaction};
use crate::models::user::{User, UserRole, UserSummary};
use crate::pagination::{Page, PageRequest};
use crate::store::Store;

/// Result of an administrator's verification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub request: FundTransaction,

    /// False when this administrator had already verified the request
    pub recorded: bool,
}

/// What the role-dispatched approve endpoint did
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    Verified(Verification),
    Approved(FundTransaction),
}

/// An expense request with the people involved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRequestView {
    #[serde(flatten)]
    pub request: FundTransaction,
    pub requester: Option<UserSummary>,
    pub verified_by: Vec<UserSummary>,
}

async fn load_expense(store: &dyn Store, id: Uuid) -> ServiceResult<FundTransaction> {
    store
        .find_fund_transaction(id)
        .await?
        .filter(|entry| entry.kind == FundKind::Expense)
        .ok_or(ServiceError::NotFound("Expense request"))
}

fn ensure_pending(request: &FundTransaction) -> ServiceResult<()> {
    if request.status == FundStatus::Pending {
        Ok(())
    } else {
        Err(ServiceError::StateConflict(format!(
            "Expense request is already {}",
            request.status.as_str()
        )))
    }
}

/// Explains why a guarded transition did not apply
async fn lost_transition(store: &dyn Store, id: Uuid) -> ServiceError {
    match load_expense(store, id).await {
        Ok(request) => match ensure_pending(&request) {
            Err(conflict) => conflict,
            Ok(()) => ServiceError::StateConflict("Expense request changed concurrently".into()),
        },
        Err(e) => e,
    }
}

/// Adds the administrator's verification to a pending request
///
/// Verifying twice is a no-op that returns the request unchanged with
/// `recorded = false`.
pub async fn verify(store: &dyn Store, actor: &User, id: Uuid) -> ServiceResult<Verification> {
    require_any_role(actor, &[UserRole::Admin])?;

    let request = load_expense(store, id).await?;
    ensure_pending(&request)?;

    if request.approvals.contains(&actor.id) {
        return Ok(Verification {
            request,
            recorded: false,
        });
    }

    match store.record_verification(id, actor.id).await? {
        Some(request) => {
            info!(
                request_id = %id,
                admin_id = %actor.id,
                verifications = request.approvals.len(),
                "Expense request verified"
            );
            Ok(Verification {
                request,
                recorded: true,
            })
        }
        None => {
            // lost a race; either the same admin verified concurrently or
            // the request left PENDING
            let request = load_expense(store, id).await?;
            ensure_pending(&request)?;
            Ok(Verification {
                recorded: false,
                request,
            })
        }
    }
}

/// Approves a pending request once it has `min_verifications` verifications
///
/// # Errors
///
/// - `Forbidden` unless SUPER_ADMIN
/// - `QuorumNotMet` below the verification quorum
/// - `StateConflict` if the request is no longer PENDING, including when a
///   concurrent approval won
pub async fn final_approve(
    store: &dyn Store,
    actor: &User,
    id: Uuid,
    min_verifications: u32,
) -> ServiceResult<FundTransaction> {
    require_super_admin(actor)?;

    let request = load_expense(store, id).await?;
    ensure_pending(&request)?;

    if request.approvals.len() < min_verifications as usize {
        return Err(ServiceError::QuorumNotMet {
            required: min_verifications,
            actual: request.approvals.len(),
        });
    }

    match store.approve_expense(id, actor.id, min_verifications).await? {
        Some(approved) => {
            info!(
                request_id = %id,
                approver_id = %actor.id,
                amount = approved.amount,
                "Expense request approved"
            );
            Ok(approved)
        }
        None => Err(lost_transition(store, id).await),
    }
}

/// Rejects a pending request with a reason
pub async fn reject(
    store: &dyn Store,
    actor: &User,
    id: Uuid,
    reason: &str,
) -> ServiceResult<FundTransaction> {
    require_super_admin(actor)?;

    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ServiceError::Validation(
            "A rejection reason is required".to_string(),
        ));
    }

    let request = load_expense(store, id).await?;
    ensure_pending(&request)?;

    match store.reject_expense(id, actor.id, reason).await? {
        Some(rejected) => {
            info!(request_id = %id, approver_id = %actor.id, "Expense request rejected");
            Ok(rejected)
        }
        None => Err(lost_transition(store, id).await),
    }
}

/// Single approve entry point: ADMIN verifies, SUPER_ADMIN gives final approval
pub async fn approve(
    store: &dyn Store,
    actor: &User,
    id: Uuid,
    min_verifications: u32,
) -> ServiceResult<ApprovalOutcome> {
    match actor.role {
        UserRole::Admin => verify(store, actor, id).await.map(ApprovalOutcome::Verified),
        UserRole::SuperAdmin => final_approve(store, actor, id, min_verifications)
            .await
            .map(ApprovalOutcome::Approved),
        role => {
            warn!(user_id = %actor.id, role = role.as_str(), "Expense approval refused");
            Err(ServiceError::Forbidden(
                "Only administrators can approve expense requests".to_string(),
            ))
        }
    }
}

/// Expense requests, optionally narrowed to one status, newest first
pub async fn list_requests(
    store: &dyn Store,
    actor: &User,
    status: Option<FundStatus>,
    page: PageRequest,
) -> ServiceResult<Page<ExpenseRequestView>> {
    require_admin(actor)?;

    let page = store
        .list_fund_transactions(FundFilter::expense_requests(status), page)
        .await?;

    let mut items = Vec::with_capacity(page.items.len());
    for request in page.items {
        let requester = store
            .find_user(request.requester_id)
            .await?
            .as_ref()
            .map(UserSummary::from);

        let mut verified_by = Vec::with_capacity(request.approvals.len());
        for admin_id in &request.approvals {
            if let Some(admin) = store.find_user(*admin_id).await? {
                verified_by.push(UserSummary::from(&admin));
            }
        }

        items.push(ExpenseRequestView {
            request,
            requester,
            verified_by,
        });
    }

    Ok(Page {
        items,
        meta: page.meta,
    })
}
