//! Fund ledger: manual entries, derived summary, history

use serde::Deserialize;
use tracing::info;

use super::error::{ServiceError, ServiceResult};
use crate::auth::authorization::require_admin;
use crate::models::fund::{
    CreateFundTransaction, FundFilter, FundKind, FundSummary, FundTransaction, MAX_AMOUNT,
};
use crate::models::user::User;
use crate::pagination::{Page, PageRequest};
use crate::store::Store;

/// Input for a manual ledger entry
#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    #[serde(rename = "type")]
    pub kind: FundKind,
    pub amount: i64,
    pub reason: String,
}

/// Accepts 1 ..= [`MAX_AMOUNT`] BDT
pub(crate) fn check_amount(amount: i64) -> ServiceResult<()> {
    if amount <= 0 {
        return Err(ServiceError::Validation(
            "Amount must be a positive number".to_string(),
        ));
    }
    if amount > MAX_AMOUNT {
        return Err(ServiceError::Validation(format!(
            "Amount cannot exceed {} BDT",
            MAX_AMOUNT
        )));
    }
    Ok(())
}

/// Records an INCOME entry (settled immediately) or an EXPENSE request
/// (PENDING until a super admin approves it)
///
/// # Errors
///
/// - `Forbidden` below ADMIN
/// - `Validation` for an amount outside 1 ..= [`MAX_AMOUNT`] or a blank reason
pub async fn add_transaction(
    store: &dyn Store,
    actor: &User,
    input: NewTransaction,
) -> ServiceResult<FundTransaction> {
    require_admin(actor)?;
    check_amount(input.amount)?;

    let reason = input.reason.trim();
    if reason.is_empty() {
        return Err(ServiceError::Validation("Reason is required".to_string()));
    }

    let entry = store
        .create_fund_transaction(CreateFundTransaction {
            kind: input.kind,
            amount: input.amount,
            reason: reason.to_string(),
            requester_id: actor.id,
            payment_id: None,
        })
        .await?;

    info!(
        entry_id = %entry.id,
        kind = entry.kind.as_str(),
        status = entry.status.as_str(),
        amount = entry.amount,
        requester = %actor.id,
        "Ledger entry recorded"
    );

    Ok(entry)
}

pub async fn summary(store: &dyn Store) -> ServiceResult<FundSummary> {
    Ok(store.fund_summary().await?)
}

/// Every entry, pending and rejected ones included, newest first
pub async fn history(store: &dyn Store, page: PageRequest) -> ServiceResult<Page<FundTransaction>> {
    Ok(store
        .list_fund_transactions(FundFilter::default(), page)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fund::FundStatus;
    use crate::models::user::{CreateUser, UserRole, UserStatus};
    use crate::store::{MemoryStore, UserStore};

    async fn user(store: &MemoryStore, role: UserRole) -> User {
        store
            .create_user(CreateUser {
                name: format!("{} user", role.as_str()),
                email: format!("{}@example.com", uuid::Uuid::new_v4()),
                phone: None,
                address: None,
                password_hash: "hash".to_string(),
                role,
                status: UserStatus::Active,
            })
            .await
            .unwrap()
    }

    fn entry(kind: FundKind, amount: i64, reason: &str) -> NewTransaction {
        NewTransaction {
            kind,
            amount,
            reason: reason.to_string(),
        }
    }

    #[tokio::test]
    async fn test_income_counts_and_expense_waits() {
        let store = MemoryStore::new();
        let admin = user(&store, UserRole::Admin).await;

        let income = add_transaction(&store, &admin, entry(FundKind::Income, 5000, "Zakat"))
            .await
            .unwrap();
        let expense = add_transaction(&store, &admin, entry(FundKind::Expense, 1200, "Seeds"))
            .await
            .unwrap();

        assert_eq!(income.status, FundStatus::Approved);
        assert_eq!(expense.status, FundStatus::Pending);

        let totals = summary(&store).await.unwrap();
        assert_eq!(totals.total_income, 5000);
        assert_eq!(totals.total_expense, 0);
        assert_eq!(totals.current_balance, 5000);

        let page = history(&store, PageRequest::default()).await.unwrap();
        assert_eq!(page.meta.total, 2);
        assert_eq!(page.items[0].id, expense.id);
    }

    #[tokio::test]
    async fn test_member_cannot_post() {
        let store = MemoryStore::new();
        let member = user(&store, UserRole::Member).await;

        let err = add_transaction(&store, &member, entry(FundKind::Income, 10, "Gift"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_rejects_bad_amount_and_blank_reason() {
        let store = MemoryStore::new();
        let admin = user(&store, UserRole::SuperAdmin).await;

        let err = add_transaction(&store, &admin, entry(FundKind::Income, 0, "Gift"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = add_transaction(&store, &admin, entry(FundKind::Expense, 50, "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        assert_eq!(summary(&store).await.unwrap(), FundSummary::default());
    }

    #[tokio::test]
    async fn test_amount_is_capped() {
        let store = MemoryStore::new();
        let admin = user(&store, UserRole::Admin).await;

        for amount in [MAX_AMOUNT + 1, i64::MAX] {
            let err = add_transaction(&store, &admin, entry(FundKind::Income, amount, "Gift"))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("cannot exceed")));
        }

        add_transaction(&store, &admin, entry(FundKind::Income, MAX_AMOUNT, "Waqf"))
            .await
            .unwrap();
        add_transaction(&store, &admin, entry(FundKind::Income, MAX_AMOUNT, "Waqf"))
            .await
            .unwrap();

        let totals = summary(&store).await.unwrap();
        assert_eq!(totals.total_income, 2 * MAX_AMOUNT);
        assert_eq!(totals.current_balance, 2 * MAX_AMOUNT);
    }
}
