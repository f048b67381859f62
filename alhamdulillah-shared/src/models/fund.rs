//! Fund ledger rows and expense-request transitions
//!
//! Every row is a ledger entry. `INCOME` rows are created `APPROVED` and
//! count immediately. `EXPENSE` rows start `PENDING` and only count once a
//! super administrator approves them. Rows are never deleted.
//!
//! Expense transitions are compare-and-swap updates guarded by
//! `status = 'PENDING'`; a `None` result means the guard did not hold.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE fund_transactions (
//!     id UUID PRIMARY KEY,
//!     kind fund_kind NOT NULL,
//!     amount BIGINT NOT NULL CHECK (amount > 0),
//!     reason TEXT NOT NULL,
//!     requester_id UUID NOT NULL REFERENCES users (id) ON DELETE RESTRICT,
//!     status fund_status NOT NULL,
//!     approvals UUID[] NOT NULL DEFAULT '{}',
//!     rejection_reason TEXT,
//!     resolved_by UUID REFERENCES users (id),
//!     resolved_at TIMESTAMPTZ,
//!     payment_id UUID UNIQUE REFERENCES payments (id),
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::pagination::{Page, PageRequest};

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fund_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundKind {
    Income,
    Expense,
}

impl FundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundKind::Income => "INCOME",
            FundKind::Expense => "EXPENSE",
        }
    }

    /// Status a newly recorded entry of this kind starts in
    pub fn initial_status(&self) -> FundStatus {
        match self {
            FundKind::Income => FundStatus::Approved,
            FundKind::Expense => FundStatus::Pending,
        }
    }
}

/// Settlement status of a ledger entry
///
/// ```text
/// PENDING ──► APPROVED
///    │
///    └──────► REJECTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fund_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundStatus {
    Pending,
    Approved,
    Rejected,
}

impl FundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundStatus::Pending => "PENDING",
            FundStatus::Approved => "APPROVED",
            FundStatus::Rejected => "REJECTED",
        }
    }
}

/// A ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FundTransaction {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub kind: FundKind,

    /// Whole BDT, always positive
    pub amount: i64,

    pub reason: String,

    /// Creator of the entry (payer for settled payments)
    pub requester_id: Uuid,

    pub status: FundStatus,

    /// Administrators who verified this expense, in order, without duplicates
    pub approvals: Vec<Uuid>,

    pub rejection_reason: Option<String>,

    /// Super administrator who approved or rejected the expense
    pub resolved_by: Option<Uuid>,

    pub resolved_at: Option<DateTime<Utc>>,

    /// Set when the entry was posted by a payment settlement
    pub payment_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl FundTransaction {
    /// Whether this entry contributes to the balance
    pub fn is_settled(&self) -> bool {
        self.status == FundStatus::Approved
    }
}

/// Largest amount, in BDT, a single payment or ledger entry may carry
///
/// Matches the `CHECK` constraints on `payments.amount` and
/// `fund_transactions.amount`.
pub const MAX_AMOUNT: i64 = 1_000_000_000;

/// Input for recording a ledger entry
#[derive(Debug, Clone)]
pub struct CreateFundTransaction {
    pub kind: FundKind,
    pub amount: i64,
    pub reason: String,
    pub requester_id: Uuid,
    pub payment_id: Option<Uuid>,
}

/// Totals derived from the ledger, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundSummary {
    pub total_income: i64,
    pub total_expense: i64,
    pub current_balance: i64,
}

impl FundSummary {
    pub fn from_totals(total_income: i64, total_expense: i64) -> Self {
        Self {
            total_income,
            total_expense,
            current_balance: total_income.saturating_sub(total_expense),
        }
    }

    /// Folds settled entries into a summary
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a FundTransaction>) -> Self {
        let (income, expense) = entries
            .into_iter()
            .filter(|entry| entry.is_settled())
            .fold((0i64, 0i64), |(income, expense), entry| match entry.kind {
                FundKind::Income => (income.saturating_add(entry.amount), expense),
                FundKind::Expense => (income, expense.saturating_add(entry.amount)),
            });
        Self::from_totals(income, expense)
    }
}

/// Filters for ledger listings
#[derive(Debug, Clone, Copy, Default)]
pub struct FundFilter {
    pub kind: Option<FundKind>,
    pub status: Option<FundStatus>,
}

impl FundFilter {
    /// Expense requests, optionally narrowed to one status
    pub fn expense_requests(status: Option<FundStatus>) -> Self {
        Self {
            kind: Some(FundKind::Expense),
            status,
        }
    }

    pub fn matches(&self, entry: &FundTransaction) -> bool {
        self.kind.map_or(true, |kind| entry.kind == kind)
            && self.status.map_or(true, |status| entry.status == status)
    }
}

impl FundTransaction {
    /// Inserts a ledger entry on any executor, so settlement can post
    /// inside its own transaction
    pub async fn insert<'e, E>(executor: E, data: CreateFundTransaction) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, FundTransaction>(
            r#"
            INSERT INTO fund_transactions (id, kind, amount, reason, requester_id, status, payment_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.kind)
        .bind(data.amount)
        .bind(&data.reason)
        .bind(data.requester_id)
        .bind(data.kind.initial_status())
        .bind(data.payment_id)
        .fetch_one(executor)
        .await
    }

    pub async fn create(pool: &PgPool, data: CreateFundTransaction) -> Result<Self, sqlx::Error> {
        Self::insert(pool, data).await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FundTransaction>("SELECT * FROM fund_transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Appends `admin_id` to the approvals of a pending expense
    ///
    /// Returns `None` if the row is not a pending expense or the admin
    /// already verified it.
    pub async fn record_verification(
        pool: &PgPool,
        id: Uuid,
        admin_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FundTransaction>(
            r#"
            UPDATE fund_transactions
            SET approvals = array_append(approvals, $2), updated_at = NOW()
            WHERE id = $1
              AND kind = 'EXPENSE'
              AND status = 'PENDING'
              AND NOT ($2 = ANY(approvals))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(admin_id)
        .fetch_optional(pool)
        .await
    }

    /// Transitions a pending expense with enough verifications to APPROVED
    pub async fn approve_expense(
        pool: &PgPool,
        id: Uuid,
        approver_id: Uuid,
        min_verifications: u32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FundTransaction>(
            r#"
            UPDATE fund_transactions
            SET status = 'APPROVED', resolved_by = $2, resolved_at = NOW(), updated_at = NOW()
            WHERE id = $1
              AND kind = 'EXPENSE'
              AND status = 'PENDING'
              AND cardinality(approvals) >= $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(approver_id)
        .bind(min_verifications as i32)
        .fetch_optional(pool)
        .await
    }

    /// Transitions a pending expense to REJECTED with a reason
    pub async fn reject_expense(
        pool: &PgPool,
        id: Uuid,
        approver_id: Uuid,
        reason: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FundTransaction>(
            r#"
            UPDATE fund_transactions
            SET status = 'REJECTED', rejection_reason = $3, resolved_by = $2,
                resolved_at = NOW(), updated_at = NOW()
            WHERE id = $1
              AND kind = 'EXPENSE'
              AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(approver_id)
        .bind(reason)
        .fetch_optional(pool)
        .await
    }

    /// Sums settled entries
    pub async fn summary(pool: &PgPool) -> Result<FundSummary, sqlx::Error> {
        let (income, expense): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(amount) FILTER (WHERE kind = 'INCOME' AND status = 'APPROVED'), 0)::BIGINT,
                COALESCE(SUM(amount) FILTER (WHERE kind = 'EXPENSE' AND status = 'APPROVED'), 0)::BIGINT
            FROM fund_transactions
            "#,
        )
        .fetch_one(pool)
        .await?;

        Ok(FundSummary::from_totals(income, expense))
    }

    /// Lists entries newest first
    pub async fn list(
        pool: &PgPool,
        filter: FundFilter,
        page: PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        const WHERE: &str = r#"
            WHERE ($1::fund_kind IS NULL OR kind = $1)
              AND ($2::fund_status IS NULL OR status = $2)
        "#;

        let entries = sqlx::query_as::<_, FundTransaction>(&format!(
            "SELECT * FROM fund_transactions {WHERE} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.kind)
        .bind(filter.status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM fund_transactions {WHERE}"))
                .bind(filter.kind)
                .bind(filter.status)
                .fetch_one(pool)
                .await?;

        Ok(Page::new(entries, page, total.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: FundKind, status: FundStatus, amount: i64) -> FundTransaction {
        FundTransaction {
            id: Uuid::new_v4(),
            kind,
            amount,
            reason: "test".to_string(),
            requester_id: Uuid::new_v4(),
            status,
            approvals: vec![],
            rejection_reason: None,
            resolved_by: None,
            resolved_at: None,
            payment_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_initial_status_by_kind() {
        assert_eq!(FundKind::Income.initial_status(), FundStatus::Approved);
        assert_eq!(FundKind::Expense.initial_status(), FundStatus::Pending);
    }

    #[test]
    fn test_summary_saturates_instead_of_overflowing() {
        let entries = vec![
            entry(FundKind::Income, FundStatus::Approved, i64::MAX),
            entry(FundKind::Income, FundStatus::Approved, i64::MAX),
            entry(FundKind::Expense, FundStatus::Approved, 5),
        ];

        let summary = FundSummary::from_entries(&entries);
        assert_eq!(summary.total_income, i64::MAX);
        assert_eq!(summary.total_expense, 5);
        assert_eq!(summary.current_balance, i64::MAX - 5);

        assert_eq!(FundSummary::from_totals(i64::MIN, 1).current_balance, i64::MIN);
    }

    #[test]
    fn test_summary_ignores_pending_and_rejected_expenses() {
        let entries = vec![
            entry(FundKind::Income, FundStatus::Approved, 5000),
            entry(FundKind::Income, FundStatus::Approved, 1000),
            entry(FundKind::Expense, FundStatus::Approved, 1500),
            entry(FundKind::Expense, FundStatus::Pending, 700),
            entry(FundKind::Expense, FundStatus::Rejected, 300),
        ];

        let summary = FundSummary::from_entries(&entries);
        assert_eq!(summary.total_income, 6000);
        assert_eq!(summary.total_expense, 1500);
        assert_eq!(summary.current_balance, 4500);
    }

    #[test]
    fn test_kind_serializes_as_type() {
        let json = serde_json::to_value(entry(FundKind::Expense, FundStatus::Pending, 10)).unwrap();
        assert_eq!(json["type"], "EXPENSE");
        assert_eq!(json["status"], "PENDING");
        assert!(json["approvals"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_filter_matches() {
        let pending = entry(FundKind::Expense, FundStatus::Pending, 10);
        let income = entry(FundKind::Income, FundStatus::Approved, 10);

        let requests = FundFilter::expense_requests(None);
        assert!(requests.matches(&pending));
        assert!(!requests.matches(&income));

        let approved = FundFilter::expense_requests(Some(FundStatus::Approved));
        assert!(!approved.matches(&pending));
    }
}
