//! Persistence contract
//!
//! Services talk to storage only through the [`Store`] trait. Two adapters
//! implement it:
//!
//! - [`PgStore`]: PostgreSQL, delegating to the queries in [`crate::models`]
//! - [`MemoryStore`]: in-process state for tests and local development
//!
//! Both adapters give the same guarantees: conditional transitions are
//! compare-and-swap (a `None` result means the guard failed), settlement is
//! atomic, and uniqueness or reference violations surface as
//! [`StoreError::Conflict`] with the same messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::fund::{CreateFundTransaction, FundFilter, FundSummary, FundTransaction};
use crate::models::notice::{CreateNotice, Notice, UpdateNotice};
use crate::models::payment::{
    CreatePayment, MonthlyTotal, Payment, PaymentFilter, PaymentStatus, Settlement,
};
use crate::models::project::{
    CreateProject, Project, ProjectFilter, ProjectMember, ProjectMemberDetail, StatusCount,
    UpdateProject,
};
use crate::models::user::{AccessUpdate, CreateUser, ProfileUpdate, User, UserFilter};
use crate::pagination::{Page, PageRequest};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const EMAIL_TAKEN: &str = "Email is already registered";
pub const TRANSACTION_ID_TAKEN: &str = "Transaction id already exists";
pub const PAYMENT_ALREADY_POSTED: &str = "Payment is already recorded in the ledger";
pub const ALREADY_PROJECT_MEMBER: &str = "User is already a member of this project";
pub const STILL_REFERENCED: &str = "Record is still referenced by payments or ledger entries";
pub const MISSING_REFERENCE: &str = "Referenced record does not exist";

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage-layer errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness or reference rule was violated
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let message = match db.constraint() {
                    Some("users_email_key") => EMAIL_TAKEN,
                    Some("payments_transaction_id_key") => TRANSACTION_ID_TAKEN,
                    Some("fund_transactions_payment_id_key") => PAYMENT_ALREADY_POSTED,
                    Some("project_members_pkey") => ALREADY_PROJECT_MEMBER,
                    _ => "Record already exists",
                };
                return StoreError::Conflict(message.to_string());
            }

            if db.is_foreign_key_violation() {
                let message = if db.message().starts_with("update or delete") {
                    STILL_REFERENCED
                } else {
                    MISSING_REFERENCE
                };
                return StoreError::Conflict(message.to_string());
            }
        }

        StoreError::Database(err)
    }
}

/// Accounts and revoked tokens
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`EMAIL_TAKEN`] if the lowercased email exists
    async fn create_user(&self, data: CreateUser) -> StoreResult<User>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn record_login(&self, id: Uuid) -> StoreResult<()>;

    async fn update_profile(&self, id: Uuid, data: ProfileUpdate) -> StoreResult<Option<User>>;

    async fn update_access(&self, id: Uuid, data: AccessUpdate) -> StoreResult<Option<User>>;

    /// Fails with [`STILL_REFERENCED`] while payments or ledger rows point at the user
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> StoreResult<Page<User>>;

    async fn revoke_token(&self, fingerprint: &str, expires_at: DateTime<Utc>) -> StoreResult<()>;

    async fn is_token_revoked(&self, fingerprint: &str) -> StoreResult<bool>;
}

/// Payment records
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(&self, data: CreatePayment) -> StoreResult<Payment>;

    async fn find_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;

    async fn find_payment_by_transaction(&self, transaction_id: &str)
        -> StoreResult<Option<Payment>>;

    /// INITIATED to PENDING
    async fn mark_payment_pending(
        &self,
        id: Uuid,
        session_key: Option<String>,
    ) -> StoreResult<Option<Payment>>;

    /// Atomically moves a payment in `from` to PAID, posts its income and
    /// promotes the payer for membership fees
    async fn settle_payment(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        validation_id: Option<String>,
    ) -> StoreResult<Option<Settlement>>;

    /// Moves a payment in `from` to FAILED or CANCELLED
    async fn close_payment(
        &self,
        id: Uuid,
        to: PaymentStatus,
        from: &[PaymentStatus],
    ) -> StoreResult<Option<Payment>>;

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Payment>>;

    async fn total_paid(&self, user_id: Option<Uuid>) -> StoreResult<i64>;

    async fn monthly_paid(&self, since: DateTime<Utc>) -> StoreResult<Vec<MonthlyTotal>>;
}

/// Ledger entries and expense transitions
#[async_trait]
pub trait FundStore: Send + Sync {
    async fn create_fund_transaction(
        &self,
        data: CreateFundTransaction,
    ) -> StoreResult<FundTransaction>;

    async fn find_fund_transaction(&self, id: Uuid) -> StoreResult<Option<FundTransaction>>;

    /// Appends a verifier to a pending expense they have not verified yet
    async fn record_verification(
        &self,
        id: Uuid,
        admin_id: Uuid,
    ) -> StoreResult<Option<FundTransaction>>;

    /// PENDING to APPROVED when at least `min_verifications` are recorded
    async fn approve_expense(
        &self,
        id: Uuid,
        approver_id: Uuid,
        min_verifications: u32,
    ) -> StoreResult<Option<FundTransaction>>;

    /// PENDING to REJECTED
    async fn reject_expense(
        &self,
        id: Uuid,
        approver_id: Uuid,
        reason: &str,
    ) -> StoreResult<Option<FundTransaction>>;

    async fn fund_summary(&self) -> StoreResult<FundSummary>;

    async fn list_fund_transactions(
        &self,
        filter: FundFilter,
        page: PageRequest,
    ) -> StoreResult<Page<FundTransaction>>;
}

/// Projects and their members
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, data: CreateProject) -> StoreResult<Project>;

    async fn find_project(&self, id: Uuid) -> StoreResult<Option<Project>>;

    async fn update_project(&self, id: Uuid, data: UpdateProject) -> StoreResult<Option<Project>>;

    async fn delete_project(&self, id: Uuid) -> StoreResult<bool>;

    async fn list_projects(
        &self,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Project>>;

    async fn count_projects_by_status(&self) -> StoreResult<Vec<StatusCount>>;

    /// Fails with [`ALREADY_PROJECT_MEMBER`] on a duplicate
    async fn add_project_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> StoreResult<ProjectMember>;

    async fn list_project_members(&self, project_id: Uuid)
        -> StoreResult<Vec<ProjectMemberDetail>>;

    async fn remove_project_member(&self, project_id: Uuid, user_id: Uuid) -> StoreResult<bool>;
}

/// Notices
#[async_trait]
pub trait NoticeStore: Send + Sync {
    async fn create_notice(&self, data: CreateNotice) -> StoreResult<Notice>;

    async fn find_notice(&self, id: Uuid) -> StoreResult<Option<Notice>>;

    async fn update_notice(&self, id: Uuid, data: UpdateNotice) -> StoreResult<Option<Notice>>;

    async fn delete_notice(&self, id: Uuid) -> StoreResult<bool>;

    async fn list_notices(&self, page: PageRequest) -> StoreResult<Page<Notice>>;
}

/// Everything the services need from storage
#[async_trait]
pub trait Store: UserStore + PaymentStore + FundStore + ProjectStore + NoticeStore {
    /// Checks the backend is reachable
    async fn ping(&self) -> StoreResult<()>;
}
