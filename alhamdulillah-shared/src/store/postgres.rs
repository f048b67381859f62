//! PostgreSQL adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    FundStore, NoticeStore, PaymentStore, ProjectStore, Store, StoreResult, UserStore,
};
use crate::db::pool::health_check;
use crate::models::fund::{CreateFundTransaction, FundFilter, FundSummary, FundTransaction};
use crate::models::notice::{CreateNotice, Notice, UpdateNotice};
use crate::models::payment::{
    CreatePayment, MonthlyTotal, Payment, PaymentFilter, PaymentStatus, Settlement,
};
use crate::models::project::{
    CreateProject, Project, ProjectFilter, ProjectMember, ProjectMemberDetail, StatusCount,
    UpdateProject,
};
use crate::models::session::RevokedToken;
use crate::models::user::{AccessUpdate, CreateUser, ProfileUpdate, User, UserFilter};
use crate::pagination::{Page, PageRequest};

/// [`Store`] backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, data: CreateUser) -> StoreResult<User> {
        Ok(User::create(&self.pool, data).await?)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn record_login(&self, id: Uuid) -> StoreResult<()> {
        Ok(User::update_last_login(&self.pool, id).await?)
    }

    async fn update_profile(&self, id: Uuid, data: ProfileUpdate) -> StoreResult<Option<User>> {
        Ok(User::update_profile(&self.pool, id, data).await?)
    }

    async fn update_access(&self, id: Uuid, data: AccessUpdate) -> StoreResult<Option<User>> {
        Ok(User::update_access(&self.pool, id, data).await?)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        Ok(User::delete(&self.pool, id).await?)
    }

    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> StoreResult<Page<User>> {
        Ok(User::list(&self.pool, filter, page).await?)
    }

    async fn revoke_token(&self, fingerprint: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        Ok(RevokedToken::revoke(&self.pool, fingerprint, expires_at).await?)
    }

    async fn is_token_revoked(&self, fingerprint: &str) -> StoreResult<bool> {
        Ok(RevokedToken::is_revoked(&self.pool, fingerprint).await?)
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn create_payment(&self, data: CreatePayment) -> StoreResult<Payment> {
        Ok(Payment::create(&self.pool, data).await?)
    }

    async fn find_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(Payment::find_by_id(&self.pool, id).await?)
    }

    async fn find_payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<Payment>> {
        Ok(Payment::find_by_transaction_id(&self.pool, transaction_id).await?)
    }

    async fn mark_payment_pending(
        &self,
        id: Uuid,
        session_key: Option<String>,
    ) -> StoreResult<Option<Payment>> {
        Ok(Payment::mark_pending(&self.pool, id, session_key).await?)
    }

    async fn settle_payment(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        validation_id: Option<String>,
    ) -> StoreResult<Option<Settlement>> {
        Ok(Payment::settle(&self.pool, id, from, validation_id).await?)
    }

    async fn close_payment(
        &self,
        id: Uuid,
        to: PaymentStatus,
        from: &[PaymentStatus],
    ) -> StoreResult<Option<Payment>> {
        Ok(Payment::close(&self.pool, id, to, from).await?)
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Payment>> {
        Ok(Payment::list(&self.pool, filter, page).await?)
    }

    async fn total_paid(&self, user_id: Option<Uuid>) -> StoreResult<i64> {
        Ok(Payment::total_paid(&self.pool, user_id).await?)
    }

    async fn monthly_paid(&self, since: DateTime<Utc>) -> StoreResult<Vec<MonthlyTotal>> {
        Ok(Payment::monthly_totals(&self.pool, since).await?)
    }
}

#[async_trait]
impl FundStore for PgStore {
    async fn create_fund_transaction(
        &self,
        data: CreateFundTransaction,
    ) -> StoreResult<FundTransaction> {
        Ok(FundTransaction::create(&self.pool, data).await?)
    }

    async fn find_fund_transaction(&self, id: Uuid) -> StoreResult<Option<FundTransaction>> {
        Ok(FundTransaction::find_by_id(&self.pool, id).await?)
    }

    async fn record_verification(
        &self,
        id: Uuid,
        admin_id: Uuid,
    ) -> StoreResult<Option<FundTransaction>> {
        Ok(FundTransaction::record_verification(&self.pool, id, admin_id).await?)
    }

    async fn approve_expense(
        &self,
        id: Uuid,
        approver_id: Uuid,
        min_verifications: u32,
    ) -> StoreResult<Option<FundTransaction>> {
        Ok(FundTransaction::approve_expense(&self.pool, id, approver_id, min_verifications).await?)
    }

    async fn reject_expense(
        &self,
        id: Uuid,
        approver_id: Uuid,
        reason: &str,
    ) -> StoreResult<Option<FundTransaction>> {
        Ok(FundTransaction::reject_expense(&self.pool, id, approver_id, reason).await?)
    }

    async fn fund_summary(&self) -> StoreResult<FundSummary> {
        Ok(FundTransaction::summary(&self.pool).await?)
    }

    async fn list_fund_transactions(
        &self,
        filter: FundFilter,
        page: PageRequest,
    ) -> StoreResult<Page<FundTransaction>> {
        Ok(FundTransaction::list(&self.pool, filter, page).await?)
    }
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn create_project(&self, data: CreateProject) -> StoreResult<Project> {
        Ok(Project::create(&self.pool, data).await?)
    }

    async fn find_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        Ok(Project::find_by_id(&self.pool, id).await?)
    }

    async fn update_project(&self, id: Uuid, data: UpdateProject) -> StoreResult<Option<Project>> {
        Ok(Project::update(&self.pool, id, data).await?)
    }

    async fn delete_project(&self, id: Uuid) -> StoreResult<bool> {
        Ok(Project::delete(&self.pool, id).await?)
    }

    async fn list_projects(
        &self,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Project>> {
        Ok(Project::list(&self.pool, filter, page).await?)
    }

    async fn count_projects_by_status(&self) -> StoreResult<Vec<StatusCount>> {
        Ok(Project::count_by_status(&self.pool).await?)
    }

    async fn add_project_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> StoreResult<ProjectMember> {
        Ok(ProjectMember::add(&self.pool, project_id, user_id, role).await?)
    }

    async fn list_project_members(
        &self,
        project_id: Uuid,
    ) -> StoreResult<Vec<ProjectMemberDetail>> {
        Ok(ProjectMember::list_for_project(&self.pool, project_id).await?)
    }

    async fn remove_project_member(&self, project_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        Ok(ProjectMember::remove(&self.pool, project_id, user_id).await?)
    }
}

#[async_trait]
impl NoticeStore for PgStore {
    async fn create_notice(&self, data: CreateNotice) -> StoreResult<Notice> {
        Ok(Notice::create(&self.pool, data).await?)
    }

    async fn find_notice(&self, id: Uuid) -> StoreResult<Option<Notice>> {
        Ok(Notice::find_by_id(&self.pool, id).await?)
    }

    async fn update_notice(&self, id: Uuid, data: UpdateNotice) -> StoreResult<Option<Notice>> {
        Ok(Notice::update(&self.pool, id, data).await?)
    }

    async fn delete_notice(&self, id: Uuid) -> StoreResult<bool> {
        Ok(Notice::delete(&self.pool, id).await?)
    }

    async fn list_notices(&self, page: PageRequest) -> StoreResult<Page<Notice>> {
        Ok(Notice::list(&self.pool, page).await?)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(health_check(&self.pool).await?)
    }
}
