//! In-memory adapter
//!
//! Mirrors the PostgreSQL schema rules: unique emails, transaction ids and
//! ledger payment ids, restricted deletes, cascading project members, and
//! compare-and-swap transitions. A single lock guards all tables, so every
//! operation, settlement included, is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    FundStore, NoticeStore, PaymentStore, ProjectStore, Store, StoreError, StoreResult, UserStore,
    ALREADY_PROJECT_MEMBER, EMAIL_TAKEN, MISSING_REFERENCE, PAYMENT_ALREADY_POSTED,
    STILL_REFERENCED, TRANSACTION_ID_TAKEN,
};
use crate::models::fund::{
    CreateFundTransaction, FundFilter, FundKind, FundStatus, FundSummary, FundTransaction,
};
use crate::models::notice::{CreateNotice, Notice, UpdateNotice};
use crate::models::payment::{
    income_reason, CreatePayment, MonthlyTotal, Payment, PaymentFilter, PaymentPurpose,
    PaymentStatus, Settlement,
};
use crate::models::project::{
    CreateProject, Project, ProjectFilter, ProjectMember, ProjectMemberDetail, ProjectStatus,
    StatusCount, UpdateProject,
};
use crate::models::user::{
    AccessUpdate, CreateUser, ProfileUpdate, User, UserFilter, UserRole, UserStatus,
};
use crate::pagination::{Page, PageRequest};

/// Tables in insertion order
#[derive(Default)]
struct State {
    users: Vec<User>,
    revoked: Vec<(String, DateTime<Utc>)>,
    payments: Vec<Payment>,
    funds: Vec<FundTransaction>,
    projects: Vec<Project>,
    members: Vec<ProjectMember>,
    notices: Vec<Notice>,
}

impl State {
    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn user_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    fn payment_mut(&mut self, id: Uuid) -> Option<&mut Payment> {
        self.payments.iter_mut().find(|p| p.id == id)
    }

    fn pending_expense_mut(&mut self, id: Uuid) -> Option<&mut FundTransaction> {
        self.funds
            .iter_mut()
            .find(|f| f.id == id && f.kind == FundKind::Expense && f.status == FundStatus::Pending)
    }

    fn project_exists(&self, id: Uuid) -> bool {
        self.projects.iter().any(|p| p.id == id)
    }

    fn with_member_count(&self, mut project: Project) -> Project {
        project.member_count = self
            .members
            .iter()
            .filter(|m| m.project_id == project.id)
            .count() as i64;
        project
    }

    fn with_submitter(&self, mut notice: Notice) -> Notice {
        notice.submitter_name = notice
            .submitted_by
            .and_then(|id| self.user(id))
            .map(|u| u.name.clone());
        notice
    }

    fn insert_fund(&mut self, data: CreateFundTransaction) -> StoreResult<FundTransaction> {
        if self.user(data.requester_id).is_none() {
            return Err(StoreError::Conflict(MISSING_REFERENCE.to_string()));
        }
        if let Some(payment_id) = data.payment_id {
            if self.funds.iter().any(|f| f.payment_id == Some(payment_id)) {
                return Err(StoreError::Conflict(PAYMENT_ALREADY_POSTED.to_string()));
            }
        }

        let now = Utc::now();
        let entry = FundTransaction {
            id: Uuid::new_v4(),
            kind: data.kind,
            amount: data.amount,
            reason: data.reason,
            requester_id: data.requester_id,
            status: data.kind.initial_status(),
            approvals: Vec::new(),
            rejection_reason: None,
            resolved_by: None,
            resolved_at: None,
            payment_id: data.payment_id,
            created_at: now,
            updated_at: now,
        };
        self.funds.push(entry.clone());
        Ok(entry)
    }
}

/// [`Store`] kept entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

/// Newest-first view of a table
fn newest_first<T: Clone>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().rev().filter(|&row| keep(row)).cloned().collect()
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, data: CreateUser) -> StoreResult<User> {
        let mut state = self.state()?;
        let email = data.email.to_lowercase();

        if state.users.iter().any(|u| u.email == email) {
            return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: data.name,
            email,
            phone: data.phone,
            address: data.address,
            password_hash: data.password_hash,
            role: data.role,
            status: data.status,
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state()?.user(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self.state()?.users.iter().find(|u| u.email == email).cloned())
    }

    async fn record_login(&self, id: Uuid) -> StoreResult<()> {
        if let Some(user) = self.state()?.user_mut(id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, data: ProfileUpdate) -> StoreResult<Option<User>> {
        let mut state = self.state()?;
        let Some(user) = state.user_mut(id) else {
            return Ok(None);
        };

        if let Some(name) = data.name {
            user.name = name;
        }
        if data.phone.is_some() {
            user.phone = data.phone;
        }
        if data.address.is_some() {
            user.address = data.address;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn update_access(&self, id: Uuid, data: AccessUpdate) -> StoreResult<Option<User>> {
        let mut state = self.state()?;
        let Some(user) = state.user_mut(id) else {
            return Ok(None);
        };

        if let Some(role) = data.role {
            user.role = role;
        }
        if let Some(status) = data.status {
            user.status = status;
        }
        if let Some(permissions) = data.permissions {
            user.permissions = permissions;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state()?;

        let referenced = state.payments.iter().any(|p| p.user_id == id)
            || state
                .funds
                .iter()
                .any(|f| f.requester_id == id || f.resolved_by == Some(id));
        if referenced {
            return Err(StoreError::Conflict(STILL_REFERENCED.to_string()));
        }

        let before = state.users.len();
        state.users.retain(|u| u.id != id);
        if state.users.len() == before {
            return Ok(false);
        }

        state.members.retain(|m| m.user_id != id);
        for project in state.projects.iter_mut().filter(|p| p.created_by == Some(id)) {
            project.created_by = None;
        }
        for notice in state.notices.iter_mut().filter(|n| n.submitted_by == Some(id)) {
            notice.submitted_by = None;
        }
        Ok(true)
    }

    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> StoreResult<Page<User>> {
        let state = self.state()?;
        Ok(page.slice(newest_first(&state.users, |u| filter.matches(u))))
    }

    async fn revoke_token(&self, fingerprint: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state()?;
        if !state.revoked.iter().any(|(fp, _)| fp == fingerprint) {
            state.revoked.push((fingerprint.to_string(), expires_at));
        }
        let now = Utc::now();
        state.revoked.retain(|(_, expires)| *expires >= now);
        Ok(())
    }

    async fn is_token_revoked(&self, fingerprint: &str) -> StoreResult<bool> {
        Ok(self.state()?.revoked.iter().any(|(fp, _)| fp == fingerprint))
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create_payment(&self, data: CreatePayment) -> StoreResult<Payment> {
        let mut state = self.state()?;

        if state.user(data.user_id).is_none()
            || data.project_id.is_some_and(|id| !state.project_exists(id))
        {
            return Err(StoreError::Conflict(MISSING_REFERENCE.to_string()));
        }
        if state
            .payments
            .iter()
            .any(|p| p.transaction_id == data.transaction_id)
        {
            return Err(StoreError::Conflict(TRANSACTION_ID_TAKEN.to_string()));
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            project_id: data.project_id,
            amount: data.amount,
            method: data.method,
            purpose: data.purpose,
            payment_status: PaymentStatus::Initiated,
            transaction_id: data.transaction_id,
            gateway_session_key: None,
            validation_id: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        state.payments.push(payment.clone());
        Ok(payment)
    }

    async fn find_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.state()?.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn find_payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<Payment>> {
        Ok(self
            .state()?
            .payments
            .iter()
            .find(|p| p.transaction_id == transaction_id)
            .cloned())
    }

    async fn mark_payment_pending(
        &self,
        id: Uuid,
        session_key: Option<String>,
    ) -> StoreResult<Option<Payment>> {
        let mut state = self.state()?;
        let Some(payment) = state.payment_mut(id) else {
            return Ok(None);
        };
        if payment.payment_status != PaymentStatus::Initiated {
            return Ok(None);
        }

        payment.payment_status = PaymentStatus::Pending;
        payment.gateway_session_key = session_key;
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn settle_payment(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        validation_id: Option<String>,
    ) -> StoreResult<Option<Settlement>> {
        let mut state = self.state()?;

        let Some(current) = state.payments.iter().find(|p| p.id == id).cloned() else {
            return Ok(None);
        };
        if !from.contains(&current.payment_status) {
            return Ok(None);
        }

        let now = Utc::now();
        let mut payment = current;
        payment.payment_status = PaymentStatus::Paid;
        payment.paid_at = Some(now);
        payment.validation_id = validation_id.or(payment.validation_id);
        payment.updated_at = now;

        // ledger first: it is the only step that can fail
        let income = state.insert_fund(CreateFundTransaction {
            kind: FundKind::Income,
            amount: payment.amount,
            reason: income_reason(&payment),
            requester_id: payment.user_id,
            payment_id: Some(payment.id),
        })?;

        if let Some(stored) = state.payment_mut(id) {
            *stored = payment.clone();
        }

        let promoted = if payment.purpose == PaymentPurpose::MembershipFee {
            state
                .user_mut(payment.user_id)
                .filter(|u| u.role == UserRole::User)
                .map(|user| {
                    user.role = UserRole::Member;
                    if user.status == UserStatus::Pending {
                        user.status = UserStatus::Active;
                    }
                    user.updated_at = now;
                    user.clone()
                })
        } else {
            None
        };

        Ok(Some(Settlement {
            payment,
            income,
            promoted,
        }))
    }

    async fn close_payment(
        &self,
        id: Uuid,
        to: PaymentStatus,
        from: &[PaymentStatus],
    ) -> StoreResult<Option<Payment>> {
        let mut state = self.state()?;
        let Some(payment) = state.payment_mut(id) else {
            return Ok(None);
        };
        if !from.contains(&payment.payment_status) {
            return Ok(None);
        }

        payment.payment_status = to;
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Payment>> {
        let state = self.state()?;
        let mut payments = newest_first(&state.payments, |p| filter.matches(p));
        filter.sort(&mut payments);
        Ok(page.slice(payments))
    }

    async fn total_paid(&self, user_id: Option<Uuid>) -> StoreResult<i64> {
        Ok(self
            .state()?
            .payments
            .iter()
            .filter(|p| p.payment_status == PaymentStatus::Paid)
            .filter(|p| user_id.map_or(true, |id| p.user_id == id))
            .map(|p| p.amount)
            .sum())
    }

    async fn monthly_paid(&self, since: DateTime<Utc>) -> StoreResult<Vec<MonthlyTotal>> {
        let state = self.state()?;

        let mut months: Vec<((i32, u32), MonthlyTotal)> = Vec::new();
        for payment in &state.payments {
            let Some(paid_at) = payment.paid_at.filter(|at| *at >= since) else {
                continue;
            };
            let key = (paid_at.year(), paid_at.month());
            match months.iter_mut().find(|(k, _)| *k == key) {
                Some((_, total)) => total.amount += payment.amount,
                None => months.push((
                    key,
                    MonthlyTotal {
                        name: paid_at.format("%b %Y").to_string(),
                        amount: payment.amount,
                    },
                )),
            }
        }

        months.sort_by_key(|(key, _)| *key);
        Ok(months.into_iter().map(|(_, total)| total).collect())
    }
}

#[async_trait]
impl FundStore for MemoryStore {
    async fn create_fund_transaction(
        &self,
        data: CreateFundTransaction,
    ) -> StoreResult<FundTransaction> {
        self.state()?.insert_fund(data)
    }

    async fn find_fund_transaction(&self, id: Uuid) -> StoreResult<Option<FundTransaction>> {
        Ok(self.state()?.funds.iter().find(|f| f.id == id).cloned())
    }

    async fn record_verification(
        &self,
        id: Uuid,
        admin_id: Uuid,
    ) -> StoreResult<Option<FundTransaction>> {
        let mut state = self.state()?;
        let Some(entry) = state.pending_expense_mut(id) else {
            return Ok(None);
        };
        if entry.approvals.contains(&admin_id) {
            return Ok(None);
        }

        entry.approvals.push(admin_id);
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }

    async fn approve_expense(
        &self,
        id: Uuid,
        approver_id: Uuid,
        min_verifications: u32,
    ) -> StoreResult<Option<FundTransaction>> {
        let mut state = self.state()?;
        let Some(entry) = state.pending_expense_mut(id) else {
            return Ok(None);
        };
        if entry.approvals.len() < min_verifications as usize {
            return Ok(None);
        }

        let now = Utc::now();
        entry.status = FundStatus::Approved;
        entry.resolved_by = Some(approver_id);
        entry.resolved_at = Some(now);
        entry.updated_at = now;
        Ok(Some(entry.clone()))
    }

    async fn reject_expense(
        &self,
        id: Uuid,
        approver_id: Uuid,
        reason: &str,
    ) -> StoreResult<Option<FundTransaction>> {
        let mut state = self.state()?;
        let Some(entry) = state.pending_expense_mut(id) else {
            return Ok(None);
        };

        let now = Utc::now();
        entry.status = FundStatus::Rejected;
        entry.rejection_reason = Some(reason.to_string());
        entry.resolved_by = Some(approver_id);
        entry.resolved_at = Some(now);
        entry.updated_at = now;
        Ok(Some(entry.clone()))
    }

    async fn fund_summary(&self) -> StoreResult<FundSummary> {
        Ok(FundSummary::from_entries(self.state()?.funds.iter()))
    }

    async fn list_fund_transactions(
        &self,
        filter: FundFilter,
        page: PageRequest,
    ) -> StoreResult<Page<FundTransaction>> {
        let state = self.state()?;
        Ok(page.slice(newest_first(&state.funds, |f| filter.matches(f))))
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn create_project(&self, data: CreateProject) -> StoreResult<Project> {
        let mut state = self.state()?;
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            name: data.name,
            description: data.description,
            category: data.category,
            location: data.location,
            contact_number: data.contact_number,
            thumbnail: data.thumbnail,
            images: data.images,
            videos: data.videos,
            initial_investment: data.initial_investment,
            status: data.status,
            start_date: data.start_date,
            end_date: data.end_date,
            created_by: data.created_by,
            member_count: 0,
            created_at: now,
            updated_at: now,
        };
        state.projects.push(project.clone());
        Ok(project)
    }

    async fn find_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        let state = self.state()?;
        Ok(state
            .projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .map(|p| state.with_member_count(p)))
    }

    async fn update_project(&self, id: Uuid, data: UpdateProject) -> StoreResult<Option<Project>> {
        let mut state = self.state()?;
        let Some(project) = state.projects.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };

        data.apply(project);
        let updated = project.clone();
        Ok(Some(state.with_member_count(updated)))
    }

    async fn delete_project(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state()?;

        let before = state.projects.len();
        state.projects.retain(|p| p.id != id);
        if state.projects.len() == before {
            return Ok(false);
        }

        state.members.retain(|m| m.project_id != id);
        for payment in state.payments.iter_mut().filter(|p| p.project_id == Some(id)) {
            payment.project_id = None;
        }
        Ok(true)
    }

    async fn list_projects(
        &self,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Project>> {
        let state = self.state()?;
        let projects = newest_first(&state.projects, |p| filter.matches(p))
            .into_iter()
            .map(|p| state.with_member_count(p))
            .collect();
        Ok(page.slice(projects))
    }

    async fn count_projects_by_status(&self) -> StoreResult<Vec<StatusCount>> {
        let state = self.state()?;
        Ok([
            ProjectStatus::Upcoming,
            ProjectStatus::Ongoing,
            ProjectStatus::Completed,
        ]
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: state.projects.iter().filter(|p| p.status == status).count() as i64,
        })
        .filter(|c| c.count > 0)
        .collect())
    }

    async fn add_project_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> StoreResult<ProjectMember> {
        let mut state = self.state()?;

        if !state.project_exists(project_id) || state.user(user_id).is_none() {
            return Err(StoreError::Conflict(MISSING_REFERENCE.to_string()));
        }
        if state
            .members
            .iter()
            .any(|m| m.project_id == project_id && m.user_id == user_id)
        {
            return Err(StoreError::Conflict(ALREADY_PROJECT_MEMBER.to_string()));
        }

        let member = ProjectMember {
            project_id,
            user_id,
            role: role.to_string(),
            joined_at: Utc::now(),
        };
        state.members.push(member.clone());
        Ok(member)
    }

    async fn list_project_members(
        &self,
        project_id: Uuid,
    ) -> StoreResult<Vec<ProjectMemberDetail>> {
        let state = self.state()?;
        Ok(state
            .members
            .iter()
            .filter(|m| m.project_id == project_id)
            .filter_map(|m| {
                state.user(m.user_id).map(|u| ProjectMemberDetail {
                    project_id: m.project_id,
                    user_id: m.user_id,
                    role: m.role.clone(),
                    joined_at: m.joined_at,
                    name: u.name.clone(),
                    email: u.email.clone(),
                    phone: u.phone.clone(),
                })
            })
            .collect())
    }

    async fn remove_project_member(&self, project_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state()?;
        let before = state.members.len();
        state
            .members
            .retain(|m| !(m.project_id == project_id && m.user_id == user_id));
        Ok(state.members.len() < before)
    }
}

#[async_trait]
impl NoticeStore for MemoryStore {
    async fn create_notice(&self, data: CreateNotice) -> StoreResult<Notice> {
        let mut state = self.state()?;
        if state.user(data.submitted_by).is_none() {
            return Err(StoreError::Conflict(MISSING_REFERENCE.to_string()));
        }

        let now = Utc::now();
        let notice = Notice {
            id: Uuid::new_v4(),
            title: data.title,
            content: data.content,
            file_url: data.file_url,
            submitted_by: Some(data.submitted_by),
            submitter_name: None,
            created_at: now,
            updated_at: now,
        };
        state.notices.push(notice.clone());
        Ok(state.with_submitter(notice))
    }

    async fn find_notice(&self, id: Uuid) -> StoreResult<Option<Notice>> {
        let state = self.state()?;
        Ok(state
            .notices
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .map(|n| state.with_submitter(n)))
    }

    async fn update_notice(&self, id: Uuid, data: UpdateNotice) -> StoreResult<Option<Notice>> {
        let mut state = self.state()?;
        let Some(notice) = state.notices.iter_mut().find(|n| n.id == id) else {
            return Ok(None);
        };

        if let Some(title) = data.title {
            notice.title = title;
        }
        if let Some(content) = data.content {
            notice.content = content;
        }
        if data.file_url.is_some() {
            notice.file_url = data.file_url;
        }
        notice.updated_at = Utc::now();
        let updated = notice.clone();
        Ok(Some(state.with_submitter(updated)))
    }

    async fn delete_notice(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state()?;
        let before = state.notices.len();
        state.notices.retain(|n| n.id != id);
        Ok(state.notices.len() < before)
    }

    async fn list_notices(&self, page: PageRequest) -> StoreResult<Page<Notice>> {
        let state = self.state()?;
        let notices = newest_first(&state.notices, |_| true)
            .into_iter()
            .map(|n| state.with_submitter(n))
            .collect();
        Ok(page.slice(notices))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::{generate_transaction_id, PaymentMethod};

    async fn user(store: &MemoryStore, email: &str) -> User {
        store
            .create_user(CreateUser {
                name: "Karim".to_string(),
                email: email.to_string(),
                phone: None,
                address: None,
                password_hash: String::new(),
                role: UserRole::User,
                status: UserStatus::Pending,
            })
            .await
            .unwrap()
    }

    async fn payment(store: &MemoryStore, user_id: Uuid, purpose: PaymentPurpose) -> Payment {
        store
            .create_payment(CreatePayment {
                user_id,
                project_id: None,
                amount: 1000,
                method: PaymentMethod::Sslcommerz,
                purpose,
                transaction_id: generate_transaction_id(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let store = MemoryStore::new();
        user(&store, "a@example.com").await;

        let err = store
            .create_user(CreateUser {
                name: "Other".to_string(),
                email: "A@Example.com".to_string(),
                phone: None,
                address: None,
                password_hash: String::new(),
                role: UserRole::User,
                status: UserStatus::Active,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(msg) if msg == EMAIL_TAKEN));
    }

    #[tokio::test]
    async fn test_settle_is_single_shot_and_promotes() {
        let store = MemoryStore::new();
        let payer = user(&store, "payer@example.com").await;
        let p = payment(&store, payer.id, PaymentPurpose::MembershipFee).await;

        let settlement = store
            .settle_payment(p.id, &PaymentStatus::GATEWAY_OPEN, Some("VAL1".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settlement.payment.payment_status, PaymentStatus::Paid);
        assert!(settlement.payment.paid_at.is_some());
        assert_eq!(settlement.income.payment_id, Some(p.id));

        let promoted = settlement.promoted.unwrap();
        assert_eq!(promoted.role, UserRole::Member);
        assert_eq!(promoted.status, UserStatus::Active);

        let replay = store
            .settle_payment(p.id, &PaymentStatus::GATEWAY_OPEN, None)
            .await
            .unwrap();
        assert!(replay.is_none());
        assert_eq!(store.fund_summary().await.unwrap().total_income, 1000);
    }

    #[tokio::test]
    async fn test_donation_does_not_promote() {
        let store = MemoryStore::new();
        let payer = user(&store, "donor@example.com").await;
        let p = payment(&store, payer.id, PaymentPurpose::MonthlyDonation).await;

        let settlement = store
            .settle_payment(p.id, &PaymentStatus::GATEWAY_OPEN, None)
            .await
            .unwrap()
            .unwrap();
        assert!(settlement.promoted.is_none());
        assert_eq!(
            store.find_user(payer.id).await.unwrap().unwrap().role,
            UserRole::User
        );
    }

    #[tokio::test]
    async fn test_close_respects_guard() {
        let store = MemoryStore::new();
        let payer = user(&store, "c@example.com").await;
        let p = payment(&store, payer.id, PaymentPurpose::MonthlyDonation).await;

        let closed = store
            .close_payment(p.id, PaymentStatus::Cancelled, &PaymentStatus::GATEWAY_OPEN)
            .await
            .unwrap();
        assert_eq!(closed.unwrap().payment_status, PaymentStatus::Cancelled);

        let settled = store
            .settle_payment(p.id, &PaymentStatus::GATEWAY_OPEN, None)
            .await
            .unwrap();
        assert!(settled.is_none());
    }

    #[tokio::test]
    async fn test_delete_referenced_user_is_refused() {
        let store = MemoryStore::new();
        let payer = user(&store, "ref@example.com").await;
        payment(&store, payer.id, PaymentPurpose::MonthlyDonation).await;

        let err = store.delete_user(payer.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(msg) if msg == STILL_REFERENCED));

        let free = user(&store, "free@example.com").await;
        assert!(store.delete_user(free.id).await.unwrap());
        assert!(!store.delete_user(free.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_verification_is_recorded_once() {
        let store = MemoryStore::new();
        let admin = user(&store, "admin@example.com").await;
        let expense = store
            .create_fund_transaction(CreateFundTransaction {
                kind: FundKind::Expense,
                amount: 500,
                reason: "Seeds".to_string(),
                requester_id: admin.id,
                payment_id: None,
            })
            .await
            .unwrap();
        assert_eq!(expense.status, FundStatus::Pending);

        assert!(store.record_verification(expense.id, admin.id).await.unwrap().is_some());
        assert!(store.record_verification(expense.id, admin.id).await.unwrap().is_none());

        let approved = store.approve_expense(expense.id, admin.id, 2).await.unwrap();
        assert!(approved.is_none());
        let approved = store.approve_expense(expense.id, admin.id, 1).await.unwrap();
        assert_eq!(approved.unwrap().status, FundStatus::Approved);
    }

    #[tokio::test]
    async fn test_project_members_cascade() {
        let store = MemoryStore::new();
        let member = user(&store, "m@example.com").await;
        let project = store
            .create_project(CreateProject {
                name: "Fish farm".to_string(),
                description: "Pond".to_string(),
                category: "Fisheries".to_string(),
                location: None,
                contact_number: None,
                thumbnail: None,
                images: vec![],
                videos: vec![],
                initial_investment: 0,
                status: ProjectStatus::Upcoming,
                start_date: None,
                end_date: None,
                created_by: None,
            })
            .await
            .unwrap();

        store.add_project_member(project.id, member.id, "Member").await.unwrap();
        let dup = store.add_project_member(project.id, member.id, "Member").await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        let found = store.find_project(project.id).await.unwrap().unwrap();
        assert_eq!(found.member_count, 1);

        assert!(store.delete_project(project.id).await.unwrap());
        assert!(store.list_project_members(project.id).await.unwrap().is_empty());
    }
}
