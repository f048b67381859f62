//! Payment model, status machine and settlement
//!
//! # Status machine
//!
//! ```text
//! INITIATED ──► PENDING ──► PAID
//!     │            │
//!     │            ├──────► FAILED
//!     │            └──────► CANCELLED
//!     └─────────────────────► PAID / FAILED / CANCELLED
//! ```
//!
//! `INITIATED`: record created, no gateway session yet.
//! `PENDING`: gateway session issued, customer is at the gateway.
//! `PAID`, `FAILED`, `CANCELLED` and `REFUNDED` are terminal.
//!
//! `paid_at` is set exactly once, by [`Payment::settle`], and only there.
//! Settlement, the ledger income and the membership promotion commit
//! together in one transaction. `fund_transactions.payment_id` is unique so
//! a replayed settlement can never post income twice.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::cmp::Ordering;
use uuid::Uuid;

use super::fund::{CreateFundTransaction, FundKind, FundTransaction};
use super::user::User;
use crate::pagination::{Page, PageRequest, SortOrder};

/// Supported payment channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Sslcommerz,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Sslcommerz => "SSLCOMMERZ",
        }
    }
}

/// What a payment is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_purpose", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentPurpose {
    MembershipFee,
    MonthlyDonation,
    ProjectDonation,
}

impl PaymentPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPurpose::MembershipFee => "MEMBERSHIP_FEE",
            PaymentPurpose::MonthlyDonation => "MONTHLY_DONATION",
            PaymentPurpose::ProjectDonation => "PROJECT_DONATION",
        }
    }

    /// Human readable label sent to the gateway and used in ledger reasons
    pub fn label(&self) -> &'static str {
        match self {
            PaymentPurpose::MembershipFee => "Membership fee",
            PaymentPurpose::MonthlyDonation => "Monthly donation",
            PaymentPurpose::ProjectDonation => "Project donation",
        }
    }
}

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Initiated,
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "INITIATED",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    /// Terminal statuses accept no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }

    /// Statuses from which a gateway return may settle or close a payment
    pub const GATEWAY_OPEN: [PaymentStatus; 2] = [PaymentStatus::Initiated, PaymentStatus::Pending];

    /// Statuses from which an administrator may approve a payment
    pub const AWAITING_APPROVAL: [PaymentStatus; 1] = [PaymentStatus::Pending];
}

fn status_names(statuses: &[PaymentStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// A payment record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,

    pub user_id: Uuid,

    /// Target project for `PROJECT_DONATION`
    pub project_id: Option<Uuid>,

    /// Whole BDT, always positive
    pub amount: i64,

    pub method: PaymentMethod,

    pub purpose: PaymentPurpose,

    pub payment_status: PaymentStatus,

    /// Reference sent to the gateway as `tran_id`
    pub transaction_id: String,

    #[serde(skip_serializing)]
    #[serde(default)]
    pub gateway_session_key: Option<String>,

    /// Gateway `val_id` recorded at settlement
    pub validation_id: Option<String>,

    /// Set iff `payment_status == PAID`
    pub paid_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a payment
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub amount: i64,
    pub method: PaymentMethod,
    pub purpose: PaymentPurpose,
    pub transaction_id: String,
}

/// Result of a successful settlement
#[derive(Debug, Clone)]
pub struct Settlement {
    pub payment: Payment,

    /// Income posted to the ledger for this payment
    pub income: FundTransaction,

    /// The payer after promotion, if the payment promoted them to MEMBER
    pub promoted: Option<User>,
}

/// Generates a unique gateway transaction reference, e.g. `AF20261019-9F2C4A1B7E03`
pub fn generate_transaction_id() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "AF{}-{}",
        Utc::now().format("%Y%m%d"),
        hex::encode_upper(bytes)
    )
}

/// Ledger reason for a settled payment
pub fn income_reason(payment: &Payment) -> String {
    format!("{} ({})", payment.purpose.label(), payment.transaction_id)
}

/// Column a payment listing is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentSortField {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "amount")]
    Amount,
    #[serde(rename = "paidAt")]
    PaidAt,
}

impl PaymentSortField {
    fn column(&self) -> &'static str {
        match self {
            PaymentSortField::CreatedAt => "created_at",
            PaymentSortField::Amount => "amount",
            PaymentSortField::PaidAt => "paid_at",
        }
    }
}

/// Filters and ordering for payment listings
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub purpose: Option<PaymentPurpose>,
    pub sort_by: PaymentSortField,
    pub sort_order: SortOrder,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.user_id.map_or(true, |id| payment.user_id == id)
            && self.status.map_or(true, |s| payment.payment_status == s)
            && self.purpose.map_or(true, |p| payment.purpose == p)
    }

    /// Orders payments in place the same way the SQL listing does
    pub fn sort(&self, payments: &mut [Payment]) {
        let directed = |ordering: Ordering| match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };

        payments.sort_by(|a, b| {
            let primary = match self.sort_by {
                PaymentSortField::CreatedAt => directed(a.created_at.cmp(&b.created_at)),
                PaymentSortField::Amount => directed(a.amount.cmp(&b.amount)),
                // unpaid rows sort last in either direction
                PaymentSortField::PaidAt => match (a.paid_at, b.paid_at) {
                    (Some(x), Some(y)) => directed(x.cmp(&y)),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                },
            };
            primary.then_with(|| b.created_at.cmp(&a.created_at))
        });
    }

    fn order_by(&self) -> String {
        format!(
            "{} {} NULLS LAST, created_at DESC",
            self.sort_by.column(),
            self.sort_order.as_sql()
        )
    }
}

/// Paid total for one calendar month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonthlyTotal {
    /// e.g. `Oct 2026`
    pub name: String,
    pub amount: i64,
}

impl Payment {
    pub async fn create(pool: &PgPool, data: CreatePayment) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, user_id, project_id, amount, method, purpose, payment_status, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, 'INITIATED', $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.user_id)
        .bind(data.project_id)
        .bind(data.amount)
        .bind(data.method)
        .bind(data.purpose)
        .bind(&data.transaction_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_transaction_id(
        pool: &PgPool,
        transaction_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(pool)
            .await
    }

    /// INITIATED → PENDING once the gateway issued a session
    pub async fn mark_pending(
        pool: &PgPool,
        id: Uuid,
        session_key: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET payment_status = 'PENDING', gateway_session_key = $2, updated_at = NOW()
            WHERE id = $1 AND payment_status = 'INITIATED'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(session_key)
        .fetch_optional(pool)
        .await
    }

    /// Settles a payment: status to PAID, ledger income, membership promotion
    ///
    /// All three writes commit atomically. Returns `None` without writing
    /// anything if the payment is not in one of `from`.
    pub async fn settle(
        pool: &PgPool,
        id: Uuid,
        from: &[PaymentStatus],
        validation_id: Option<String>,
    ) -> Result<Option<Settlement>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET payment_status = 'PAID',
                paid_at = NOW(),
                validation_id = COALESCE($3, validation_id),
                updated_at = NOW()
            WHERE id = $1 AND payment_status::text = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status_names(from))
        .bind(validation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(payment) = payment else {
            tx.rollback().await?;
            return Ok(None);
        };

        let income = FundTransaction::insert(
            &mut *tx,
            CreateFundTransaction {
                kind: FundKind::Income,
                amount: payment.amount,
                reason: income_reason(&payment),
                requester_id: payment.user_id,
                payment_id: Some(payment.id),
            },
        )
        .await?;

        let promoted = if payment.purpose == PaymentPurpose::MembershipFee {
            sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET role = 'MEMBER',
                    status = CASE WHEN status = 'PENDING' THEN 'ACTIVE'::user_status ELSE status END,
                    updated_at = NOW()
                WHERE id = $1 AND role = 'USER'
                RETURNING *
                "#,
            )
            .bind(payment.user_id)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            None
        };

        tx.commit().await?;

        Ok(Some(Settlement {
            payment,
            income,
            promoted,
        }))
    }

    /// Moves an open payment to FAILED or CANCELLED
    pub async fn close(
        pool: &PgPool,
        id: Uuid,
        to: PaymentStatus,
        from: &[PaymentStatus],
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET payment_status = $2, updated_at = NOW()
            WHERE id = $1 AND payment_status::text = ANY($3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(status_names(from))
        .fetch_optional(pool)
        .await
    }

    pub async fn list(
        pool: &PgPool,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::payment_status IS NULL OR payment_status = $2)
              AND ($3::payment_purpose IS NULL OR purpose = $3)
        "#;

        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT * FROM payments {WHERE} ORDER BY {} LIMIT $4 OFFSET $5",
            filter.order_by()
        ))
        .bind(filter.user_id)
        .bind(filter.status)
        .bind(filter.purpose)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM payments {WHERE}"))
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.purpose)
            .fetch_one(pool)
            .await?;

        Ok(Page::new(payments, page, total.0))
    }

    /// Sum of PAID payments, for one user or everyone
    pub async fn total_paid(pool: &PgPool, user_id: Option<Uuid>) -> Result<i64, sqlx::Error> {
        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT
            FROM payments
            WHERE payment_status = 'PAID' AND ($1::uuid IS NULL OR user_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(total.0)
    }

    /// PAID totals per calendar month since `since`, oldest first
    pub async fn monthly_totals(
        pool: &PgPool,
        since: DateTime<Utc>,
    ) -> Result<Vec<MonthlyTotal>, sqlx::Error> {
        sqlx::query_as::<_, MonthlyTotal>(
            r#"
            SELECT to_char(date_trunc('month', paid_at), 'Mon YYYY') AS name,
                   COALESCE(SUM(amount), 0)::BIGINT AS amount
            FROM payments
            WHERE payment_status = 'PAID' AND paid_at >= $1
            GROUP BY date_trunc('month', paid_at)
            ORDER BY date_trunc('month', paid_at)
            "#,
        )
        .bind(since)
        .fetch_all(pool)
        .await
    }
}
