//! User model and database operations
//!
//! Users register themselves as `USER`/`PENDING`. The role is never
//! self-assigned: it is raised to `MEMBER` by a settled membership-fee
//! payment and otherwise changed only by administrators.
//!
//! # Schema
//!
//! ```sql
//! CREATE TYPE user_role AS ENUM ('USER', 'MEMBER', 'ADMIN', 'SUPER_ADMIN');
//! CREATE TYPE user_status AS ENUM ('PENDING', 'ACTIVE', 'SUSPENDED');
//!
//! CREATE TABLE users (
//!     id UUID PRIMARY KEY,
//!     name VARCHAR(255) NOT NULL,
//!     email VARCHAR(255) NOT NULL UNIQUE,
//!     phone VARCHAR(32),
//!     address TEXT,
//!     password_hash VARCHAR(255) NOT NULL,
//!     role user_role NOT NULL DEFAULT 'USER',
//!     status user_status NOT NULL DEFAULT 'PENDING',
//!     permissions TEXT[] NOT NULL DEFAULT '{}',
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     last_login_at TIMESTAMPTZ
//! );
//! ```
//!
//! # Example
//!
//! ```no_run
//! use alhamdulillah_shared::models::user::{CreateUser, User, UserRole, UserStatus};
//! use alhamdulillah_shared::db::pool::{create_pool, DatabaseConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool(DatabaseConfig::default()).await?;
//!
//! let user = User::create(&pool, CreateUser {
//!     name: "Abdullah".to_string(),
//!     email: "abdullah@example.com".to_string(),
//!     phone: None,
//!     address: None,
//!     password_hash: "$argon2id$...".to_string(),
//!     role: UserRole::User,
//!     status: UserStatus::Pending,
//! }).await?;
//!
//! let found = User::find_by_email(&pool, "abdullah@example.com").await?;
//! assert_eq!(found.map(|u| u.id), Some(user.id));
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::pagination::{Page, PageRequest};

/// Capability strings an administrator may grant to a user
pub const AVAILABLE_PERMISSIONS: [&str; 6] = [
    "manage_users",
    "manage_projects",
    "manage_banners",
    "view_analytics",
    "approve_payments",
    "manage_members",
];

/// Returns true if `permission` is one of [`AVAILABLE_PERMISSIONS`]
pub fn is_known_permission(permission: &str) -> bool {
    AVAILABLE_PERMISSIONS.contains(&permission)
}

/// Access tier of a user
///
/// Role checks go through [`crate::auth::authorization`], never through
/// inline comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Registered, no paid membership
    User,

    /// Paid membership fee
    Member,

    /// Verifies expenses, manages content and members
    Admin,

    /// Final approver, manages administrators
    SuperAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Member => "MEMBER",
            UserRole::Admin => "ADMIN",
            UserRole::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "PENDING",
            UserStatus::Active => "ACTIVE",
            UserStatus::Suspended => "SUSPENDED",
        }
    }

    /// Suspended accounts cannot log in or use existing tokens
    pub fn can_sign_in(&self) -> bool {
        !matches!(self, UserStatus::Suspended)
    }
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,

    pub name: String,

    /// Stored lowercase
    pub email: String,

    pub phone: Option<String>,

    pub address: Option<String>,

    /// Argon2id hash, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub role: UserRole,

    pub status: UserStatus,

    /// Granted capability strings, each one of [`AVAILABLE_PERMISSIONS`]
    pub permissions: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_login_at: Option<DateTime<Utc>>,
}

/// Identity fields embedded in payments, expense requests and members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            address: user.address.clone(),
        }
    }
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
}

/// Self-service profile changes; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Administrative changes; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct AccessUpdate {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub permissions: Option<Vec<String>>,
}

/// Filters for the admin user listing
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring of name or email
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

impl UserFilter {
    /// In-memory equivalent of the SQL filter
    pub fn matches(&self, user: &User) -> bool {
        if let Some(role) = self.role {
            if user.role != role {
                return false;
            }
        }
        if let Some(status) = self.status {
            if user.status != status {
                return false;
            }
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                user.name.to_lowercase().contains(&term) || user.email.contains(&term)
            }
            None => true,
        }
    }
}

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns a database error if the email already exists
    /// (constraint `users_email_key`).
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, phone, address, password_hash, role, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&data.name)
        .bind(data.email.to_lowercase())
        .bind(&data.phone)
        .bind(&data.address)
        .bind(&data.password_hash)
        .bind(data.role)
        .bind(data.status)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email.to_lowercase())
            .fetch_optional(pool)
            .await
    }

    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Applies a profile update, returning `None` if the user does not exist
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        data: ProfileUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                address = COALESCE($4, address),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.phone)
        .bind(data.address)
        .fetch_optional(pool)
        .await
    }

    /// Applies an administrative update, returning `None` if the user does not exist
    pub async fn update_access(
        pool: &PgPool,
        id: Uuid,
        data: AccessUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET role = COALESCE($2, role),
                status = COALESCE($3, status),
                permissions = COALESCE($4, permissions),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.role)
        .bind(data.status)
        .bind(data.permissions)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a user
    ///
    /// # Errors
    ///
    /// Fails with a foreign-key violation while payments or ledger rows
    /// still reference the user.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users newest first
    pub async fn list(
        pool: &PgPool,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        const WHERE: &str = r#"
            WHERE ($1::user_role IS NULL OR role = $1)
              AND ($2::user_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR email ILIKE '%' || $3 || '%')
        "#;

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT * FROM users {WHERE} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(filter.role)
        .bind(filter.status)
        .bind(&filter.search)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM users {WHERE}"))
            .bind(filter.role)
            .bind(filter.status)
            .bind(&filter.search)
            .fetch_one(pool)
            .await?;

        Ok(Page::new(users, page, total.0))
    }
}
