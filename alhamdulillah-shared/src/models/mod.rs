//! Database models for the foundation
//!
//! Each model owns its PostgreSQL queries as associated functions taking a
//! `&PgPool`; the [`crate::store::PgStore`] delegates to them.
//!
//! # Models
//!
//! - `user`: Accounts, roles, statuses and permissions
//! - `session`: Revoked access tokens
//! - `payment`: Payments, their status machine and settlement
//! - `fund`: Ledger entries and expense-request transitions
//! - `project`: Projects and project members
//! - `notice`: Published notices

pub mod fund;
pub mod notice;
pub mod payment;
pub mod project;
pub mod session;
pub mod user;
