//! API route handlers
//!
//! This module contains all route handlers organized by resource:
//!
//! - `health`: Health check endpoint
//! - `auth`: Registration, login, token refresh, logout and the dashboard
//! - `users`: Account administration and profile updates
//! - `payments`: Payment initiation, gateway returns, approval and invoices
//! - `funds`: Ledger entries, balance and expense requests
//! - `projects`: Projects and project members
//! - `notices`: Notice board

pub mod auth;
pub mod funds;
pub mod health;
pub mod notices;
pub mod payments;
pub mod projects;
pub mod users;
