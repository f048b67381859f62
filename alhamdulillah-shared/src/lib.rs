//! # Alhamdulillah Foundation Shared Library
//!
//! Domain types, persistence and business workflows used by the
//! foundation's API server.
//!
//! ## Module Organization
//!
//! - `models`: Database models and their queries
//! - `auth`: Password hashing, JWT tokens, request authentication and the role gate
//! - `db`: Connection pool and migrations
//! - `store`: The `Store` seam over PostgreSQL and the in-memory test store
//! - `services`: Payment lifecycle, fund ledger, expense approvals and gateway adapters
//! - `pagination`: Page requests and page metadata

pub mod auth;
pub mod db;
pub mod models;
pub mod pagination;
pub mod services;
pub mod store;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
