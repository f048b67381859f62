//! # Alhamdulillah Foundation API Server Library
//!
//! HTTP surface of the foundation backend: accounts, payments through the
//! gateway, the fund ledger, expense approvals, projects and notices.
//!
//! ## Modules
//!
//! - `app`: Application state, router and authentication layer
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: JSON and query extractors that reject with the error envelope
//! - `response`: Success envelope and cache-invalidation hints
//! - `middleware`: Security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;
