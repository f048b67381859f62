//! Health check endpoint
//!
//! Verifies the server is running and the store answers.
//!
//! # Endpoint
//!
//! ```text
//! GET /health
//! ```
//!
//! # Response
//!
//! ```json
//! {
//!   "status": "healthy",
//!   "version": "0.1.0",
//!   "database": "connected"
//! }
//! ```

use crate::app::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Application version
    pub version: String,

    /// Database status
    pub database: String,
}

/// Health check handler
///
/// Answers 503 with `"degraded"` when the store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, database) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "connected"),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the store");
            (StatusCode::SERVICE_UNAVAILABLE, "disconnected")
        }
    };

    let body = HealthResponse {
        status: if status == StatusCode::OK {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
    };

    (status, Json(body))
}
