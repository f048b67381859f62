//! Error handling for the API server
//!
//! All handlers return `Result<T, ApiError>`. Errors render as the error
//! envelope:
//!
//! ```json
//! { "success": false, "message": "...", "error": "not_found", "details": [...] }
//! ```
//!
//! `details` is present only for field validation failures.

use alhamdulillah_shared::auth::authorization::AuthzError;
use alhamdulillah_shared::auth::jwt::JwtError;
use alhamdulillah_shared::auth::middleware::AuthError;
use alhamdulillah_shared::auth::password::PasswordError;
use alhamdulillah_shared::services::ServiceError;
use alhamdulillah_shared::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409): uniqueness or reference rule
    Conflict(String),

    /// Conflict (409): entity is not in a state that allows the operation
    StateConflict(String),

    /// Unprocessable entity (422): business rule
    Validation(String),

    /// Unprocessable entity (422): per-field validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Bad gateway (502): payment gateway unavailable
    BadGateway(String),

    /// Internal server error (500)
    InternalError(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,

    /// Human-readable error message
    pub message: String,

    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::StateConflict(msg) => write!(f, "State conflict: {}", msg),
            ApiError::Validation(msg) => write!(f, "Validation failed: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::BadGateway(msg) => write!(f, "Bad gateway: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::StateConflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) | ApiError::ValidationError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_code, message, details) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::StateConflict(msg) => ("state_conflict", msg, None),
            ApiError::Validation(msg) => ("validation_error", msg, None),
            ApiError::ValidationError(errors) => (
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::BadGateway(msg) => {
                tracing::warn!("Gateway error: {}", msg);
                (
                    "gateway_unavailable",
                    "Payment gateway is unavailable, please try again".to_string(),
                    None,
                )
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::Validation(msg),
            ServiceError::Forbidden(msg) => ApiError::Forbidden(msg),
            ServiceError::StateConflict(msg) => ApiError::StateConflict(msg),
            err @ ServiceError::QuorumNotMet { .. } => ApiError::StateConflict(err.to_string()),
            ServiceError::GatewayUnavailable(msg) => ApiError::BadGateway(msg),
            err @ ServiceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ServiceError::Conflict(msg) => ApiError::Conflict(msg),
            ServiceError::Store(err) => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ServiceError::from(err).into()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials | AuthError::InvalidToken(_) => {
                ApiError::Unauthorized(err.message())
            }
            AuthError::InvalidFormat(msg) => ApiError::Unauthorized(msg),
            AuthError::Suspended => ApiError::Forbidden(err.message()),
            AuthError::Store(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

/// Convert JWT errors to API errors
impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => {
                ApiError::InternalError(format!("Token creation failed: {}", msg))
            }
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer { .. } => {
                ApiError::Unauthorized("Invalid token issuer".to_string())
            }
            _ => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

/// Convert `validator` failures to per-field details
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}
