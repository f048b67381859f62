//! Authentication endpoints
//!
//! # Endpoints
//!
//! - `POST /api/auth/register` - Register a new account (public)
//! - `POST /api/auth/login` - Login and get tokens (public)
//! - `POST /api/auth/refresh` - Exchange a refresh token (public)
//! - `GET /api/auth/me` - The caller, freshly loaded
//! - `GET /api/auth/stats` - Dashboard statistics
//! - `POST /api/auth/logout` - End the login session

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
    extract::ApiJson,
    response::{ApiResponse, CacheTag},
};
use alhamdulillah_shared::{
    auth::{
        jwt::{self, TokenPair},
        middleware::{self, AuthContext},
        password,
    },
    models::user::{CreateUser, User, UserRole, UserStatus},
    services::stats::{self, DashboardStats},
};
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Checked against the password policy as well
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,

    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Returned by register and login
#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub user: User,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    pub access_token: String,
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".to_string())
}

/// Register a new account
///
/// New accounts are USER / PENDING until they pay the membership fee or an
/// administrator changes them.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed
/// - `409 Conflict`: Email already registered
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<ApiResponse<AuthPayload>> {
    req.validate()?;

    password::validate_password_strength(&req.password).map_err(|e| {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: "password".to_string(),
            message: e,
        }])
    })?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Name cannot be empty".to_string()));
    }

    let password_hash = password::hash_password(&req.password)?;

    let user = state
        .store
        .create_user(CreateUser {
            name: name.to_string(),
            email: req.email.trim().to_lowercase(),
            phone: req.phone,
            address: req.address,
            password_hash,
            role: UserRole::User,
            status: UserStatus::Pending,
        })
        .await?;

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;
    tracing::info!(user_id = %user.id, "Account registered");

    Ok(
        ApiResponse::created("Registration successful", AuthPayload { user, tokens })
            .invalidates(&[CacheTag::Auth, CacheTag::User]),
    )
}

/// Login with email and password
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown email or wrong password
/// - `403 Forbidden`: Account is suspended
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<ApiResponse<AuthPayload>> {
    req.validate()?;

    let mut user = state
        .store
        .find_user_by_email(&req.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid_credentials)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login refused: wrong password");
        return Err(invalid_credentials());
    }

    if !user.status.can_sign_in() {
        return Err(ApiError::Forbidden("Account is suspended".to_string()));
    }

    state.store.record_login(user.id).await?;
    user.last_login_at = Some(Utc::now());

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;

    Ok(ApiResponse::ok("Login successful", AuthPayload { user, tokens }).invalidates(&[CacheTag::Auth]))
}

/// Exchange a refresh token for a new access token
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid, expired or revoked refresh token, or the
///   account no longer exists
/// - `403 Forbidden`: Account is suspended
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<ApiResponse<RefreshPayload>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    if state
        .store
        .is_token_revoked(&jwt::fingerprint(&req.refresh_token))
        .await?
    {
        return Err(ApiError::Unauthorized("Token has been revoked".to_string()));
    }

    if middleware::is_session_ended(state.store.as_ref(), claims.sid).await? {
        return Err(ApiError::Unauthorized("Session has ended".to_string()));
    }

    let user = state
        .store
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    if !user.status.can_sign_in() {
        return Err(ApiError::Forbidden("Account is suspended".to_string()));
    }

    let access_token = jwt::access_token_for(&claims, state.jwt_secret())?;

    Ok(ApiResponse::ok("Token refreshed", RefreshPayload { access_token }))
}

/// The caller as loaded for this request
pub async fn me(auth: AuthContext) -> ApiResult<ApiResponse<User>> {
    Ok(ApiResponse::ok("Profile fetched", auth.user))
}

pub async fn stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<ApiResponse<DashboardStats>> {
    let stats = stats::dashboard(state.store.as_ref(), &auth.user).await?;
    Ok(ApiResponse::ok("Dashboard statistics fetched", stats))
}

/// Ends the login session: the access token, its paired refresh token and
/// every access token refreshed from it stop working
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<ApiResponse<()>> {
    middleware::end_session(state.store.as_ref(), &auth).await?;

    tracing::info!(user_id = %auth.user_id(), session_id = %auth.session_id, "Logged out");
    Ok(ApiResponse::ok("Logged out", ()).invalidates(&[CacheTag::Auth]))
}
