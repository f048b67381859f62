//! Request authentication
//!
//! Validates the bearer token and loads the caller from the store, so role
//! and status are always current. The resulting [`AuthContext`] is placed in
//! request extensions and extracted by handlers.
//!
//! # Example
//!
//! ```no_run
//! use alhamdulillah_shared::auth::middleware::AuthContext;
//!
//! async fn handler(auth: AuthContext) -> String {
//!     format!("Hello, {}", auth.user.name)
//! }
//! ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use super::jwt::{fingerprint, session_fingerprint, validate_access_token, JwtError, TokenType};
use crate::models::user::{User, UserRole};
use crate::store::{Store, StoreError};

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Caller as loaded for this request
    pub user: User,

    /// Revocation key of the presented token
    pub token_fingerprint: String,

    /// When the presented token expires
    pub expires_at: DateTime<Utc>,

    /// Login session the token belongs to
    pub session_id: Uuid,
}

impl AuthContext {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> UserRole {
        self.user.role
    }
}

/// Error type for request authentication
#[derive(Debug)]
pub enum AuthError {
    /// Missing authorization header
    MissingCredentials,

    /// Authorization header is not `Bearer <token>`
    InvalidFormat(String),

    /// Token is invalid, expired, revoked or names an unknown user
    InvalidToken(String),

    /// Account is suspended
    Suspended,

    Store(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::InvalidFormat(_)
            | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::Suspended => StatusCode::FORBIDDEN,
            AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AuthError::MissingCredentials => "Missing credentials".to_string(),
            AuthError::InvalidFormat(msg) | AuthError::InvalidToken(msg) => msg.clone(),
            AuthError::Suspended => "Account is suspended".to_string(),
            AuthError::Store(_) => "Internal server error".to_string(),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Store(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            AuthError::Suspended => "forbidden",
            AuthError::Store(detail) => {
                tracing::error!(error = %detail, "Store error during authentication");
                "internal_error"
            }
            _ => "unauthorized",
        };

        let body = json!({
            "success": false,
            "message": self.message(),
            "error": error,
        });

        (status, Json(body)).into_response()
    }
}

/// Extracts the token from an `Authorization` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredentials)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Authenticates a raw `Authorization` header value
///
/// # Errors
///
/// - `MissingCredentials` / `InvalidFormat` for absent or malformed headers
/// - `InvalidToken` for bad, expired or revoked tokens and deleted users
/// - `Suspended` for suspended accounts
pub async fn authenticate(
    store: &dyn Store,
    secret: &str,
    header: Option<&str>,
) -> Result<AuthContext, AuthError> {
    let token = bearer_token(header)?;

    let claims = validate_access_token(token, secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        JwtError::InvalidIssuer { .. } => AuthError::InvalidToken("Invalid issuer".to_string()),
        _ => AuthError::InvalidToken("Invalid token".to_string()),
    })?;

    let token_fingerprint = fingerprint(token);
    if store.is_token_revoked(&token_fingerprint).await? {
        return Err(AuthError::InvalidToken("Token has been revoked".to_string()));
    }
    if store.is_token_revoked(&session_fingerprint(claims.sid)).await? {
        return Err(AuthError::InvalidToken("Session has ended".to_string()));
    }

    let user = store
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| AuthError::InvalidToken("User no longer exists".to_string()))?;

    if !user.status.can_sign_in() {
        return Err(AuthError::Suspended);
    }

    Ok(AuthContext {
        user,
        token_fingerprint,
        expires_at: claims.expires_at(),
        session_id: claims.sid,
    })
}

/// Ends the caller's login session
///
/// Revokes the presented access token and the session itself, so the
/// paired refresh token and any access token refreshed from it stop
/// working too. The session key is kept for a full refresh lifetime.
pub async fn end_session(store: &dyn Store, ctx: &AuthContext) -> Result<(), StoreError> {
    store
        .revoke_token(&ctx.token_fingerprint, ctx.expires_at)
        .await?;
    store
        .revoke_token(
            &session_fingerprint(ctx.session_id),
            Utc::now() + TokenType::Refresh.default_expiration(),
        )
        .await
}

/// Whether the session of a token has been ended by logout
pub async fn is_session_ended(store: &dyn Store, session_id: Uuid) -> Result<bool, StoreError> {
    store.is_token_revoked(&session_fingerprint(session_id)).await
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{create_token, issue_token_pair, refresh_access_token, Claims};
    use crate::models::user::{AccessUpdate, CreateUser, UserStatus};
    use crate::store::{MemoryStore, UserStore};
    use chrono::Duration;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    async fn seeded(status: UserStatus) -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let user = store
            .create_user(CreateUser {
                name: "Rahim".to_string(),
                email: "rahim@example.com".to_string(),
                phone: None,
                address: None,
                password_hash: String::new(),
                role: UserRole::User,
                status,
            })
            .await
            .unwrap();
        (store, user)
    }

    fn header(token: &str) -> String {
        format!("Bearer {}", token)
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert!(matches!(bearer_token(None), Err(AuthError::MissingCredentials)));
        assert!(matches!(bearer_token(Some("Basic abc")), Err(AuthError::InvalidFormat(_))));
        assert!(matches!(bearer_token(Some("Bearer ")), Err(AuthError::InvalidFormat(_))));
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_authenticate_loads_current_role() {
        let (store, user) = seeded(UserStatus::Active).await;
        let pair = issue_token_pair(user.id, SECRET).unwrap();

        store
            .update_access(
                user.id,
                AccessUpdate {
                    role: Some(UserRole::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let ctx = authenticate(&store, SECRET, Some(&header(&pair.access_token)))
            .await
            .unwrap();
        assert_eq!(ctx.user_id(), user.id);
        assert_eq!(ctx.role(), UserRole::Admin);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_refresh_and_expired_tokens() {
        let (store, user) = seeded(UserStatus::Active).await;

        let pair = issue_token_pair(user.id, SECRET).unwrap();
        let err = authenticate(&store, SECRET, Some(&header(&pair.refresh_token)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let expired = Claims::with_expiration(user.id, TokenType::Access, Duration::seconds(-60));
        let token = create_token(&expired, SECRET).unwrap();
        let err = authenticate(&store, SECRET, Some(&header(&token))).await.unwrap_err();
        assert_eq!(err.message(), "Token expired");
    }

    #[tokio::test]
    async fn test_authenticate_rejects_revoked_token() {
        let (store, user) = seeded(UserStatus::Active).await;
        let pair = issue_token_pair(user.id, SECRET).unwrap();

        store
            .revoke_token(&fingerprint(&pair.access_token), Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        let err = authenticate(&store, SECRET, Some(&header(&pair.access_token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_ended_session_rejects_refreshed_tokens() {
        let (store, user) = seeded(UserStatus::Active).await;
        let pair = issue_token_pair(user.id, SECRET).unwrap();

        let ctx = authenticate(&store, SECRET, Some(&header(&pair.access_token)))
            .await
            .unwrap();
        end_session(&store, &ctx).await.unwrap();
        assert!(is_session_ended(&store, ctx.session_id).await.unwrap());

        // a token minted from the paired refresh token shares the session
        let refreshed = refresh_access_token(&pair.refresh_token, SECRET).unwrap();
        let err = authenticate(&store, SECRET, Some(&header(&refreshed)))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Session has ended");

        // other logins are unaffected
        let other = issue_token_pair(user.id, SECRET).unwrap();
        authenticate(&store, SECRET, Some(&header(&other.access_token)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_authenticate_rejects_suspended_user() {
        let (store, user) = seeded(UserStatus::Suspended).await;
        let pair = issue_token_pair(user.id, SECRET).unwrap();

        let err = authenticate(&store, SECRET, Some(&header(&pair.access_token)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_deleted_user() {
        let store = MemoryStore::new();
        let pair = issue_token_pair(Uuid::new_v4(), SECRET).unwrap();

        let err = authenticate(&store, SECRET, Some(&header(&pair.access_token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }
}
