//! JWT token generation and validation
//!
//! Tokens are signed with HS256 and carry the user id only. Roles are never
//! read from a token: the request context reloads the user on every
//! request, so a role granted a moment ago applies immediately.
//!
//! # Token Types
//!
//! - **Access Token**: 24 hours, sent as `Authorization: Bearer <token>`
//! - **Refresh Token**: 30 days, exchanged for a new access token
//!
//! Every token carries a random `jti`, so two tokens issued in the same
//! second still differ and can be revoked independently. The access and
//! refresh token of one login share a session id (`sid`); revoking the
//! session ends both, along with every access token later refreshed from it.
//!
//! # Example
//!
//! ```
//! use alhamdulillah_shared::auth::jwt::{create_token, validate_token, Claims, TokenType};
//! use uuid::Uuid;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let user_id = Uuid::new_v4();
//! let claims = Claims::new(user_id, TokenType::Access);
//! let token = create_token(&claims, "your-secret-key")?;
//!
//! let validated = validate_token(&token, "your-secret-key")?;
//! assert_eq!(validated.sub, user_id);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Issuer written to and required in every token
pub const ISSUER: &str = "alhamdulillah-foundation";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid issuer: expected {expected}")]
    InvalidIssuer { expected: String },

    #[error("Expected {expected} token")]
    WrongTokenType { expected: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(24),
            TokenType::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,

    /// Always [`ISSUER`]
    pub iss: String,

    pub iat: i64,

    pub exp: i64,

    pub nbf: i64,

    /// Unique token id
    pub jti: Uuid,

    /// Login session shared by an access/refresh pair
    pub sid: Uuid,

    pub token_type: TokenType,
}

impl Claims {
    /// Creates claims with the default expiration for `token_type`
    pub fn new(user_id: Uuid, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, token_type, token_type.default_expiration())
    }

    pub fn with_expiration(user_id: Uuid, token_type: TokenType, expires_in: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4(),
            sid: Uuid::new_v4(),
            token_type,
        }
    }

    /// Places the token in an existing login session
    pub fn in_session(mut self, session_id: Uuid) -> Self {
        self.sid = session_id;
        self
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// An access/refresh pair returned at login and registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs claims with HS256
///
/// # Errors
///
/// Returns `JwtError::CreateError` if encoding fails
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Issues a fresh access and refresh token for `user_id`
pub fn issue_token_pair(user_id: Uuid, secret: &str) -> Result<TokenPair, JwtError> {
    let access = Claims::new(user_id, TokenType::Access);
    let refresh = Claims::new(user_id, TokenType::Refresh).in_session(access.sid);

    Ok(TokenPair {
        access_token: create_token(&access, secret)?,
        refresh_token: create_token(&refresh, secret)?,
    })
}

/// Validates signature, expiry, not-before and issuer
///
/// # Errors
///
/// Returns `JwtError::Expired` for expired tokens, `JwtError::InvalidIssuer`
/// for foreign tokens and `JwtError::ValidationError` otherwise
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer {
            expected: ISSUER.to_string(),
        },
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(data.claims)
}

fn validate_typed(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != expected {
        return Err(JwtError::WrongTokenType {
            expected: expected.as_str(),
        });
    }

    Ok(claims)
}

pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Access)
}

pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Refresh)
}

/// Issues an access token in the session of already validated refresh claims
pub fn access_token_for(refresh: &Claims, secret: &str) -> Result<String, JwtError> {
    create_token(
        &Claims::new(refresh.sub, TokenType::Access).in_session(refresh.sid),
        secret,
    )
}

/// Exchanges a valid refresh token for a new access token
pub fn refresh_access_token(refresh_token: &str, secret: &str) -> Result<String, JwtError> {
    let refresh = validate_refresh_token(refresh_token, secret)?;
    access_token_for(&refresh, secret)
}

/// Hex SHA-256 of a raw token, used as its revocation key
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Revocation key of a whole login session
pub fn session_fingerprint(session_id: Uuid) -> String {
    fingerprint(&format!("session:{session_id}"))
}
