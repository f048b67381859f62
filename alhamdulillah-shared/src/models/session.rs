//! Revoked access tokens
//!
//! Logout stores the SHA-256 fingerprint of the presented token until the
//! token would have expired anyway.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct RevokedToken;

impl RevokedToken {
    pub async fn revoke(
        pool: &PgPool,
        fingerprint: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_hash, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(fingerprint)
        .bind(expires_at)
        .execute(pool)
        .await?;

        // expired rows can never match a valid token again
        sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < NOW()")
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn is_revoked(pool: &PgPool, fingerprint: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT token_hash FROM revoked_tokens WHERE token_hash = $1")
                .bind(fingerprint)
                .fetch_optional(pool)
                .await?;

        Ok(row.is_some())
    }
}
