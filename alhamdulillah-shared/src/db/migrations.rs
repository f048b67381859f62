//! Schema migrations
//!
//! Migration files live in `migrations/` at the workspace root and are
//! embedded into the binary at compile time.

use sqlx::postgres::PgPool;
use tracing::{info, warn};

/// Applies every pending migration
///
/// # Errors
///
/// Returns an error if a migration fails to apply or the database has
/// migrations this build does not know about.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Starting database migrations");

    match sqlx::migrate!("../migrations").run(pool).await {
        Ok(()) => {
            info!("All database migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            warn!("Migration failed: {}", e);
            Err(e)
        }
    }
}
