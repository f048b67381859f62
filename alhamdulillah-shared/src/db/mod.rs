//! Database layer
//!
//! # Modules
//!
//! - `pool`: PostgreSQL connection pool with health checks
//! - `migrations`: Embedded schema migrations
//!
//! Queries live with their models in [`crate::models`].
//!
//! # Example
//!
//! ```no_run
//! use alhamdulillah_shared::db::pool::{create_pool, DatabaseConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig {
//!         url: std::env::var("DATABASE_URL")?,
//!         ..Default::default()
//!     };
//!
//!     let pool = create_pool(config).await?;
//!     Ok(())
//! }
//! ```

pub mod migrations;
pub mod pool;
