//! Authentication and authorization
//!
//! # Modules
//!
//! - [`password`]: Argon2id password hashing and the password policy
//! - [`jwt`]: Access/refresh token issue, validation and fingerprints
//! - [`middleware`]: Per-request [`middleware::AuthContext`] loaded from the store
//! - [`authorization`]: Role gate and account-management rules
//!
//! # Example
//!
//! ```no_run
//! use alhamdulillah_shared::auth::password::{hash_password, verify_password};
//! use alhamdulillah_shared::auth::jwt::issue_token_pair;
//! use uuid::Uuid;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hash = hash_password("user_password")?;
//! assert!(verify_password("user_password", &hash)?);
//!
//! let tokens = issue_token_pair(Uuid::new_v4(), "secret-key")?;
//! # Ok(())
//! # }
//! ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
