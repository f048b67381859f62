//! Password hashing using Argon2id
//!
//! # Security
//!
//! - **Algorithm**: Argon2id, version 0x13
//! - **Memory**: 19 MiB (19456 KiB)
//! - **Iterations**: 2 passes
//! - **Parallelism**: 1 lane
//!
//! Verification reads the parameters back from the PHC string, so hashes
//! created with other parameters keep verifying.
//!
//! # Example
//!
//! ```
//! use alhamdulillah_shared::auth::password::{hash_password, verify_password};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hash = hash_password("bismillah-123")?;
//! assert!(verify_password("bismillah-123", &hash)?);
//! assert!(!verify_password("wrong", &hash)?);
//! # Ok(())
//! # }
//! ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum accepted password length, in characters
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = ParamsBuilder::new()
        .m_cost(19456)
        .t_cost(2)
        .p_cost(1)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password into a PHC string (`$argon2id$v=19$m=19456,t=2,p=1$...`)
///
/// # Errors
///
/// Returns `PasswordError::HashError` if hashing fails
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Verifies a password against a stored hash in constant time
///
/// # Returns
///
/// `Ok(true)` on match, `Ok(false)` on mismatch
///
/// # Errors
///
/// Returns an error if the stored hash cannot be parsed or lacks its salt
/// or hash output, so a corrupt record never reads as a wrong password
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

    if parsed.salt.is_none() || parsed.hash.is_none() {
        return Err(PasswordError::InvalidHash(
            "Hash is missing its salt or output".to_string(),
        ));
    }

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
    }
}

/// Checks the registration password policy
///
/// Passwords must be 6 to 128 characters and not only whitespace.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at most {} characters long",
            MAX_PASSWORD_LENGTH
        ));
    }

    if password.trim().is_empty() {
        return Err("Password cannot be only whitespace".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_format() {
        let hash = hash_password("test_password_123").expect("Hash should succeed");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("v=19"));
        assert!(hash.contains("m=19456"));
        assert!(hash.contains("t=2"));
        assert!(hash.contains("p=1"));
    }

    #[test]
    fn test_same_password_different_salts() {
        let hash1 = hash_password("same_password").unwrap();
        let hash2 = hash_password("same_password").unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct_password").unwrap();

        assert!(verify_password("correct_password", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_verify_unicode_password() {
        let hash = hash_password("আলহামদুলিল্লাহ").unwrap();
        assert!(verify_password("আলহামদুলিল্লাহ", &hash).unwrap());
    }

    #[test]
    fn test_verify_invalid_hash() {
        assert!(verify_password("password", "invalid_hash").is_err());
        assert!(verify_password("password", "$argon2id$invalid").is_err());
        assert!(verify_password("password", "").is_err());
    }

    #[test]
    fn test_verify_truncated_hash_is_an_error() {
        let hash = hash_password("correct_password").unwrap();
        let without_output = &hash[..hash.rfind('$').unwrap()];

        assert!(matches!(
            verify_password("correct_password", without_output),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password_strength("secret").is_ok());
        assert!(validate_password_strength("a much longer pass phrase").is_ok());

        let err = validate_password_strength("short").unwrap_err();
        assert!(err.contains("at least 6"));

        assert!(validate_password_strength("      ").is_err());
        assert!(validate_password_strength(&"x".repeat(129)).is_err());
    }
}
