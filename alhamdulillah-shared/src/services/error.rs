//! Service error taxonomy

use crate::auth::authorization::AuthzError;
use crate::store::StoreError;

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Input failed a business rule
    #[error("{0}")]
    Validation(String),

    /// Caller's role does not allow the operation
    #[error("{0}")]
    Forbidden(String),

    /// Entity is not in a state that allows the transition
    #[error("{0}")]
    StateConflict(String),

    #[error("Expense request needs {required} verification(s) before final approval, has {actual}")]
    QuorumNotMet { required: u32, actual: usize },

    /// Gateway did not open a session or could not be reached
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Named entity does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness or reference rule
    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => ServiceError::Conflict(message),
            other => ServiceError::Store(other),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        ServiceError::Forbidden(err.to_string())
    }
}
