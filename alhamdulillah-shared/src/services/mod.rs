//! Business workflows
//!
//! Each workflow takes the caller's freshly loaded [`User`](crate::models::user::User)
//! and a `&dyn Store`, applies the role gate, validates input and performs
//! store operations. Errors are reported as [`ServiceError`].
//!
//! - [`payments`]: payment initiation, gateway returns and manual approval
//! - [`ledger`]: manual ledger entries, balance summary and history
//! - [`expenses`]: the expense approval state machine
//! - [`users`]: account administration
//! - [`projects`]: projects and their members
//! - [`notices`]: the notice board
//! - [`stats`]: dashboard statistics
//! - [`gateway`]: payment gateway adapters

pub mod error;
pub mod expenses;
pub mod gateway;
pub mod ledger;
pub mod notices;
pub mod payments;
pub mod projects;
pub mod stats;
pub mod users;

pub use error::{ServiceError, ServiceResult};
