//! Role gate and account-management rules
//!
//! Every privileged operation goes through one of the `require_*` helpers
//! below, always against the user loaded for the current request.
//!
//! # Role Model
//!
//! Roles are strictly ordered:
//!
//! 1. **USER**: registered, no membership yet
//! 2. **MEMBER**: paid the membership fee
//! 3. **ADMIN**: manages the ledger and verifies expense requests
//! 4. **SUPER_ADMIN**: gives final approval and manages administrators
//!
//! A higher role passes every check a lower role passes.
//!
//! # Example
//!
//! ```no_run
//! use alhamdulillah_shared::auth::authorization::{require_admin, AuthzError};
//! use alhamdulillah_shared::models::user::User;
//!
//! fn add_income(actor: &User) -> Result<(), AuthzError> {
//!     require_admin(actor)?;
//!     Ok(())
//! }
//! ```

use uuid::Uuid;

use crate::models::user::{User, UserRole};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Actor's role is below the required one
    #[error("Insufficient permissions: requires {}, has {}", required.as_str(), actual.as_str())]
    InsufficientRole { required: UserRole, actual: UserRole },

    /// Actor may not touch this resource
    #[error("Not authorized to access this resource")]
    NotAuthorized,
}

impl UserRole {
    fn rank(self) -> u8 {
        match self {
            UserRole::User => 0,
            UserRole::Member => 1,
            UserRole::Admin => 2,
            UserRole::SuperAdmin => 3,
        }
    }

    /// True when this role is at least `other`
    pub fn at_least(self, other: UserRole) -> bool {
        self.rank() >= other.rank()
    }
}

/// Membership gate: MEMBER, ADMIN and SUPER_ADMIN count as members
pub fn is_member(role: UserRole) -> bool {
    role.at_least(UserRole::Member)
}

pub fn is_admin(role: UserRole) -> bool {
    role.at_least(UserRole::Admin)
}

pub fn is_super_admin(role: UserRole) -> bool {
    role == UserRole::SuperAdmin
}

/// Requires `actor` to hold at least `required`
pub fn require_role(actor: &User, required: UserRole) -> Result<(), AuthzError> {
    if actor.role.at_least(required) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole {
            required,
            actual: actor.role,
        })
    }
}

pub fn require_member(actor: &User) -> Result<(), AuthzError> {
    require_role(actor, UserRole::Member)
}

pub fn require_admin(actor: &User) -> Result<(), AuthzError> {
    require_role(actor, UserRole::Admin)
}

pub fn require_super_admin(actor: &User) -> Result<(), AuthzError> {
    require_role(actor, UserRole::SuperAdmin)
}

/// Requires the actor's role to be one of `roles` exactly
pub fn require_any_role(actor: &User, roles: &[UserRole]) -> Result<(), AuthzError> {
    if roles.contains(&actor.role) {
        return Ok(());
    }

    Err(AuthzError::InsufficientRole {
        required: roles.iter().copied().min_by_key(|r| r.rank()).unwrap_or(UserRole::SuperAdmin),
        actual: actor.role,
    })
}

/// Owners read their own resources; admins read everyone's
pub fn require_self_or_admin(actor: &User, owner_id: Uuid) -> Result<(), AuthzError> {
    if actor.id == owner_id || is_admin(actor.role) {
        Ok(())
    } else {
        Err(AuthzError::NotAuthorized)
    }
}

/// Whether `actor` may edit or delete the account `target`
///
/// Admins manage users and members. Only a super admin manages other
/// admins, and no one manages their own account through the admin surface.
pub fn can_manage_user(actor: &User, target: &User) -> bool {
    if actor.id == target.id {
        return false;
    }

    match actor.role {
        UserRole::SuperAdmin => true,
        UserRole::Admin => !is_admin(target.role),
        UserRole::Member | UserRole::User => false,
    }
}

/// Whether `actor` may grant `role` to someone
///
/// Admins may grant USER and MEMBER; granting ADMIN or SUPER_ADMIN takes a
/// super admin.
pub fn can_assign_role(actor: &User, role: UserRole) -> bool {
    match actor.role {
        UserRole::SuperAdmin => true,
        UserRole::Admin => !is_admin(role),
        UserRole::Member | UserRole::User => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserStatus;
    use chrono::Utc;

    const ALL_ROLES: [UserRole; 4] = [
        UserRole::User,
        UserRole::Member,
        UserRole::Admin,
        UserRole::SuperAdmin,
    ];

    fn user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
            phone: None,
            address: None,
            password_hash: String::new(),
            role,
            status: UserStatus::Active,
            permissions: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_membership_gate() {
        let members: Vec<bool> = ALL_ROLES.iter().map(|r| is_member(*r)).collect();
        assert_eq!(members, vec![false, true, true, true]);
    }

    #[test]
    fn test_admin_gate() {
        let admins: Vec<bool> = ALL_ROLES.iter().map(|r| is_admin(*r)).collect();
        assert_eq!(admins, vec![false, false, true, true]);

        let supers: Vec<bool> = ALL_ROLES.iter().map(|r| is_super_admin(*r)).collect();
        assert_eq!(supers, vec![false, false, false, true]);
    }

    #[test]
    fn test_require_role_reports_both_roles() {
        let err = require_admin(&user(UserRole::Member)).unwrap_err();
        match err {
            AuthzError::InsufficientRole { required, actual } => {
                assert_eq!(required, UserRole::Admin);
                assert_eq!(actual, UserRole::Member);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(require_admin(&user(UserRole::SuperAdmin)).is_ok());
        assert!(require_super_admin(&user(UserRole::Admin)).is_err());
        assert!(require_member(&user(UserRole::User)).is_err());
    }

    #[test]
    fn test_require_any_role_is_exact() {
        let only_admin = [UserRole::Admin];
        assert!(require_any_role(&user(UserRole::Admin), &only_admin).is_ok());
        assert!(require_any_role(&user(UserRole::SuperAdmin), &only_admin).is_err());
    }

    #[test]
    fn test_self_or_admin() {
        let member = user(UserRole::Member);
        assert!(require_self_or_admin(&member, member.id).is_ok());
        assert!(require_self_or_admin(&member, Uuid::new_v4()).is_err());
        assert!(require_self_or_admin(&user(UserRole::Admin), member.id).is_ok());
    }

    #[test]
    fn test_user_management_rules() {
        let admin = user(UserRole::Admin);
        let other_admin = user(UserRole::Admin);
        let super_admin = user(UserRole::SuperAdmin);
        let member = user(UserRole::Member);

        assert!(can_manage_user(&admin, &member));
        assert!(!can_manage_user(&admin, &other_admin));
        assert!(!can_manage_user(&admin, &super_admin));
        assert!(can_manage_user(&super_admin, &admin));
        assert!(!can_manage_user(&super_admin, &super_admin));
        assert!(!can_manage_user(&member, &user(UserRole::User)));
    }

    #[test]
    fn test_role_assignment_rules() {
        let admin = user(UserRole::Admin);
        assert!(can_assign_role(&admin, UserRole::Member));
        assert!(!can_assign_role(&admin, UserRole::Admin));
        assert!(can_assign_role(&user(UserRole::SuperAdmin), UserRole::SuperAdmin));
        assert!(!can_assign_role(&user(UserRole::Member), UserRole::User));
    }
}
