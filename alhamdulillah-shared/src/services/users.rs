//! Account administration

use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

use super::error::{ServiceError, ServiceResult};
use crate::auth::authorization::{can_assign_role, can_manage_user, require_admin};
use crate::auth::password::{hash_password, validate_password_strength};
use crate::models::user::{
    is_known_permission, AccessUpdate, CreateUser, ProfileUpdate, User, UserFilter, UserRole,
    UserStatus,
};
use crate::pagination::{Page, PageRequest};
use crate::store::{Store, StoreError, STILL_REFERENCED};

pub async fn list(
    store: &dyn Store,
    actor: &User,
    filter: UserFilter,
    page: PageRequest,
) -> ServiceResult<Page<User>> {
    require_admin(actor)?;
    Ok(store.list_users(&filter, page).await?)
}

pub async fn get(store: &dyn Store, actor: &User, id: Uuid) -> ServiceResult<User> {
    require_admin(actor)?;
    store
        .find_user(id)
        .await?
        .ok_or(ServiceError::NotFound("User"))
}

/// Updates the caller's own name, phone or address
pub async fn update_profile(
    store: &dyn Store,
    actor: &User,
    mut update: ProfileUpdate,
) -> ServiceResult<User> {
    if let Some(name) = update.name.take() {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("Name cannot be empty".to_string()));
        }
        update.name = Some(name.to_string());
    }

    store
        .update_profile(actor.id, update)
        .await?
        .ok_or(ServiceError::NotFound("User"))
}

/// Changes another account's role, status or permissions
///
/// # Errors
///
/// - `Forbidden` when targeting oneself, when an ADMIN targets an
///   administrator, or when an ADMIN grants an administrator role
/// - `Validation` for unknown permission strings
/// - `NotFound` for an unknown target
pub async fn update_access(
    store: &dyn Store,
    actor: &User,
    target_id: Uuid,
    mut update: AccessUpdate,
) -> ServiceResult<User> {
    require_admin(actor)?;

    if actor.id == target_id {
        return Err(ServiceError::Forbidden(
            "You cannot change your own role or status".to_string(),
        ));
    }

    let target = store
        .find_user(target_id)
        .await?
        .ok_or(ServiceError::NotFound("User"))?;

    if !can_manage_user(actor, &target) {
        return Err(ServiceError::Forbidden(
            "Only a super admin can modify an administrator".to_string(),
        ));
    }

    if let Some(role) = update.role {
        if !can_assign_role(actor, role) {
            return Err(ServiceError::Forbidden(format!(
                "Only a super admin can grant the {} role",
                role.as_str()
            )));
        }
    }

    if let Some(permissions) = update.permissions.take() {
        if let Some(unknown) = permissions.iter().find(|p| !is_known_permission(p)) {
            return Err(ServiceError::Validation(format!(
                "Unknown permission: {unknown}"
            )));
        }
        let unique: BTreeSet<String> = permissions.into_iter().collect();
        update.permissions = Some(unique.into_iter().collect());
    }

    let updated = store
        .update_access(target_id, update)
        .await?
        .ok_or(ServiceError::NotFound("User"))?;

    info!(
        user_id = %updated.id,
        actor_id = %actor.id,
        role = updated.role.as_str(),
        status = updated.status.as_str(),
        "User access updated"
    );

    Ok(updated)
}

/// Deletes an account that no payment or ledger entry references
pub async fn delete(store: &dyn Store, actor: &User, target_id: Uuid) -> ServiceResult<()> {
    require_admin(actor)?;

    if actor.id == target_id {
        return Err(ServiceError::Forbidden(
            "You cannot delete your own account".to_string(),
        ));
    }

    let target = store
        .find_user(target_id)
        .await?
        .ok_or(ServiceError::NotFound("User"))?;

    if !can_manage_user(actor, &target) {
        return Err(ServiceError::Forbidden(
            "Only a super admin can delete an administrator".to_string(),
        ));
    }

    match store.delete_user(target_id).await {
        Ok(true) => {
            info!(user_id = %target_id, actor_id = %actor.id, "User deleted");
            Ok(())
        }
        Ok(false) => Err(ServiceError::NotFound("User")),
        Err(StoreError::Conflict(message)) if message == STILL_REFERENCED => Err(
            ServiceError::Conflict("User has payments or ledger entries and cannot be deleted".into()),
        ),
        Err(e) => Err(e.into()),
    }
}

/// Creates an ACTIVE super admin with `email` unless that account exists
///
/// Returns the created account, or `None` when it already existed.
pub async fn bootstrap_super_admin(
    store: &dyn Store,
    name: &str,
    email: &str,
    password: &str,
) -> ServiceResult<Option<User>> {
    if store.find_user_by_email(email).await?.is_some() {
        return Ok(None);
    }

    validate_password_strength(password).map_err(ServiceError::Validation)?;
    let password_hash =
        hash_password(password).map_err(|e| ServiceError::Validation(e.to_string()))?;

    let user = store
        .create_user(CreateUser {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            address: None,
            password_hash,
            role: UserRole::SuperAdmin,
            status: UserStatus::Active,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "Bootstrapped super admin account");
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::{generate_transaction_id, CreatePayment, PaymentMethod, PaymentPurpose};
    use crate::store::{MemoryStore, PaymentStore, UserStore};

    async fn user(store: &MemoryStore, role: UserRole) -> User {
        store
            .create_user(CreateUser {
                name: format!("{} user", role.as_str()),
                email: format!("{}@example.com", Uuid::new_v4()),
                phone: None,
                address: None,
                password_hash: "hash".to_string(),
                role,
                status: UserStatus::Active,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_admin_cannot_touch_admins_or_grant_admin() {
        let store = MemoryStore::new();
        let admin = user(&store, UserRole::Admin).await;
        let other_admin = user(&store, UserRole::Admin).await;
        let member = user(&store, UserRole::Member).await;

        let err = update_access(
            &store,
            &admin,
            other_admin.id,
            AccessUpdate {
                status: Some(UserStatus::Suspended),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = update_access(
            &store,
            &admin,
            member.id,
            AccessUpdate {
                role: Some(UserRole::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let updated = update_access(
            &store,
            &admin,
            member.id,
            AccessUpdate {
                status: Some(UserStatus::Suspended),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.status, UserStatus::Suspended);
    }

    #[tokio::test]
    async fn test_super_admin_promotes_and_dedupes_permissions() {
        let store = MemoryStore::new();
        let root = user(&store, UserRole::SuperAdmin).await;
        let member = user(&store, UserRole::Member).await;

        let updated = update_access(
            &store,
            &root,
            member.id,
            AccessUpdate {
                role: Some(UserRole::Admin),
                permissions: Some(vec![
                    "view_analytics".to_string(),
                    "manage_projects".to_string(),
                    "view_analytics".to_string(),
                ]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.role, UserRole::Admin);
        assert_eq!(updated.permissions, vec!["manage_projects", "view_analytics"]);
    }

    #[tokio::test]
    async fn test_unknown_permission_is_rejected() {
        let store = MemoryStore::new();
        let root = user(&store, UserRole::SuperAdmin).await;
        let member = user(&store, UserRole::Member).await;

        let err = update_access(
            &store,
            &root,
            member.id,
            AccessUpdate {
                permissions: Some(vec!["launch_rockets".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_self_changes_are_refused() {
        let store = MemoryStore::new();
        let root = user(&store, UserRole::SuperAdmin).await;

        let err = update_access(&store, &root, root.id, AccessUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = delete(&store, &root, root.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_delete_refused_while_referenced() {
        let store = MemoryStore::new();
        let root = user(&store, UserRole::SuperAdmin).await;
        let donor = user(&store, UserRole::User).await;
        let bystander = user(&store, UserRole::User).await;

        store
            .create_payment(CreatePayment {
                user_id: donor.id,
                project_id: None,
                amount: 500,
                method: PaymentMethod::Sslcommerz,
                purpose: PaymentPurpose::MonthlyDonation,
                transaction_id: generate_transaction_id(),
            })
            .await
            .unwrap();

        let err = delete(&store, &root, donor.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        delete(&store, &root, bystander.id).await.unwrap();
        assert!(store.find_user(bystander.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_profile_name_is_rejected() {
        let store = MemoryStore::new();
        let member = user(&store, UserRole::Member).await;

        let err = update_profile(
            &store,
            &member,
            ProfileUpdate {
                name: Some("  ".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let updated = update_profile(
            &store,
            &member,
            ProfileUpdate {
                phone: Some("01700000000".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.phone.as_deref(), Some("01700000000"));
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let store = MemoryStore::new();

        let created = bootstrap_super_admin(&store, "Root", "root@example.org", "changeme")
            .await
            .unwrap();
        let created = created.unwrap();
        assert_eq!(created.role, UserRole::SuperAdmin);
        assert_eq!(created.status, UserStatus::Active);

        let again = bootstrap_super_admin(&store, "Root", "root@example.org", "changeme")
            .await
            .unwrap();
        assert!(again.is_none());
    }
}
