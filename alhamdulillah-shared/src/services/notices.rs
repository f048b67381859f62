//! Notice board

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::error::{ServiceError, ServiceResult};
use crate::auth::authorization::require_admin;
use crate::models::notice::{CreateNotice, Notice, UpdateNotice};
use crate::models::user::User;
use crate::pagination::{Page, PageRequest};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotice {
    pub title: String,
    pub content: String,
    pub file_url: Option<String>,
}

fn required(value: &str, field: &str) -> ServiceResult<String> {
    match value.trim() {
        "" => Err(ServiceError::Validation(format!("{field} is required"))),
        value => Ok(value.to_string()),
    }
}

/// Newest first
pub async fn list(store: &dyn Store, page: PageRequest) -> ServiceResult<Page<Notice>> {
    Ok(store.list_notices(page).await?)
}

pub async fn get(store: &dyn Store, id: Uuid) -> ServiceResult<Notice> {
    store
        .find_notice(id)
        .await?
        .ok_or(ServiceError::NotFound("Notice"))
}

pub async fn create(store: &dyn Store, actor: &User, input: NewNotice) -> ServiceResult<Notice> {
    require_admin(actor)?;

    let notice = store
        .create_notice(CreateNotice {
            title: required(&input.title, "Title")?,
            content: required(&input.content, "Content")?,
            file_url: input.file_url,
            submitted_by: actor.id,
        })
        .await?;

    info!(notice_id = %notice.id, submitted_by = %actor.id, "Notice published");
    Ok(notice)
}

pub async fn update(
    store: &dyn Store,
    actor: &User,
    id: Uuid,
    mut patch: UpdateNotice,
) -> ServiceResult<Notice> {
    require_admin(actor)?;

    if let Some(title) = patch.title.take() {
        patch.title = Some(required(&title, "Title")?);
    }
    if let Some(content) = patch.content.take() {
        patch.content = Some(required(&content, "Content")?);
    }

    store
        .update_notice(id, patch)
        .await?
        .ok_or(ServiceError::NotFound("Notice"))
}

pub async fn delete(store: &dyn Store, actor: &User, id: Uuid) -> ServiceResult<()> {
    require_admin(actor)?;

    if !store.delete_notice(id).await? {
        return Err(ServiceError::NotFound("Notice"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{CreateUser, UserRole, UserStatus};
    use crate::store::{MemoryStore, UserStore};

    async fn admin(store: &MemoryStore) -> User {
        store
            .create_user(CreateUser {
                name: "Karim".to_string(),
                email: "karim@example.com".to_string(),
                phone: None,
                address: None,
                password_hash: String::new(),
                role: UserRole::Admin,
                status: UserStatus::Active,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_notices_are_listed_newest_first() {
        let store = MemoryStore::new();
        let admin = admin(&store).await;

        for title in ["Eid schedule", "Annual meeting"] {
            create(
                &store,
                &admin,
                NewNotice {
                    title: title.to_string(),
                    content: "Details inside".to_string(),
                    file_url: None,
                },
            )
            .await
            .unwrap();
        }

        let page = list(&store, PageRequest::new(None, None, 10)).await.unwrap();
        let titles: Vec<_> = page.items.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["Annual meeting", "Eid schedule"]);
        assert_eq!(page.items[0].submitter_name.as_deref(), Some("Karim"));
    }

    #[tokio::test]
    async fn test_blank_title_is_rejected() {
        let store = MemoryStore::new();
        let admin = admin(&store).await;

        let err = update(
            &store,
            &admin,
            Uuid::new_v4(),
            UpdateNotice {
                title: Some("   ".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = delete(&store, &admin, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("Notice")));
    }
}
