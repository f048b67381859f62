//! Notices published by administrators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::pagination::{Page, PageRequest};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub file_url: Option<String>,
    pub submitted_by: Option<Uuid>,
    /// Name of the submitting user, joined at read time
    pub submitter_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNotice {
    pub title: String,
    pub content: String,
    pub file_url: Option<String>,
    pub submitted_by: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotice {
    pub title: Option<String>,
    pub content: Option<String>,
    pub file_url: Option<String>,
}

impl Notice {
    pub async fn create(pool: &PgPool, data: CreateNotice) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Notice>(
            r#"
            WITH n AS (
                INSERT INTO notices (id, title, content, file_url, submitted_by)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            )
            SELECT n.*, u.name AS submitter_name FROM n LEFT JOIN users u ON u.id = n.submitted_by
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&data.title)
        .bind(&data.content)
        .bind(&data.file_url)
        .bind(data.submitted_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notice>(
            r#"
            SELECT n.*, u.name AS submitter_name
            FROM notices n LEFT JOIN users u ON u.id = n.submitted_by
            WHERE n.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateNotice,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notice>(
            r#"
            WITH n AS (
                UPDATE notices
                SET title = COALESCE($2, title),
                    content = COALESCE($3, content),
                    file_url = COALESCE($4, file_url),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
            )
            SELECT n.*, u.name AS submitter_name FROM n LEFT JOIN users u ON u.id = n.submitted_by
            "#,
        )
        .bind(id)
        .bind(data.title)
        .bind(data.content)
        .bind(data.file_url)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notices WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists notices newest first
    pub async fn list(pool: &PgPool, page: PageRequest) -> Result<Page<Self>, sqlx::Error> {
        let notices = sqlx::query_as::<_, Notice>(
            r#"
            SELECT n.*, u.name AS submitter_name
            FROM notices n LEFT JOIN users u ON u.id = n.submitted_by
            ORDER BY n.created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notices")
            .fetch_one(pool)
            .await?;

        Ok(Page::new(notices, page, total.0))
    }
}
