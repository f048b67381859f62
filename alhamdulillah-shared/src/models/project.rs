//! Foundation projects and their members
//!
//! `member_count` is derived from `project_members` on every read.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::pagination::{Page, PageRequest};

pub const DEFAULT_CATEGORY: &str = "Agriculture";
pub const DEFAULT_MEMBER_ROLE: &str = "Member";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Upcoming,
    Ongoing,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Upcoming => "UPCOMING",
            ProjectStatus::Ongoing => "ONGOING",
            ProjectStatus::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub location: Option<String>,
    pub contact_number: Option<String>,
    pub thumbnail: Option<String>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    /// Whole BDT
    pub initial_investment: i64,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateProject {
    pub name: String,
    pub description: String,
    pub category: String,
    pub location: Option<String>,
    pub contact_number: Option<String>,
    pub thumbnail: Option<String>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub initial_investment: i64,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
}

/// Partial update; `None` leaves a field untouched
/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub contact_number: Option<String>,
    pub thumbnail: Option<String>,
    pub images: Option<Vec<String>>,
    pub videos: Option<Vec<String>>,
    pub initial_investment: Option<i64>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl UpdateProject {
    /// Applies the update to an in-memory project
    pub fn apply(self, project: &mut Project) {
        if let Some(name) = self.name {
            project.name = name;
        }
        if let Some(description) = self.description {
            project.description = description;
        }
        if let Some(category) = self.category {
            project.category = category;
        }
        if let Some(images) = self.images {
            project.images = images;
        }
        if let Some(videos) = self.videos {
            project.videos = videos;
        }
        if let Some(investment) = self.initial_investment {
            project.initial_investment = investment;
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        project.location = self.location.or(project.location.take());
        project.contact_number = self.contact_number.or(project.contact_number.take());
        project.thumbnail = self.thumbnail.or(project.thumbnail.take());
        project.start_date = self.start_date.or(project.start_date);
        project.end_date = self.end_date.or(project.end_date);
        project.updated_at = Utc::now();
    }
}

/// Checks that a date range is ordered
pub fn dates_are_ordered(start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    match (start, end) {
        (Some(start), Some(end)) => end >= start,
        _ => true,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    /// Case-insensitive substring of name, category or location
    pub search: Option<String>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        if let Some(status) = self.status {
            if project.status != status {
                return false;
            }
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                project.name.to_lowercase().contains(&term)
                    || project.category.to_lowercase().contains(&term)
                    || project
                        .location
                        .as_deref()
                        .is_some_and(|l| l.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

/// A member together with the user's identity fields
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMemberDetail {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Number of projects in one status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: ProjectStatus,
    pub count: i64,
}

const SELECT_PROJECT: &str = r#"
    SELECT p.*, (SELECT COUNT(*) FROM project_members m WHERE m.project_id = p.id) AS member_count
    FROM projects p
"#;

impl Project {
    pub async fn create(pool: &PgPool, data: CreateProject) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            WITH p AS (
                INSERT INTO projects (id, name, description, category, location, contact_number,
                                      thumbnail, images, videos, initial_investment, status,
                                      start_date, end_date, created_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                RETURNING *
            )
            SELECT p.*, 0::BIGINT AS member_count FROM p
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.category)
        .bind(&data.location)
        .bind(&data.contact_number)
        .bind(&data.thumbnail)
        .bind(&data.images)
        .bind(&data.videos)
        .bind(data.initial_investment)
        .bind(data.status)
        .bind(data.start_date)
        .bind(data.end_date)
        .bind(data.created_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!("{SELECT_PROJECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            WITH p AS (
                UPDATE projects
                SET name = COALESCE($2, name),
                    description = COALESCE($3, description),
                    category = COALESCE($4, category),
                    location = COALESCE($5, location),
                    contact_number = COALESCE($6, contact_number),
                    thumbnail = COALESCE($7, thumbnail),
                    images = COALESCE($8, images),
                    videos = COALESCE($9, videos),
                    initial_investment = COALESCE($10, initial_investment),
                    status = COALESCE($11, status),
                    start_date = COALESCE($12, start_date),
                    end_date = COALESCE($13, end_date),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
            )
            SELECT p.*, (SELECT COUNT(*) FROM project_members m WHERE m.project_id = p.id) AS member_count
            FROM p
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.category)
        .bind(data.location)
        .bind(data.contact_number)
        .bind(data.thumbnail)
        .bind(data.images)
        .bind(data.videos)
        .bind(data.initial_investment)
        .bind(data.status)
        .bind(data.start_date)
        .bind(data.end_date)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists projects newest first
    pub async fn list(
        pool: &PgPool,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        const WHERE: &str = r#"
            WHERE ($1::project_status IS NULL OR p.status = $1)
              AND ($2::text IS NULL
                   OR p.name ILIKE '%' || $2 || '%'
                   OR p.category ILIKE '%' || $2 || '%'
                   OR p.location ILIKE '%' || $2 || '%')
        "#;

        let projects = sqlx::query_as::<_, Project>(&format!(
            "{SELECT_PROJECT} {WHERE} ORDER BY p.created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.status)
        .bind(&filter.search)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM projects p {WHERE}"))
            .bind(filter.status)
            .bind(&filter.search)
            .fetch_one(pool)
            .await?;

        Ok(Page::new(projects, page, total.0))
    }

    pub async fn count_by_status(pool: &PgPool) -> Result<Vec<StatusCount>, sqlx::Error> {
        sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM projects GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await
    }
}

impl ProjectMember {
    /// Adds a member; fails on the primary key if already present
    pub async fn add(
        pool: &PgPool,
        project_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            r#"
            INSERT INTO project_members (project_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_project(
        pool: &PgPool,
        project_id: Uuid,
    ) -> Result<Vec<ProjectMemberDetail>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMemberDetail>(
            r#"
            SELECT m.project_id, m.user_id, m.role, m.joined_at, u.name, u.email, u.phone
            FROM project_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.project_id = $1
            ORDER BY m.joined_at
            "#,
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    pub async fn remove(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
