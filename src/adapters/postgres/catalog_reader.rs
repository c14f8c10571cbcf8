//! PostgreSQL implementation of the CourseCatalog port.
//!
//! Courses and users are owned by the wider platform; this adapter only
//! reads the columns the billing flows need.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{CourseId, DomainError, UserId};
use crate::ports::{CourseCatalog, CourseSummary, UserProfile};

/// PostgreSQL course/user lookups.
pub struct PostgresCourseCatalog {
    pool: PgPool,
}

impl PostgresCourseCatalog {
    /// Creates a new catalog reader backed by the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CourseRow {
    id: Uuid,
    slug: String,
    title: String,
    price_cents: i64,
    is_published: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    display_name: String,
}

#[async_trait]
impl CourseCatalog for PostgresCourseCatalog {
    async fn find_course(&self, id: &CourseId) -> Result<Option<CourseSummary>, DomainError> {
        let row: Option<CourseRow> = sqlx::query_as(
            "SELECT id, slug, title, price_cents, is_published \
             FROM courses WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find course: {}", e)))?;

        Ok(row.map(|r| CourseSummary {
            id: CourseId::from_uuid(r.id),
            slug: r.slug,
            title: r.title,
            price_cents: r.price_cents,
            is_published: r.is_published,
        }))
    }

    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>, DomainError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, display_name FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find user: {}", e)))?;

        Ok(row.map(|r| UserProfile {
            id: UserId::from_uuid(r.id),
            email: r.email,
            display_name: r.display_name,
        }))
    }
}
