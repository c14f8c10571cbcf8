//! Course catalog port (read side).
//!
//! The checkout and notification flows only need summaries of courses and
//! users; catalog CRUD itself lives outside this service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CourseId, DomainError, UserId};

/// Summary of a purchasable course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    /// Course identifier.
    pub id: CourseId,

    /// URL slug for course links.
    pub slug: String,

    /// Display title.
    pub title: String,

    /// Price in cents.
    pub price_cents: i64,

    /// Only published courses can be purchased.
    pub is_published: bool,
}

/// Profile fields needed to address a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User identifier.
    pub id: UserId,

    /// Email address for notifications and checkout prefill.
    pub email: String,

    /// Name shown in email greetings.
    pub display_name: String,
}

/// Read-only lookups against the platform catalog.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Find a course by id.
    ///
    /// Returns `None` for unknown ids.
    async fn find_course(&self, id: &CourseId) -> Result<Option<CourseSummary>, DomainError>;

    /// Find a user profile by id.
    ///
    /// Returns `None` for unknown ids.
    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>, DomainError>;
}
