//! Enrollment grant entity.
//!
//! An Enrollment makes a course available to a user. There is at most one
//! row per (user, course) pair, ever; re-purchase after a deactivation
//! flips `is_active` back on instead of creating a duplicate.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CourseId, Percentage, Timestamp, UserId};

/// Enrollment - course access grant for one user.
///
/// # Invariants
///
/// - Unique per (user, course); enforced by the persistence layer's unique
///   constraint and by upsert semantics in the completion routine
/// - Never deleted; access is revoked by `is_active = false`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// User holding the grant.
    pub user_id: UserId,

    /// Course the grant is for.
    pub course_id: CourseId,

    /// When the user first enrolled.
    pub enrolled_at: Timestamp,

    /// Whether the grant currently allows access.
    pub is_active: bool,

    /// Course completion progress.
    pub progress: Percentage,

    /// When the user finished the course, if they did.
    pub completed_at: Option<Timestamp>,
}

impl Enrollment {
    /// Create an active enrollment on first successful order completion.
    pub fn new(user_id: UserId, course_id: CourseId, at: Timestamp) -> Self {
        Self {
            user_id,
            course_id,
            enrolled_at: at,
            is_active: true,
            progress: Percentage::ZERO,
            completed_at: None,
        }
    }

    /// Reactivate the grant after a subsequent completion.
    ///
    /// Idempotent; progress and enrollment date are preserved.
    pub fn reactivate(&mut self) {
        self.is_active = true;
    }

    /// Revoke access without deleting the row.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Record course progress, stamping completion at 100%.
    pub fn record_progress(&mut self, progress: Percentage, at: Timestamp) {
        self.progress = progress;
        if progress.is_complete() && self.completed_at.is_none() {
            self.completed_at = Some(at);
        }
    }
}
