use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SummaryError};

/// What a summary is written about: a course taught by one instructor, or a club.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryTarget {
    CourseInstructor { course_id: i64, instructor_id: i64 },
    Club { club_id: i64 },
}

impl SummaryTarget {
    pub fn course(course_id: i64, instructor_id: i64) -> Self {
        SummaryTarget::CourseInstructor {
            course_id,
            instructor_id,
        }
    }

    pub fn club(club_id: i64) -> Self {
        SummaryTarget::Club { club_id }
    }

    /// Build a target from the nullable columns a review row carries.
    ///
    /// Exactly one shape must be populated: the full course/instructor pair,
    /// or the club id.
    pub fn from_parts(
        course_id: Option<i64>,
        instructor_id: Option<i64>,
        club_id: Option<i64>,
    ) -> Result<Self> {
        match (course_id, instructor_id, club_id) {
            (Some(course_id), Some(instructor_id), None) => Ok(Self::course(course_id, instructor_id)),
            (None, None, Some(club_id)) => Ok(Self::club(club_id)),
            (None, None, None) => Err(SummaryError::InvalidTarget(
                "neither course/instructor nor club is set".into(),
            )),
            (_, _, Some(club_id)) => Err(SummaryError::InvalidTarget(format!(
                "club {club_id} combined with a course/instructor"
            ))),
            (course, instructor, None) => Err(SummaryError::InvalidTarget(format!(
                "incomplete course/instructor pair (course={course:?}, instructor={instructor:?})"
            ))),
        }
    }

    /// Canonical key used for per-target locking and log context.
    pub fn lock_key(&self) -> String {
        self.to_string()
    }

    /// The nullable column triple `(course_id, instructor_id, club_id)`.
    pub fn columns(&self) -> (Option<i64>, Option<i64>, Option<i64>) {
        match *self {
            SummaryTarget::CourseInstructor {
                course_id,
                instructor_id,
            } => (Some(course_id), Some(instructor_id), None),
            SummaryTarget::Club { club_id } => (None, None, Some(club_id)),
        }
    }
}

impl fmt::Display for SummaryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryTarget::CourseInstructor {
                course_id,
                instructor_id,
            } => write!(f, "course:{course_id}:instructor:{instructor_id}"),
            SummaryTarget::Club { club_id } => write!(f, "club:{club_id}"),
        }
    }
}
