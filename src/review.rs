use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::target::SummaryTarget;

/// The five rating dimensions a review can carry. Club reviews typically
/// leave the instructor-specific ones empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Ratings {
    pub instructor_rating: Option<f64>,
    pub difficulty: Option<f64>,
    pub recommendability: Option<f64>,
    pub enjoyability: Option<f64>,
    pub hours_per_week: Option<f64>,
}

/// A single review as the summary refresher sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: i64,
    pub target: SummaryTarget,
    pub text: String,
    pub ratings: Ratings,
    pub hidden: bool,
    pub toxicity: Option<f64>,
    pub semester: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Visible, below the toxicity threshold, and with something to say.
    pub fn is_eligible(&self, toxicity_threshold: f64) -> bool {
        !self.hidden
            && !self.text.trim().is_empty()
            && self.toxicity.unwrap_or(0.0) < toxicity_threshold
    }
}

/// A review to be written into a store. Ids and timestamps are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub target: SummaryTarget,
    pub text: String,
    pub ratings: Ratings,
    pub hidden: bool,
    pub toxicity: Option<f64>,
    pub semester: Option<String>,
}

impl NewReview {
    pub fn new(target: SummaryTarget, text: impl Into<String>) -> Self {
        NewReview {
            target,
            text: text.into(),
            ratings: Ratings::default(),
            hidden: false,
            toxicity: None,
            semester: None,
        }
    }

    pub fn ratings(mut self, ratings: Ratings) -> Self {
        self.ratings = ratings;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn toxicity(mut self, toxicity: f64) -> Self {
        self.toxicity = Some(toxicity);
        self
    }

    pub fn semester(mut self, semester: impl Into<String>) -> Self {
        self.semester = Some(semester.into());
        self
    }
}

/// Human-readable description of a target, used to ground the prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetInfo {
    Course {
        course_code: String,
        course_title: String,
        instructor_name: String,
    },
    Club {
        name: String,
        category: Option<String>,
    },
}

impl TargetInfo {
    pub fn label(&self) -> String {
        match self {
            TargetInfo::Course {
                course_code,
                course_title,
                instructor_name,
            } => format!("{course_code} {course_title} ({instructor_name})"),
            TargetInfo::Club { name, .. } => name.clone(),
        }
    }
}

/// Read-only access to reviews and the entities they belong to.
pub trait ReviewStore: Send + Sync {
    /// Eligible reviews for `target`, ordered by ascending id.
    fn eligible_reviews(&self, target: &SummaryTarget, toxicity_threshold: f64)
    -> Result<Vec<Review>>;

    /// Entity metadata, or `None` when the course/instructor/club is gone.
    fn describe(&self, target: &SummaryTarget) -> Result<Option<TargetInfo>>;

    /// Every target that has at least one review.
    fn targets(&self) -> Result<Vec<SummaryTarget>>;
}
