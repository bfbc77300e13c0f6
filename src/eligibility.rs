use serde::{Deserialize, Serialize};

use crate::review::Review;
use crate::summary::ReviewSummary;

/// Whether a generation writes the first summary or extends an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    ColdStart,
    WarmRefresh,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::ColdStart => "cold_start",
            GenerationMode::WarmRefresh => "warm_refresh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoEligibleReviews,
    BelowThreshold {
        mode: GenerationMode,
        have: usize,
        need: usize,
    },
}

#[derive(Debug, PartialEq)]
pub enum Decision<'a> {
    Skip(SkipReason),
    Generate {
        mode: GenerationMode,
        /// Ascending by id, never empty, at most `max_reviews` long.
        window: &'a [Review],
    },
}

/// Thresholds for one evaluation. Zero values are raised to one so an
/// evaluation with nothing new can never produce a window.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub initial: usize,
    pub delta: usize,
    pub max_reviews: usize,
}

impl Thresholds {
    fn normalized(self) -> Self {
        Thresholds {
            initial: self.initial.max(1),
            delta: self.delta.max(1),
            max_reviews: self.max_reviews.max(1),
        }
    }
}

/// Decide whether `record` needs (re)generating given the eligible reviews,
/// which must be sorted by ascending id.
pub fn evaluate<'a>(
    record: &ReviewSummary,
    eligible: &'a [Review],
    thresholds: Thresholds,
) -> Decision<'a> {
    let t = thresholds.normalized();

    if eligible.is_empty() {
        return Decision::Skip(SkipReason::NoEligibleReviews);
    }

    if !record.has_text() {
        if eligible.len() < t.initial {
            return Decision::Skip(SkipReason::BelowThreshold {
                mode: GenerationMode::ColdStart,
                have: eligible.len(),
                need: t.initial,
            });
        }
        // Most recent N, still ascending.
        let start = eligible.len().saturating_sub(t.max_reviews);
        return Decision::Generate {
            mode: GenerationMode::ColdStart,
            window: &eligible[start..],
        };
    }

    let fresh = match record.last_review_id {
        Some(mark) => {
            let first_new = eligible.partition_point(|r| r.id <= mark);
            &eligible[first_new..]
        }
        None => eligible,
    };

    if fresh.len() < t.delta {
        return Decision::Skip(SkipReason::BelowThreshold {
            mode: GenerationMode::WarmRefresh,
            have: fresh.len(),
            need: t.delta,
        });
    }

    // Oldest N of the new ones so the narrative stays chronological.
    let end = fresh.len().min(t.max_reviews);
    Decision::Generate {
        mode: GenerationMode::WarmRefresh,
        window: &fresh[..end],
    }
}
