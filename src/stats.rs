use serde::{Deserialize, Serialize};

use crate::review::Review;

/// Aggregate numbers over every eligible review of a target.
///
/// Always computed over the full eligible set, not the prompt window, so the
/// figures stay stable while the window slides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub review_count: usize,
    pub text_review_count: usize,
    pub avg_instructor_rating: Option<f64>,
    pub avg_difficulty: Option<f64>,
    pub avg_recommendability: Option<f64>,
    pub avg_enjoyability: Option<f64>,
    pub avg_hours_per_week: Option<f64>,
}

impl ReviewStats {
    pub fn from_reviews(reviews: &[Review]) -> Self {
        let mean_of = |pick: fn(&Review) -> Option<f64>| mean(reviews.iter().filter_map(pick));

        ReviewStats {
            review_count: reviews.len(),
            text_review_count: reviews.iter().filter(|r| !r.text.trim().is_empty()).count(),
            avg_instructor_rating: mean_of(|r| r.ratings.instructor_rating),
            avg_difficulty: mean_of(|r| r.ratings.difficulty),
            avg_recommendability: mean_of(|r| r.ratings.recommendability),
            avg_enjoyability: mean_of(|r| r.ratings.enjoyability),
            avg_hours_per_week: mean_of(|r| r.ratings.hours_per_week),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(round2(sum / n as f64))
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::Ratings;
    use crate::target::SummaryTarget;
    use chrono::Utc;

    fn review(id: i64, instructor: Option<f64>, hours: Option<f64>) -> Review {
        Review {
            id,
            target: SummaryTarget::course(1, 1),
            text: format!("review {id}"),
            ratings: Ratings {
                instructor_rating: instructor,
                hours_per_week: hours,
                ..Ratings::default()
            },
            hidden: false,
            toxicity: None,
            semester: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn averages_are_rounded_to_two_places() {
        let reviews = vec![
            review(1, Some(4.0), Some(5.0)),
            review(2, Some(5.0), None),
            review(3, Some(5.0), Some(6.0)),
        ];
        let stats = ReviewStats::from_reviews(&reviews);

        assert_eq!(stats.review_count, 3);
        assert_eq!(stats.text_review_count, 3);
        assert_eq!(stats.avg_instructor_rating, Some(4.67));
        assert_eq!(stats.avg_hours_per_week, Some(5.5));
        assert_eq!(stats.avg_difficulty, None);
    }

    #[test]
    fn empty_set_has_no_means() {
        let stats = ReviewStats::from_reviews(&[]);
        assert_eq!(stats, ReviewStats::default());
    }
}
