use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, SummaryError};
use crate::review::{NewReview, Review, ReviewStore, TargetInfo};
use crate::summary::{check_advance, ReviewSummary, SummaryStore, SummaryUpdate};
use crate::target::SummaryTarget;

#[derive(Default)]
struct State {
    reviews: Vec<Review>,
    courses: HashMap<i64, (String, String)>,
    instructors: HashMap<i64, String>,
    clubs: HashMap<i64, (String, Option<String>)>,
    summaries: BTreeMap<SummaryTarget, ReviewSummary>,
    next_review_id: i64,
    next_summary_id: i64,
    persist_calls: usize,
}

/// In-process review and summary store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| SummaryError::LockPoisoned(e.to_string()))
    }

    pub fn add_course(&self, id: i64, code: &str, title: &str) -> Result<()> {
        self.state()?
            .courses
            .insert(id, (code.to_string(), title.to_string()));
        Ok(())
    }

    pub fn add_instructor(&self, id: i64, full_name: &str) -> Result<()> {
        self.state()?.instructors.insert(id, full_name.to_string());
        Ok(())
    }

    pub fn add_club(&self, id: i64, name: &str, category: Option<&str>) -> Result<()> {
        self.state()?
            .clubs
            .insert(id, (name.to_string(), category.map(str::to_string)));
        Ok(())
    }

    pub fn remove_course(&self, id: i64) -> Result<()> {
        self.state()?.courses.remove(&id);
        Ok(())
    }

    /// Insert a review with the next id (ids start at 1 unless
    /// `start_review_ids_at` moved them).
    pub fn insert_review(&self, review: &NewReview) -> Result<i64> {
        let mut state = self.state()?;
        state.next_review_id = state.next_review_id.max(0) + 1;
        let id = state.next_review_id;
        state.reviews.push(Review {
            id,
            target: review.target,
            text: review.text.clone(),
            ratings: review.ratings,
            hidden: review.hidden,
            toxicity: review.toxicity,
            semester: review.semester.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    /// Make the next inserted review get id `first`.
    pub fn start_review_ids_at(&self, first: i64) -> Result<()> {
        self.state()?.next_review_id = first - 1;
        Ok(())
    }

    pub fn set_hidden(&self, review_id: i64, hidden: bool) -> Result<()> {
        let mut state = self.state()?;
        if let Some(review) = state.reviews.iter_mut().find(|r| r.id == review_id) {
            review.hidden = hidden;
        }
        Ok(())
    }

    /// Number of successful `persist` calls so far.
    pub fn persist_calls(&self) -> Result<usize> {
        Ok(self.state()?.persist_calls)
    }
}

impl ReviewStore for MemoryStore {
    fn eligible_reviews(
        &self,
        target: &SummaryTarget,
        toxicity_threshold: f64,
    ) -> Result<Vec<Review>> {
        let state = self.state()?;
        let mut reviews: Vec<Review> = state
            .reviews
            .iter()
            .filter(|r| r.target == *target && r.is_eligible(toxicity_threshold))
            .cloned()
            .collect();
        reviews.sort_by_key(|r| r.id);
        Ok(reviews)
    }

    fn describe(&self, target: &SummaryTarget) -> Result<Option<TargetInfo>> {
        let state = self.state()?;
        let info = match *target {
            SummaryTarget::CourseInstructor {
                course_id,
                instructor_id,
            } => state
                .courses
                .get(&course_id)
                .zip(state.instructors.get(&instructor_id))
                .map(|((code, title), name)| TargetInfo::Course {
                    course_code: code.clone(),
                    course_title: title.clone(),
                    instructor_name: name.clone(),
                }),
            SummaryTarget::Club { club_id } => {
                state.clubs.get(&club_id).map(|(name, category)| TargetInfo::Club {
                    name: name.clone(),
                    category: category.clone(),
                })
            }
        };
        Ok(info)
    }

    fn targets(&self) -> Result<Vec<SummaryTarget>> {
        let state = self.state()?;
        let targets: BTreeSet<SummaryTarget> = state.reviews.iter().map(|r| r.target).collect();
        Ok(targets.into_iter().collect())
    }
}

impl SummaryStore for MemoryStore {
    fn ensure_record(&self, target: &SummaryTarget) -> Result<ReviewSummary> {
        let mut state = self.state()?;
        if let Some(existing) = state.summaries.get(target) {
            return Ok(existing.clone());
        }

        state.next_summary_id += 1;
        let record = ReviewSummary {
            id: state.next_summary_id,
            ..ReviewSummary::empty(*target)
        };
        state.summaries.insert(*target, record.clone());
        Ok(record)
    }

    fn get(&self, target: &SummaryTarget) -> Result<Option<ReviewSummary>> {
        Ok(self.state()?.summaries.get(target).cloned())
    }

    fn persist(&self, record: &ReviewSummary, update: &SummaryUpdate) -> Result<ReviewSummary> {
        let mut state = self.state()?;
        let stored = state
            .summaries
            .get_mut(&record.target)
            .ok_or_else(|| SummaryError::TargetNotFound(record.target.lock_key()))?;
        check_advance(stored, record, update)?;
        update.apply_to(stored);
        let saved = stored.clone();
        state.persist_calls += 1;
        Ok(saved)
    }

    fn list(&self) -> Result<Vec<ReviewSummary>> {
        Ok(self.state()?.summaries.values().cloned().collect())
    }
}
