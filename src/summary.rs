use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, SummaryError};
use crate::target::SummaryTarget;

/// Cached summary for one target. An empty `summary_text` means nothing has
/// been generated yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSummary {
    pub id: i64,
    pub target: SummaryTarget,
    pub summary_text: String,
    pub model: Option<String>,
    pub source_review_count: i64,
    /// High-water mark: the largest review id folded into `summary_text`.
    pub last_review_id: Option<i64>,
    pub source_metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewSummary {
    /// An unsaved, never-generated record.
    pub fn empty(target: SummaryTarget) -> Self {
        let now = Utc::now();
        ReviewSummary {
            id: 0,
            target,
            summary_text: String::new(),
            model: None,
            source_review_count: 0,
            last_review_id: None,
            source_metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.summary_text.trim().is_empty()
    }
}

/// Fields written back after a successful generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryUpdate {
    pub summary_text: String,
    pub model: String,
    pub source_review_count: i64,
    pub last_review_id: i64,
    pub source_metadata: Value,
    pub updated_at: DateTime<Utc>,
}

impl SummaryUpdate {
    /// Apply to an in-memory copy of the record.
    pub fn apply_to(&self, record: &mut ReviewSummary) {
        record.summary_text = self.summary_text.clone();
        record.model = Some(self.model.clone());
        record.source_review_count = self.source_review_count;
        record.last_review_id = Some(self.last_review_id);
        record.source_metadata = self.source_metadata.clone();
        record.updated_at = self.updated_at;
    }
}

/// Reject writes that would move the high-water mark backwards or that were
/// computed against a record somebody else has since replaced.
pub(crate) fn check_advance(
    stored: &ReviewSummary,
    seen: &ReviewSummary,
    update: &SummaryUpdate,
) -> Result<()> {
    let regress = stored
        .last_review_id
        .is_some_and(|prev| update.last_review_id < prev);
    if stored.last_review_id != seen.last_review_id || regress {
        return Err(SummaryError::StaleWrite {
            target: stored.target.lock_key(),
            expected: seen.last_review_id,
            attempted: update.last_review_id,
        });
    }
    Ok(())
}

/// Persistence for summary records. Implementations own the uniqueness of one
/// record per target.
pub trait SummaryStore: Send + Sync {
    /// Fetch the record for `target`, creating an empty one if absent, in one
    /// atomic step.
    fn ensure_record(&self, target: &SummaryTarget) -> Result<ReviewSummary>;

    /// Read without creating.
    fn get(&self, target: &SummaryTarget) -> Result<Option<ReviewSummary>>;

    /// Write the generated fields for `record`.
    ///
    /// Fails with `StaleWrite` when the stored `last_review_id` no longer
    /// matches the one in `record`, or when the update would decrease it.
    fn persist(&self, record: &ReviewSummary, update: &SummaryUpdate) -> Result<ReviewSummary>;

    fn list(&self) -> Result<Vec<ReviewSummary>>;
}
