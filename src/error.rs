use thiserror::Error;

/// Errors surfaced by the summary refresher.
///
/// Provider failures never show up here: adapters report them as `anyhow`
/// errors and `llm::invoke` turns them into "no text produced".
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("invalid summary target: {0}")]
    InvalidTarget(String),

    #[error("summary target {0} no longer exists")]
    TargetNotFound(String),

    #[error("summary for {target} moved on (expected last_review_id {expected:?}, refusing to write {attempted})")]
    StaleWrite {
        target: String,
        expected: Option<i64>,
        attempted: i64,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("failed to encode summary metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("summary worker queue is closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, SummaryError>;
