/// Tunables for eligibility and prompt construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Eligible reviews needed before a first summary is written.
    pub initial_threshold: usize,
    /// New eligible reviews (past the high-water mark) needed to refresh.
    pub trigger_delta: usize,
    /// Upper bound on reviews sent to the model in one request.
    pub max_reviews_in_prompt: usize,
    /// Characters kept from each review before the truncation marker.
    pub snippet_chars: usize,
    /// Reviews scoring at or above this are left out.
    pub toxicity_threshold: f64,
    /// Word count the model is asked to aim for.
    pub target_words: usize,
}

pub const DEFAULT_INITIAL_THRESHOLD: usize = 3;
pub const DEFAULT_TRIGGER_DELTA: usize = 3;
pub const DEFAULT_MAX_REVIEWS_IN_PROMPT: usize = 40;
pub const DEFAULT_SNIPPET_CHARS: usize = 350;
pub const DEFAULT_TOXICITY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_TARGET_WORDS: usize = 140;

impl Default for Settings {
    fn default() -> Self {
        Settings {
            initial_threshold: DEFAULT_INITIAL_THRESHOLD,
            trigger_delta: DEFAULT_TRIGGER_DELTA,
            max_reviews_in_prompt: DEFAULT_MAX_REVIEWS_IN_PROMPT,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
            toxicity_threshold: DEFAULT_TOXICITY_THRESHOLD,
            target_words: DEFAULT_TARGET_WORDS,
        }
    }
}
