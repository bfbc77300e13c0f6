use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::eligibility::{evaluate, Decision, GenerationMode, SkipReason, Thresholds};
use crate::error::{Result, SummaryError};
use crate::llm::prompt_builder::{build_prompt, PromptInput};
use crate::llm::{self, LlmClient};
use crate::review::ReviewStore;
use crate::settings::Settings;
use crate::stats::ReviewStats;
use crate::summary::{ReviewSummary, SummaryStore, SummaryUpdate};
use crate::target::SummaryTarget;

/// Per-call overrides, used by operator tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Build the prompt but skip the model call and every write.
    pub dry_run: bool,
    /// Cap the prompt window below the configured maximum.
    pub max_reviews: Option<usize>,
    /// Cold-start threshold for this call.
    pub initial_threshold: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    NoEligibleReviews,
    BelowThreshold {
        mode: GenerationMode,
        have: usize,
        need: usize,
    },
    DryRun {
        mode: GenerationMode,
        review_ids: Vec<i64>,
        eligible: usize,
        prompt_chars: usize,
    },
    /// The provider produced nothing; stored state is unchanged.
    ProviderUnavailable,
    Updated {
        mode: GenerationMode,
        last_review_id: i64,
        source_review_count: i64,
        window: usize,
    },
}

/// One mutex per target key. Holders of a target's mutex are the only ones
/// allowed to evaluate and write that target's summary in this process.
#[derive(Default)]
struct TargetLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TargetLocks {
    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().map_or(0, |map| map.len())
    }

    fn handle(&self, target: &SummaryTarget) -> Result<Arc<Mutex<()>>> {
        let mut map = self
            .inner
            .lock()
            .map_err(|e| SummaryError::LockPoisoned(e.to_string()))?;
        // Entries only the map still references have no holder or waiter.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(Arc::clone(map.entry(target.lock_key()).or_default()))
    }
}

/// Decides, generates and writes review summaries.
///
/// All collaborators are injected; a process builds one `Refresher` and
/// shares it (behind an `Arc`) with every worker.
pub struct Refresher {
    reviews: Arc<dyn ReviewStore>,
    summaries: Arc<dyn SummaryStore>,
    llm: Arc<dyn LlmClient>,
    settings: Settings,
    locks: TargetLocks,
}

impl Refresher {
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        summaries: Arc<dyn SummaryStore>,
        llm: Arc<dyn LlmClient>,
        settings: Settings,
    ) -> Self {
        Refresher {
            reviews,
            summaries,
            llm,
            settings,
            locks: TargetLocks::default(),
        }
    }

    /// True when no summary text has been stored for `target` yet.
    pub fn is_missing(&self, target: &SummaryTarget) -> Result<bool> {
        Ok(!self
            .summaries
            .get(target)?
            .is_some_and(|record| record.has_text()))
    }

    /// Bring the summary for `target` up to date if enough new review signal
    /// has accumulated.
    pub fn refresh(&self, target: &SummaryTarget, opts: &RefreshOptions) -> Result<RefreshOutcome> {
        // Held until the write below lands. A second refresher for the same
        // target waits here and then loads reviews and record afresh.
        let handle = self.locks.handle(target)?;
        let _held = handle.lock().unwrap_or_else(PoisonError::into_inner);

        let eligible = self
            .reviews
            .eligible_reviews(target, self.settings.toxicity_threshold)?;
        if eligible.is_empty() {
            log::debug!("{target}: no eligible reviews, nothing to summarize");
            return Ok(RefreshOutcome::NoEligibleReviews);
        }

        // Checked before any record exists so a vanished target leaves no row.
        let info = self
            .reviews
            .describe(target)?
            .ok_or_else(|| SummaryError::TargetNotFound(target.lock_key()))?;

        let record = if opts.dry_run {
            self.summaries
                .get(target)?
                .unwrap_or_else(|| ReviewSummary::empty(*target))
        } else {
            self.summaries.ensure_record(target)?
        };

        let thresholds = Thresholds {
            initial: opts.initial_threshold.unwrap_or(self.settings.initial_threshold),
            delta: self.settings.trigger_delta,
            max_reviews: opts
                .max_reviews
                .map_or(self.settings.max_reviews_in_prompt, |n| {
                    n.min(self.settings.max_reviews_in_prompt)
                }),
        };

        let (mode, window) = match evaluate(&record, &eligible, thresholds) {
            Decision::Skip(SkipReason::NoEligibleReviews) => {
                return Ok(RefreshOutcome::NoEligibleReviews);
            }
            Decision::Skip(SkipReason::BelowThreshold { mode, have, need }) => {
                log::info!(
                    "{target}: below threshold for {} ({have} of {need} reviews)",
                    mode.as_str()
                );
                return Ok(RefreshOutcome::BelowThreshold { mode, have, need });
            }
            Decision::Generate { mode, window } => (mode, window),
        };

        let stats = ReviewStats::from_reviews(&eligible);

        let payload = build_prompt(
            PromptInput {
                info: &info,
                window,
                stats: &stats,
                previous_summary: &record.summary_text,
                mode,
            },
            &self.settings,
            Utc::now(),
        )?;

        if opts.dry_run {
            return Ok(RefreshOutcome::DryRun {
                mode,
                review_ids: payload.metadata.review_ids,
                eligible: eligible.len(),
                prompt_chars: payload.messages.iter().map(|m| m.content.chars().count()).sum(),
            });
        }

        log::info!(
            "{target}: generating {} summary for {} from {} of {} reviews",
            mode.as_str(),
            info.label(),
            window.len(),
            eligible.len()
        );

        let Some(text) = llm::invoke(self.llm.as_ref(), &payload.messages, target) else {
            return Ok(RefreshOutcome::ProviderUnavailable);
        };

        // `evaluate` never hands out an empty window.
        let last_review_id = window[window.len() - 1].id;
        let update = SummaryUpdate {
            summary_text: text,
            model: self.llm.model_id().to_string(),
            source_review_count: eligible.len() as i64,
            last_review_id,
            source_metadata: serde_json::to_value(&payload.metadata)?,
            updated_at: Utc::now(),
        };

        let saved = self.summaries.persist(&record, &update)?;
        log::info!(
            "{target}: summary updated (last_review_id {:?} -> {last_review_id})",
            record.last_review_id
        );

        Ok(RefreshOutcome::Updated {
            mode,
            last_review_id,
            source_review_count: saved.source_review_count,
            window: window.len(),
        })
    }
}
