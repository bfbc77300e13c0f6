use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::eligibility::GenerationMode;
use crate::error::Result;
use crate::llm::{prompts, ChatMessage};
use crate::review::{Ratings, Review, TargetInfo};
use crate::settings::Settings;
use crate::stats::ReviewStats;

/// Appended to review text that was cut at the snippet limit.
pub const TRUNCATION_MARKER: &str = "…";

/// Everything the prompt is built from. The window must be non-empty and
/// ascending by id; `stats` covers the full eligible set.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub info: &'a TargetInfo,
    pub window: &'a [Review],
    pub stats: &'a ReviewStats,
    pub previous_summary: &'a str,
    pub mode: GenerationMode,
}

/// What gets stored in `source_metadata` next to a generated summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub review_ids: Vec<i64>,
    pub stats: ReviewStats,
    pub mode: GenerationMode,
    pub window_size: usize,
    pub generated_at: DateTime<Utc>,
}

/// A model-ready request plus the audit record describing it.
#[derive(Debug, Clone)]
pub struct PromptPayload {
    pub messages: Vec<ChatMessage>,
    pub metadata: SourceMetadata,
}

#[derive(Serialize)]
struct ReviewSnippet<'a> {
    id: i64,
    semester: Option<&'a str>,
    posted: String,
    ratings: &'a Ratings,
    text: String,
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
    }
}

pub fn build_prompt(input: PromptInput<'_>, settings: &Settings, now: DateTime<Utc>) -> Result<PromptPayload> {
    let reviews: Vec<ReviewSnippet<'_>> = input
        .window
        .iter()
        .map(|r| ReviewSnippet {
            id: r.id,
            semester: r.semester.as_deref(),
            posted: r.created_at.format("%Y-%m-%d").to_string(),
            ratings: &r.ratings,
            text: snippet(&r.text, settings.snippet_chars),
        })
        .collect();

    let themes = match input.info {
        TargetInfo::Course { .. } => prompts::COURSE_THEMES,
        TargetInfo::Club { .. } => prompts::CLUB_THEMES,
    };

    let previous = input.previous_summary.trim();
    let previous = (!previous.is_empty()).then_some(previous);

    let task = match input.mode {
        GenerationMode::ColdStart => "Write the first summary of these reviews.",
        GenerationMode::WarmRefresh => {
            "Revise the previous summary so it also reflects the new reviews below."
        }
    };

    let payload = json!({
        "entity": input.info,
        "stats": input.stats,
        "previous_summary": previous,
        "reviews": reviews,
        "instructions": {
            "task": task,
            "format": "single paragraph, plain text",
            "target_words": settings.target_words,
            "themes": themes,
            "evidence": "only state what the reviews or stats support",
        },
    });

    let user = serde_json::to_string_pretty(&payload)?;

    let metadata = SourceMetadata {
        review_ids: input.window.iter().map(|r| r.id).collect(),
        stats: input.stats.clone(),
        mode: input.mode,
        window_size: input.window.len(),
        generated_at: now,
    };

    Ok(PromptPayload {
        messages: vec![
            ChatMessage::system(prompts::SUMMARY_INSTRUCTIONS),
            ChatMessage::user(user),
        ],
        metadata,
    })
}
