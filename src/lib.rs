//! Incremental LLM summaries of course, instructor and club reviews.
//!
//! A [`Refresher`] decides per [`SummaryTarget`] whether enough new eligible
//! reviews have arrived since the stored summary's high-water mark, builds a
//! bounded prompt, asks an [`LlmClient`] for a new paragraph and writes it
//! back. [`SummaryDispatcher`] runs refreshes on background threads after a
//! review write commits.

pub mod eligibility;
pub mod error;
pub mod llm;
pub mod refresher;
pub mod review;
pub mod settings;
pub mod stats;
pub mod store;
pub mod summary;
pub mod target;
pub mod worker;

pub use error::{Result, SummaryError};
pub use llm::{ChatMessage, LlmClient};
pub use refresher::{RefreshOptions, RefreshOutcome, Refresher};
pub use review::{NewReview, Ratings, Review, ReviewStore, TargetInfo};
pub use settings::Settings;
pub use summary::{ReviewSummary, SummaryStore, SummaryUpdate};
pub use target::SummaryTarget;
pub use worker::{ReviewEvent, ReviewEventKind, SummaryDispatcher};
