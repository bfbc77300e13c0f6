pub mod ollama;
pub mod openai;
pub mod prompt_builder;
mod prompts;
pub mod responses;

use anyhow::Result;
use serde::Serialize;

use crate::target::SummaryTarget;

/// Role-tagged message handed to a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Trait for talking to a text-generation provider: messages in, text out.
pub trait LlmClient: Send + Sync {
    /// Run one completion over `messages`.
    fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Model identifier recorded alongside generated summaries.
    fn model_id(&self) -> &str;
}

/// Call the provider, folding every failure and every blank answer into
/// `None`. A failed attempt leaves stored state untouched and the next
/// trigger retries from scratch.
pub fn invoke(client: &dyn LlmClient, messages: &[ChatMessage], target: &SummaryTarget) -> Option<String> {
    match client.complete(messages) {
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                log::warn!("{target}: model {} returned an empty summary", client.model_id());
                None
            } else {
                Some(text.to_string())
            }
        }
        Err(e) => {
            log::error!("{target}: summary generation with {} failed: {e:#}", client.model_id());
            None
        }
    }
}

/// Truncate long strings for debug logging.
pub(crate) fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}...\n[truncated {} bytes]", &s[..cut], s.len() - cut),
    }
}
