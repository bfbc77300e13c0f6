use anyhow::{anyhow, Result};
use musli::json;
use musli::{Decode, Encode};
use reqwest::blocking::Client;
use std::time::Duration;

use super::{truncate_for_log, ChatMessage, LlmClient};

#[derive(Debug, Encode, Decode)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Decode)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

/// Synchronous Ollama client using /api/chat.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

fn encode_request(model: &str, messages: &[ChatMessage]) -> Result<String> {
    // Request structs we encode with musli::json.
    #[derive(Debug, Encode)]
    struct ChatRequest {
        model: String,
        stream: bool,
        messages: Vec<OllamaMessage>,
    }

    let req_body = ChatRequest {
        model: model.to_string(),
        stream: false,
        messages: messages
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect(),
    };

    json::to_string(&req_body).map_err(|e| anyhow!("Failed to encode Ollama JSON request: {e}"))
}

impl LlmClient for OllamaClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body_str = encode_request(&self.model, messages)?;

        log::trace!("Ollama request body: {}", truncate_for_log(&body_str, 3000));

        let url = format!("{}/api/chat", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body_str)
            .send()
            .map_err(|e| anyhow!("Error calling Ollama at {url}: {e}"))?
            .error_for_status()
            .map_err(|e| anyhow!("Ollama HTTP error from {url}: {e}"))?;

        let resp_text = resp
            .text()
            .map_err(|e| anyhow!("Failed to read Ollama response body: {e}"))?;

        log::trace!("Ollama raw JSON response: {}", truncate_for_log(&resp_text, 3000));

        let parsed: OllamaChatResponse =
            json::from_str(&resp_text).map_err(|e| anyhow!("Failed to decode Ollama JSON: {e}"))?;

        Ok(parsed.message.content.trim().to_string())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
