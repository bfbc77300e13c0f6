use super::{truncate_for_log, ChatMessage, LlmClient};
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request for the OpenAI Responses API: instructions plus one input text.
#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    input: String,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Responses API implementation of LlmClient.
///
/// System messages become `instructions`; everything else is joined into the
/// single `input` text.
pub struct ResponsesClient {
    client: Client,
    api_key: String,
    model: String,
    api_base_url: String,
}

impl ResponsesClient {
    pub fn new(api_key: String, model: String, api_base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(ResponsesClient {
            client,
            api_key,
            model,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn responses_url(&self) -> String {
        if self.api_base_url.ends_with("/v1") {
            format!("{}/responses", self.api_base_url)
        } else {
            format!("{}/v1/responses", self.api_base_url)
        }
    }
}

fn split_messages(messages: &[ChatMessage]) -> (Option<String>, String) {
    let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
        messages.iter().partition(|m| m.role == "system");

    let instructions = (!system.is_empty()).then(|| {
        system
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    });
    let input = rest
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    (instructions, input)
}

fn extract_text(resp: ResponsesResponse) -> Option<String> {
    if let Some(text) = resp.output_text {
        return Some(text);
    }
    resp.output
        .into_iter()
        .flat_map(|item| item.content)
        .find(|c| c.kind == "output_text")
        .and_then(|c| c.text)
}

impl LlmClient for ResponsesClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let (instructions, input) = split_messages(messages);
        log::trace!("Responses input:\n{}", truncate_for_log(&input, 3000));
        log::info!("Calling OpenAI Responses model {:?}", self.model);

        let req = ResponsesRequest {
            model: &self.model,
            instructions,
            input,
        };

        let resp = self
            .client
            .post(self.responses_url())
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .context("failed to send request to the Responses API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            return Err(anyhow!(
                "Responses API error: HTTP {} - {}",
                status.as_u16(),
                truncate_for_log(&text, 500)
            ));
        }

        let parsed: ResponsesResponse = resp.json().context("failed to parse Responses API response")?;
        extract_text(parsed).ok_or_else(|| anyhow!("Responses API returned no output text"))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
