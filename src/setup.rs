use anyhow::{anyhow, Result};
use log::debug;
use std::sync::Arc;

use crate::cli_args::Provider;
use crate::config::Config;
use reviewbot::llm::LlmClient;
use reviewbot::llm::ollama::OllamaClient;
use reviewbot::llm::openai::OpenAiClient;
use reviewbot::llm::responses::ResponsesClient;

/// Build the LLM client once for the whole process.
pub fn build_llm_client(cfg: &Config) -> Result<Arc<dyn LlmClient>> {
    let api_key = || {
        cfg.api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY (or --api-key) is required for the {:?} provider", cfg.provider))
    };

    let client: Arc<dyn LlmClient> = match cfg.provider {
        Provider::Openai => {
            debug!("Using OpenAiClient with model: {}", cfg.model);
            Arc::new(OpenAiClient::new(api_key()?, cfg.model.clone(), cfg.base_url.clone(), cfg.timeout)?)
        }
        Provider::Responses => {
            debug!("Using ResponsesClient with model: {}", cfg.model);
            Arc::new(ResponsesClient::new(api_key()?, cfg.model.clone(), cfg.base_url.clone(), cfg.timeout)?)
        }
        Provider::Ollama => {
            debug!("Using OllamaClient at {} with model: {}", cfg.base_url, cfg.model);
            Arc::new(OllamaClient::new(cfg.base_url.clone(), cfg.model.clone(), cfg.timeout)?)
        }
    };

    Ok(client)
}

/// Stand-in for runs that must never reach a provider (dry runs).
pub struct NoopClient;

impl LlmClient for NoopClient {
    fn complete(&self, _messages: &[reviewbot::ChatMessage]) -> Result<String> {
        Err(anyhow!("model calls are disabled for this run"))
    }

    fn model_id(&self) -> &str {
        "none"
    }
}
