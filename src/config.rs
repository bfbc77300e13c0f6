use crate::cli_args::{Cli, Provider};
use anyhow::{anyhow, Context, Result};
use reviewbot::settings::{self, Settings};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Final resolved configuration for reviewbot.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub database: PathBuf,
    pub workers: usize,
    pub settings: Settings,
}

impl Config {
    /// Build the final config from CLI flags, environment, TOML file, and defaults.
    ///
    /// Precedence:
    ///   1. CLI flags (`--provider`, `--model`, `--database`, ...)
    ///   2. Env vars `REVIEWBOT_*` and `OPENAI_API_KEY`
    ///   3. TOML `~/.config/reviewbot.toml` (or `--config`)
    ///   4. Hardcoded defaults
    pub fn from_sources(cli: &Cli) -> Result<Self> {
        let file_cfg = match &cli.config {
            Some(path) => load_file_config(path)?,
            None => default_config_path()
                .filter(|p| p.exists())
                .map(|p| load_file_config(&p))
                .transpose()?
                .unwrap_or_default(),
        };

        let provider = match cli.provider {
            Some(p) => p,
            None => {
                let named = env_var("REVIEWBOT_PROVIDER").or(file_cfg.provider);
                match named {
                    Some(name) => Provider::parse(&name)
                        .ok_or_else(|| anyhow!("unknown provider {name:?} (expected openai, responses or ollama)"))?,
                    None => Provider::Openai,
                }
            }
        };

        let default_model = match provider {
            Provider::Ollama => "llama3.1",
            Provider::Openai | Provider::Responses => "gpt-4o-mini",
        };
        let model = cli
            .model
            .clone()
            .or_else(|| env_var("REVIEWBOT_MODEL"))
            .or(file_cfg.model)
            .unwrap_or_else(|| default_model.to_string());

        // clap already folds OPENAI_API_KEY into `cli.api_key`.
        let api_key = cli.api_key.clone().or(file_cfg.openai_api_key);

        let default_base_url = match provider {
            Provider::Ollama => "http://localhost:11434",
            Provider::Openai | Provider::Responses => "https://api.openai.com",
        };
        let base_url = cli
            .base_url
            .clone()
            .or_else(|| env_var("REVIEWBOT_BASE_URL"))
            .or(file_cfg.base_url)
            .unwrap_or_else(|| default_base_url.to_string());

        let database = cli
            .database
            .clone()
            .or_else(|| env_var("REVIEWBOT_DATABASE").map(PathBuf::from))
            .or(file_cfg.database)
            .unwrap_or_else(|| PathBuf::from("reviewbot.sqlite3"));

        let timeout_secs = env_parse("REVIEWBOT_TIMEOUT_SECS")?
            .or(file_cfg.timeout_secs)
            .unwrap_or(30);

        let workers = env_parse("REVIEWBOT_WORKERS")?
            .or(file_cfg.workers)
            .unwrap_or(2);

        let t = file_cfg.thresholds;
        let settings = Settings {
            initial_threshold: env_parse("REVIEWBOT_INITIAL_THRESHOLD")?
                .or(t.initial_threshold)
                .unwrap_or(settings::DEFAULT_INITIAL_THRESHOLD),
            trigger_delta: env_parse("REVIEWBOT_TRIGGER_DELTA")?
                .or(t.trigger_delta)
                .unwrap_or(settings::DEFAULT_TRIGGER_DELTA),
            max_reviews_in_prompt: env_parse("REVIEWBOT_MAX_REVIEWS_IN_PROMPT")?
                .or(t.max_reviews_in_prompt)
                .unwrap_or(settings::DEFAULT_MAX_REVIEWS_IN_PROMPT),
            snippet_chars: t.snippet_chars.unwrap_or(settings::DEFAULT_SNIPPET_CHARS),
            toxicity_threshold: env_parse("REVIEWBOT_TOXICITY_THRESHOLD")?
                .or(t.toxicity_threshold)
                .unwrap_or(settings::DEFAULT_TOXICITY_THRESHOLD),
            target_words: t.target_words.unwrap_or(settings::DEFAULT_TARGET_WORDS),
        };

        Ok(Config {
            provider,
            model,
            api_key,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            database,
            workers,
            settings,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    /// Default provider when not given via CLI or env.
    provider: Option<String>,
    model: Option<String>,
    openai_api_key: Option<String>,
    base_url: Option<String>,
    database: Option<PathBuf>,
    timeout_secs: Option<u64>,
    workers: Option<usize>,
    #[serde(default)]
    thresholds: FileThresholds,
}

#[derive(Debug, Default, Deserialize)]
struct FileThresholds {
    initial_threshold: Option<usize>,
    trigger_delta: Option<usize>,
    max_reviews_in_prompt: Option<usize>,
    snippet_chars: Option<usize>,
    toxicity_threshold: Option<f64>,
    target_words: Option<usize>,
}

/// Return `~/.config/reviewbot.toml`
fn default_config_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".config").join("reviewbot.toml"))
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str::<FileConfig>(&data)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_var(key)
        .map(|v| v.trim().parse::<T>().with_context(|| format!("invalid value for {key}: {v:?}")))
        .transpose()
}
