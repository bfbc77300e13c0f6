use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI options
#[derive(Parser, Debug)]
#[command(
    name = "reviewbot",
    version,
    about = "Keeps LLM-written review summaries fresh for courses, instructors and clubs"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the SQLite database (otherwise REVIEWBOT_DATABASE or the config file)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Config file to read instead of ~/.config/reviewbot.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Text-generation backend
    #[arg(long, value_enum, global = true)]
    pub provider: Option<Provider>,

    /// Model name to use (e.g. gpt-4o-mini, llama3.1)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// API key (otherwise uses OPENAI_API_KEY env var)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Override the provider base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI Chat Completions
    Openai,
    /// OpenAI Responses API
    Responses,
    /// Local Ollama server
    Ollama,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(Provider::Openai),
            "responses" => Some(Provider::Responses),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }
}

/// Selects one target, or every target when nothing is given.
#[derive(Args, Debug, Clone, Default)]
#[command(group(
    ArgGroup::new("target_group")
        .args(["club", "course"])
        .multiple(false)
))]
pub struct TargetArgs {
    /// Club id
    #[arg(long)]
    pub club: Option<i64>,

    /// Course id (requires --instructor)
    #[arg(long, requires = "instructor")]
    pub course: Option<i64>,

    /// Instructor id (requires --course)
    #[arg(long, requires = "course")]
    pub instructor: Option<i64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Regenerate summaries that have enough new reviews
    Refresh {
        #[command(flatten)]
        target: TargetArgs,

        /// Only consider targets that have no summary yet
        #[arg(long)]
        missing_only: bool,

        /// Show what would be generated without calling the model or writing
        #[arg(long)]
        dry_run: bool,

        /// Send at most this many reviews to the model per target
        #[arg(long)]
        max_reviews: Option<usize>,

        /// Eligible reviews required before a first summary is written
        #[arg(long)]
        min_reviews: Option<usize>,
    },

    /// Print stored summaries
    Show {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Run the post-commit hook for existing reviews on background workers
    Notify {
        /// Review ids to report as edited
        #[arg(required = true)]
        review_ids: Vec<i64>,
    },

    /// Create the database schema
    InitDb,
}

impl TargetArgs {
    /// The single target named on the command line, if any.
    pub fn selected(&self) -> reviewbot::Result<Option<reviewbot::SummaryTarget>> {
        if self.club.is_none() && self.course.is_none() && self.instructor.is_none() {
            return Ok(None);
        }
        reviewbot::SummaryTarget::from_parts(self.course, self.instructor, self.club).map(Some)
    }
}
