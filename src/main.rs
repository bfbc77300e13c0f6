mod cli_args;
mod config;
mod logging;
mod setup;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use cli_args::{Cli, Command, TargetArgs};
use config::Config;
use reviewbot::store::SqliteStore;
use reviewbot::{
    LlmClient, RefreshOptions, RefreshOutcome, Refresher, ReviewEvent, ReviewEventKind,
    ReviewStore, ReviewSummary, SummaryDispatcher, SummaryStore, SummaryTarget,
};

/// Tallies for the end-of-run line.
#[derive(Debug, Default)]
struct RefreshTally {
    updated: usize,
    skipped: usize,
    dry_run: usize,
    failed: usize,
}

fn describe_outcome(target: &SummaryTarget, outcome: &RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::Updated {
            mode,
            last_review_id,
            source_review_count,
            window,
        } => format!(
            "{} {target}: {} from {window} reviews ({source_review_count} eligible, last_review_id {last_review_id})",
            "updated".green().bold(),
            mode.as_str()
        ),
        RefreshOutcome::BelowThreshold { mode, have, need } => format!(
            "{} {target}: below {} threshold ({have}/{need})",
            "skipped".bright_black(),
            mode.as_str()
        ),
        RefreshOutcome::NoEligibleReviews => {
            format!("{} {target}: no eligible reviews", "skipped".bright_black())
        }
        RefreshOutcome::DryRun {
            mode,
            review_ids,
            eligible,
            prompt_chars,
        } => format!(
            "{} {target}: would run {} with reviews {review_ids:?} ({eligible} eligible, {prompt_chars} prompt chars)",
            "dry-run".cyan().bold(),
            mode.as_str()
        ),
        RefreshOutcome::ProviderUnavailable => format!(
            "{} {target}: provider returned no text, summary left unchanged",
            "failed".red().bold()
        ),
    }
}

/// Batch mode: walk one or all targets through the refresher, reporting each
/// and carrying on past failures.
fn run_refresh(
    cfg: &Config,
    store: Arc<SqliteStore>,
    target: &TargetArgs,
    missing_only: bool,
    opts: RefreshOptions,
) -> Result<()> {
    let llm: Arc<dyn LlmClient> = if opts.dry_run {
        Arc::new(setup::NoopClient)
    } else {
        setup::build_llm_client(cfg)?
    };

    let refresher = Refresher::new(store.clone(), store.clone(), llm, cfg.settings.clone());

    let mut targets = match target.selected()? {
        Some(t) => vec![t],
        None => store.targets()?,
    };
    if missing_only {
        let mut missing = Vec::with_capacity(targets.len());
        for t in targets {
            if refresher.is_missing(&t)? {
                missing.push(t);
            }
        }
        targets = missing;
    }

    if targets.is_empty() {
        println!("No targets to refresh.");
        return Ok(());
    }

    log::info!("Refreshing {} target(s)", targets.len());

    let pb = ProgressBar::new(targets.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );

    let mut tally = RefreshTally::default();
    for t in &targets {
        pb.set_message(t.to_string());
        match refresher.refresh(t, &opts) {
            Ok(outcome) => {
                match outcome {
                    RefreshOutcome::Updated { .. } => tally.updated += 1,
                    RefreshOutcome::DryRun { .. } => tally.dry_run += 1,
                    RefreshOutcome::ProviderUnavailable => tally.failed += 1,
                    RefreshOutcome::BelowThreshold { .. } | RefreshOutcome::NoEligibleReviews => {
                        tally.skipped += 1
                    }
                }
                pb.suspend(|| println!("{}", describe_outcome(t, &outcome)));
            }
            Err(e) => {
                tally.failed += 1;
                pb.suspend(|| println!("{} {t}: {e}", "failed".red().bold()));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "Done: {} updated, {} skipped, {} dry-run, {} failed.",
        tally.updated, tally.skipped, tally.dry_run, tally.failed
    );

    if tally.failed > 0 {
        bail!("{} of {} target(s) failed", tally.failed, targets.len());
    }
    Ok(())
}

/// Feed review ids through the background dispatcher, the same way the web
/// layer does after a review write commits.
fn run_notify(cfg: &Config, store: Arc<SqliteStore>, review_ids: &[i64]) -> Result<()> {
    let llm = setup::build_llm_client(cfg)?;
    let refresher = Arc::new(Refresher::new(
        store.clone(),
        store.clone(),
        llm,
        cfg.settings.clone(),
    ));
    let dispatcher = SummaryDispatcher::start(refresher, cfg.workers);

    let mut queued = 0;
    for &id in review_ids {
        let Some((course_id, instructor_id, club_id)) = store.review_columns(id)? else {
            println!("{} review {id}: not found", "skipped".bright_black());
            continue;
        };
        let event = ReviewEvent {
            review_id: id,
            course_id,
            instructor_id,
            club_id,
            kind: ReviewEventKind::Edited,
        };
        if dispatcher.notify(&event)? {
            queued += 1;
        }
    }

    log::info!("Waiting for {} queued refresh(es)", queued);
    dispatcher.shutdown();
    println!("Done: {queued} target(s) processed in the background.");
    Ok(())
}

fn print_summary(record: &ReviewSummary) {
    println!("{}", record.target.to_string().bold());
    println!(
        "  model: {}  reviews: {}  last_review_id: {}  updated: {}",
        record.model.as_deref().unwrap_or("-"),
        record.source_review_count,
        record
            .last_review_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        record.updated_at.format("%Y-%m-%d %H:%M")
    );
    if record.has_text() {
        println!("  {}", record.summary_text);
    } else {
        println!("  {}", "(not generated yet)".bright_black());
    }
    println!();
}

fn run_show(store: &SqliteStore, target: &TargetArgs) -> Result<()> {
    match target.selected()? {
        Some(t) => match store.get(&t)? {
            Some(record) => print_summary(&record),
            None => println!("No summary stored for {t}."),
        },
        None => {
            let all = store.list()?;
            if all.is_empty() {
                println!("No summaries stored.");
            }
            for record in &all {
                print_summary(record);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    let cfg = Config::from_sources(&cli)?;
    log::debug!("Using database {}", cfg.database.display());

    let store = Arc::new(
        SqliteStore::open(&cfg.database)
            .with_context(|| format!("failed to open database {}", cfg.database.display()))?,
    );

    match &cli.command {
        Command::Refresh {
            target,
            missing_only,
            dry_run,
            max_reviews,
            min_reviews,
        } => run_refresh(
            &cfg,
            store,
            target,
            *missing_only,
            RefreshOptions {
                dry_run: *dry_run,
                max_reviews: *max_reviews,
                initial_threshold: *min_reviews,
            },
        ),
        Command::Show { target } => run_show(&store, target),
        Command::Notify { review_ids } => run_notify(&cfg, store, review_ids),
        Command::InitDb => {
            println!("Initialized {}", cfg.database.display());
            Ok(())
        }
    }
}
