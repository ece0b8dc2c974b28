//! Mailbox extraction runner
//!
//! Runs the search-and-extract loop over a JSON mailbox export, persisting
//! the run state after every step so an interrupted run resumes where it
//! stopped.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mail_extraction::config::Config;
use mail_extraction::{AgentError, MemoryMailbox, Orchestrator, StateFile, StepReport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mail-extract")]
#[command(about = "Search a mailbox export for membership records")]
struct Cli {
    /// Maximum attempts to run in this invocation
    #[arg(long, default_value_t = 20)]
    steps: usize,

    /// Mailbox JSON export (overrides MAILBOX_PATH)
    #[arg(long)]
    mailbox: Option<PathBuf>,

    /// State file (overrides STATE_PATH)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Do not persist the message cache with the state
    #[arg(long)]
    no_cache: bool,

    /// Start a new run even if a state file exists
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mail_extraction=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let mailbox_path = cli.mailbox.unwrap_or_else(|| config.mailbox_path.clone());
    let mailbox = MemoryMailbox::from_json_file(&mailbox_path)
        .await
        .with_context(|| format!("Failed to load mailbox {}", mailbox_path.display()))?;

    let mut state_file = StateFile::new(cli.state.unwrap_or_else(|| config.state_path.clone()));
    if cli.no_cache {
        state_file = state_file.without_cache();
    }

    let orchestrator = Orchestrator::new(mailbox, config.openai(), config.agent.clone())
        .context("Failed to create orchestrator")?;

    let saved = if cli.fresh {
        None
    } else {
        state_file.load().await.context("Failed to load run state")?
    };
    let mut state = match saved {
        Some(state) => {
            tracing::info!(run_id = %state.run_id, "resuming run");
            state
        }
        None => {
            let state = orchestrator.new_state();
            tracing::info!(run_id = %state.run_id, "starting new run");
            state
        }
    };

    for _ in 0..cli.steps {
        let outcome = match orchestrator.run_step(&state).await {
            Ok(outcome) => outcome,
            Err(AgentError::StoreAuth(message)) => {
                tracing::error!(%message, "mailbox rejected credentials, stopping");
                println!("{}", state.progress());
                anyhow::bail!("mailbox authentication failed: {message}");
            }
            Err(e) => return Err(e).context("Step failed"),
        };

        state_file
            .save(&outcome.state)
            .await
            .context("Failed to save run state")?;
        state = outcome.state;

        if let StepReport::Done(reason) = outcome.report {
            tracing::info!(?reason, "run finished");
            break;
        }
    }

    println!("{}", state.progress());
    for record in state.records() {
        println!(
            "{:<24} {:<20} {:<8} {} ({})",
            record.category,
            record.key_value,
            record.tier().unwrap_or("-"),
            record.source_subject,
            record.source_date.format("%Y-%m-%d"),
        );
    }

    Ok(())
}
