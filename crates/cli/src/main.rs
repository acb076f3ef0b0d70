//! mergecommit command-line tool.
//!
//! Merges two revisions of a git repository and, when the merge is free of
//! conflicts, writes the result as a new commit with parents `[ours, theirs]`.
//! The commit is detached: no branch or reference is updated.
//!
//! Exit status: 0 merged, 1 conflicts, 2 usage error, 3 failure.

mod output;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mergecommit_core::config::{MergeConfig, MergeSettings};
use mergecommit_core::models::{MergeOutcome, MergeRequest};
use mergecommit_core::store::GitOpener;
use mergecommit_core::MergeOrchestrator;

const EXIT_CONFLICT: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_FAILURE: u8 = 3;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Merge two commits into a new detached merge commit.
#[derive(Parser, Debug)]
#[command(
    name = "mergecommit",
    version,
    about = "Three-way merge two revisions and commit the result without moving any reference"
)]
struct Cli {
    /// Path to the git repository.
    repo: PathBuf,

    /// Revision merged into; becomes the first parent.
    ours: String,

    /// Revision merged in; becomes the second parent.
    theirs: String,

    /// Message of the merge commit.
    message: String,

    /// Print the outcome as JSON.
    #[arg(long)]
    json: bool,

    /// Disable rename detection.
    #[arg(long)]
    no_renames: bool,

    /// Similarity percentage (0-100) for rename detection.
    #[arg(long, default_value = "50")]
    rename_threshold: u32,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> MergeConfig {
        MergeConfig {
            merge: MergeSettings {
                find_renames: !self.no_renames,
                rename_threshold: self.rename_threshold,
            },
            log_level: self.log_level.clone(),
        }
    }

    fn request(&self) -> MergeRequest {
        MergeRequest::new(&self.repo, &self.ours, &self.theirs, &self.message)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = cli.config();
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        return ExitCode::from(EXIT_USAGE);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(&cli, config) {
        Ok(outcome) if outcome.is_conflicted() => ExitCode::from(EXIT_CONFLICT),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(cli: &Cli, config: MergeConfig) -> Result<MergeOutcome> {
    debug!(?config, "starting merge");
    let orchestrator = MergeOrchestrator::new(GitOpener, config.merge);
    let outcome = orchestrator.merge(&cli.request()).context("fail to merge")?;

    let rendered = if cli.json {
        output::render_json(&outcome)?
    } else {
        output::render_text(&outcome)
    };
    std::io::stdout()
        .write_all(rendered.as_bytes())
        .context("failed to write to stdout")?;
    Ok(outcome)
}
