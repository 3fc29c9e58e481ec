//! Batch command - process a directory once

use crate::cli::sdk::SdkArgs;
use crate::cli::signals;
use anyhow::{Context, Result};
use std::path::PathBuf;
use txrm_ingest::watch::{run_batch, BatchOptions};
use txrm_ingest::{CancellationToken, FileClassifier, Pipeline, WatchState};

/// Arguments for the batch command
#[derive(Debug)]
pub struct BatchArgs {
    pub state_path: PathBuf,
    pub dir: PathBuf,
    pub include_auxiliary: bool,
    pub output: Option<PathBuf>,
    pub no_ledger: bool,
    pub sdk: SdkArgs,
}

/// Execute the batch command
pub fn run(args: BatchArgs) -> Result<()> {
    if !args.dir.is_dir() {
        anyhow::bail!("Directory does not exist: {}", args.dir.display());
    }
    let state = WatchState::load_or_default(&args.state_path);

    let options = BatchOptions {
        root: args.dir.clone(),
        include_auxiliary: args.include_auxiliary,
        output_directory: args.output.unwrap_or_else(|| state.output_directory.clone()),
        ledger_path: (!args.no_ledger).then(|| state.ledger_path.clone()),
    };
    let classifier = FileClassifier::new(&state.extension, &state.auxiliary_marker);
    let mut pipeline = Pipeline::new(args.sdk.build(state.file_timeout_secs)?);

    let token = CancellationToken::new();
    signals::install(&token).context("Failed to install signal handlers")?;

    let summary = run_batch(&options, &classifier, &mut pipeline, &token)
        .with_context(|| format!("Batch run failed for {}", args.dir.display()))?;

    println!("Discovered: {}", summary.discovered);
    if summary.skipped > 0 {
        println!("Skipped:    {} (already in ledger)", summary.skipped);
    }
    println!("Processed:  {}", summary.processed);
    println!("Failed:     {}", summary.failed);
    match &summary.artifact {
        Some(path) => println!("Aggregate:  {}", path.display()),
        None => println!("Aggregate:  (nothing to save)"),
    }

    if summary.failed > 0 && summary.processed == 0 {
        anyhow::bail!("All {} files failed; see the log for details", summary.failed);
    }
    Ok(())
}
