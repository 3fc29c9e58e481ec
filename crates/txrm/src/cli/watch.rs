//! Watch command - poll a directory until interrupted

use crate::cli::sdk::SdkArgs;
use crate::cli::signals;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};
use txrm_ingest::watch::configure_sync;
use txrm_ingest::{CancellationToken, Pipeline, ProcessGitRunner, WatchLoop, WatchState};

/// Arguments for the watch command
#[derive(Debug)]
pub struct WatchArgs {
    pub state_path: PathBuf,
    pub dir: Option<PathBuf>,
    pub interval: Option<u64>,
    pub include_auxiliary: bool,
    pub sdk: SdkArgs,
}

/// Execute the watch command
pub fn run(args: WatchArgs) -> Result<()> {
    let mut state = WatchState::load_or_default(&args.state_path);

    if args.dir.is_some() || args.interval.is_some() || args.include_auxiliary {
        state
            .update(&args.state_path, |s| {
                if let Some(dir) = args.dir.clone() {
                    s.watch_directory = Some(dir);
                }
                if let Some(interval) = args.interval {
                    s.poll_interval_secs = interval;
                }
                if args.include_auxiliary {
                    s.include_auxiliary = true;
                }
            })
            .with_context(|| format!("Failed to save watch state: {}", args.state_path.display()))?;
    }

    let Some(watch_dir) = state.watch_directory.clone() else {
        anyhow::bail!(
            "No watch directory configured. Pass --dir or run `txrm state set watch_directory <path>`"
        );
    };
    if !watch_dir.is_dir() {
        anyhow::bail!("Watch directory does not exist: {}", watch_dir.display());
    }

    let pipeline = Pipeline::new(args.sdk.build(state.file_timeout_secs)?);

    let sync = match state.sync.as_ref().filter(|s| s.enabled) {
        Some(_) => match ProcessGitRunner::new() {
            Ok(runner) => configure_sync(&state, Box::new(runner)),
            Err(e) => {
                warn!(error = %e, "Sync enabled but git is unavailable, running without sync");
                None
            }
        },
        None => None,
    };

    let token = CancellationToken::new();
    signals::install(&token).context("Failed to install signal handlers")?;

    let mut watch = WatchLoop::new(&state, pipeline, token)
        .context("Failed to start watch loop")?
        .with_sync(sync);

    println!("Watching {} (Ctrl+C to stop)", watch_dir.display());
    let summary = watch.run();

    info!(artifacts = summary.artifacts.len(), "Watch session ended");
    println!();
    println!("Cycles:     {}", summary.cycles);
    println!("Processed:  {}", summary.processed);
    println!("Failed:     {}", summary.failed);
    if let Some(last) = summary.artifacts.last() {
        println!("Aggregate:  {}", last.display());
    }
    if summary.sync_failures > 0 {
        println!("Sync failures: {}", summary.sync_failures);
    }
    Ok(())
}
