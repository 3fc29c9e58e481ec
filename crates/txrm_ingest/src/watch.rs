//! Polling watch loop and one-shot batch runs
//!
//! The loop alternates between two phases. `Scanning` discovers eligible
//! files, drops the ones already in the ledger, and processes the rest one at
//! a time. `Idle` sleeps for the poll interval. The first pass runs
//! immediately; cancellation is observed between files and during the sleep.

use crate::aggregate::AggregateTable;
use crate::cancel::CancellationToken;
use crate::classifier::FileClassifier;
use crate::discovery::discover;
use crate::error::{ErrorKind, IngestError, Result};
use crate::ledger::Ledger;
use crate::pipeline::Pipeline;
use crate::state::WatchState;
use crate::sync::{GitRunner, GitSync};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lower bound on the idle sleep between scans.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Idle,
    Scanning,
}

/// Outcome of one discovery-and-process pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Eligible files found by discovery
    pub discovered: usize,
    /// Eligible files not yet in the ledger
    pub new: usize,
    pub processed: usize,
    pub failed: usize,
    /// Aggregate artifact written at the end of the pass
    pub artifact: Option<PathBuf>,
    /// `Some(ok)` when a push was attempted
    pub synced: Option<bool>,
}

/// Totals for a whole watch session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub cycles: usize,
    pub processed: usize,
    pub failed: usize,
    pub artifacts: Vec<PathBuf>,
    pub sync_failures: usize,
}

impl WatchSummary {
    fn absorb(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.processed += report.processed;
        self.failed += report.failed;
        if let Some(artifact) = &report.artifact {
            self.artifacts.push(artifact.clone());
        }
        if report.synced == Some(false) {
            self.sync_failures += 1;
        }
    }
}

/// Build the sync adapter from state, or `None` when sync is off or
/// misconfigured.
pub fn configure_sync(state: &WatchState, runner: Box<dyn GitRunner>) -> Option<GitSync> {
    let config = state.sync.as_ref().filter(|s| s.enabled)?;
    if !config.is_complete() {
        warn!(kind = %ErrorKind::Sync, "incomplete sync configuration, running without sync");
        return None;
    }
    match GitSync::from_config(config, runner) {
        Ok(sync) => Some(sync),
        Err(e) => {
            warn!(kind = %ErrorKind::Sync, error = %e, "Sync disabled");
            None
        }
    }
}

pub struct WatchLoop {
    root: PathBuf,
    poll_interval: Duration,
    include_auxiliary: bool,
    classifier: FileClassifier,
    ledger: Ledger,
    pipeline: Pipeline,
    aggregate: AggregateTable,
    sync: Option<GitSync>,
    token: CancellationToken,
    phase: WatchPhase,
}

impl WatchLoop {
    /// Set up a loop from persisted state.
    ///
    /// Loads the ledger and creates the output directory. Fails only when no
    /// watch directory is configured or the output directory cannot be made.
    pub fn new(state: &WatchState, pipeline: Pipeline, token: CancellationToken) -> Result<Self> {
        let root = state
            .watch_directory
            .clone()
            .ok_or_else(|| IngestError::Config("No watch directory configured".to_string()))?;
        std::fs::create_dir_all(&state.output_directory)?;

        Ok(Self {
            root,
            poll_interval: Duration::from_secs(state.poll_interval_secs).max(MIN_POLL_INTERVAL),
            include_auxiliary: state.include_auxiliary,
            classifier: FileClassifier::new(&state.extension, &state.auxiliary_marker),
            ledger: Ledger::load(&state.ledger_path),
            pipeline,
            aggregate: AggregateTable::new(&state.output_directory),
            sync: None,
            token,
            phase: WatchPhase::Scanning,
        })
    }

    pub fn with_sync(mut self, sync: Option<GitSync>) -> Self {
        self.sync = sync;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn aggregate(&self) -> &AggregateTable {
        &self.aggregate
    }

    /// One Scanning pass. Never fails: every problem is logged and counted.
    pub fn run_cycle(&mut self) -> CycleReport {
        self.phase = WatchPhase::Scanning;
        let mut report = CycleReport::default();

        let discovery = match discover(&self.root, &self.classifier, self.include_auxiliary) {
            Ok(d) => d,
            Err(e) => {
                error!(root = %self.root.display(), error = %e, "Discovery failed");
                self.phase = WatchPhase::Idle;
                return report;
            }
        };
        report.discovered = discovery.files.len();

        let pending: Vec<PathBuf> = discovery
            .files
            .into_iter()
            .filter(|p| !self.ledger.contains(p))
            .collect();
        report.new = pending.len();

        if pending.is_empty() {
            debug!(discovered = report.discovered, "No new files");
            self.phase = WatchPhase::Idle;
            return report;
        }
        info!(new = pending.len(), discovered = report.discovered, "Processing new files");

        let (processed, failed) = process_files(
            &pending,
            &mut self.pipeline,
            &mut self.aggregate,
            Some(&mut self.ledger),
            &self.token,
        );
        report.processed = processed;
        report.failed = failed;

        if processed > 0 {
            report.artifact = save_aggregate(&self.aggregate);
        }
        if let (Some(artifact), Some(sync)) = (&report.artifact, self.sync.as_mut()) {
            report.synced = Some(sync.push(artifact, None));
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            total_rows = self.aggregate.len(),
            "Cycle complete"
        );
        self.phase = WatchPhase::Idle;
        report
    }

    /// Poll until the token is cancelled.
    pub fn run(&mut self) -> WatchSummary {
        info!(
            root = %self.root.display(),
            interval_secs = self.poll_interval.as_secs(),
            include_auxiliary = self.include_auxiliary,
            ledger_entries = self.ledger.len(),
            sdk = self.pipeline.sdk_name(),
            "Watch loop started"
        );

        if let Some(sync) = self.sync.as_mut() {
            if let Err(e) = sync.prepare() {
                error!(kind = %e.kind(), error = %e, "Sync working copy unavailable, running without sync");
                self.sync = None;
            }
        }

        let mut summary = WatchSummary::default();
        while !self.token.is_cancelled() {
            let report = self.run_cycle();
            summary.absorb(&report);

            if !self.token.sleep(self.poll_interval) {
                break;
            }
        }

        info!(
            cycles = summary.cycles,
            processed = summary.processed,
            failed = summary.failed,
            "Watch loop stopped"
        );
        summary
    }
}

/// Process `files` in order, committing each success to the aggregate and
/// (when given) the ledger. Returns `(processed, failed)`.
fn process_files(
    files: &[PathBuf],
    pipeline: &mut Pipeline,
    aggregate: &mut AggregateTable,
    mut ledger: Option<&mut Ledger>,
    token: &CancellationToken,
) -> (usize, usize) {
    let mut processed = 0;
    let mut failed = 0;

    let total = files.len();
    for (index, path) in files.iter().enumerate() {
        if token.is_cancelled() {
            info!(remaining = total - index, "Cancelled, stopping before next file");
            break;
        }
        let position = index + 1;
        info!(
            file = position,
            total,
            percent = percent_complete(position, total),
            path = %path.display(),
            "Processing file {} of {}",
            position,
            total
        );
        match pipeline.process_single_file(path) {
            Ok(file) => {
                aggregate.add_row(&file.record);
                if let Some(ledger) = ledger.as_deref_mut() {
                    if let Err(e) = ledger.record(path) {
                        error!(path = %path.display(), kind = %e.kind(), error = %e, "Ledger not persisted");
                    }
                }
                processed += 1;
            }
            Err(_) => failed += 1,
        }
    }
    (processed, failed)
}

/// Share of `total` done once `position` files have been handled.
fn percent_complete(position: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    (position.min(total) * 100 / total) as u32
}

fn save_aggregate(aggregate: &AggregateTable) -> Option<PathBuf> {
    match aggregate.save() {
        Ok(path) => path,
        Err(e) => {
            error!(
                output = %aggregate.output_dir().display(),
                kind = %ErrorKind::Artifact,
                error = %e,
                "Failed to save aggregate"
            );
            None
        }
    }
}

/// Options for a one-shot run over a directory.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub root: PathBuf,
    pub include_auxiliary: bool,
    pub output_directory: PathBuf,
    /// Skip and record files through this ledger; `None` processes everything.
    pub ledger_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub discovered: usize,
    pub skipped: usize,
    pub processed: usize,
    pub failed: usize,
    pub artifact: Option<PathBuf>,
}

/// Discover, process and save once.
pub fn run_batch(
    options: &BatchOptions,
    classifier: &FileClassifier,
    pipeline: &mut Pipeline,
    token: &CancellationToken,
) -> Result<BatchSummary> {
    let discovery = discover(&options.root, classifier, options.include_auxiliary)?;
    let mut ledger = options.ledger_path.as_deref().map(Ledger::load);

    let pending: Vec<PathBuf> = discovery
        .files
        .iter()
        .filter(|p| ledger.as_ref().map_or(true, |l| !l.contains(p)))
        .cloned()
        .collect();

    let mut aggregate = AggregateTable::new(&options.output_directory);
    let (processed, failed) =
        process_files(&pending, pipeline, &mut aggregate, ledger.as_mut(), token);

    let summary = BatchSummary {
        discovered: discovery.files.len(),
        skipped: discovery.files.len() - pending.len(),
        processed,
        failed,
        artifact: save_aggregate(&aggregate),
    };
    info!(
        root = %options.root.display(),
        processed = summary.processed,
        failed = summary.failed,
        skipped = summary.skipped,
        "Batch complete"
    );
    Ok(summary)
}
