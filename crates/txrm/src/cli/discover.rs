//! Discover command - list eligible files without processing

use crate::cli::output::{format_size, print_json, print_table};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use txrm_ingest::{discover, FileClassifier, WatchState};

/// Arguments for the discover command
#[derive(Debug)]
pub struct DiscoverArgs {
    pub state_path: PathBuf,
    pub dir: PathBuf,
    pub include_auxiliary: bool,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct DiscoveredFile {
    path: PathBuf,
    size: u64,
    auxiliary: bool,
}

#[derive(Debug, Serialize)]
struct DiscoverOutput {
    root: PathBuf,
    files: Vec<DiscoveredFile>,
    per_directory: BTreeMap<String, usize>,
    auxiliary_skipped: usize,
}

/// Execute the discover command
pub fn run(args: DiscoverArgs) -> Result<()> {
    let state = WatchState::load_or_default(&args.state_path);
    let classifier = FileClassifier::new(&state.extension, &state.auxiliary_marker);

    let report = discover(&args.dir, &classifier, args.include_auxiliary)
        .with_context(|| format!("Discovery failed for {}", args.dir.display()))?;

    let files: Vec<DiscoveredFile> = report
        .files
        .iter()
        .map(|path| DiscoveredFile {
            size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            auxiliary: classifier.is_auxiliary(path),
            path: path.clone(),
        })
        .collect();

    if args.json {
        return print_json(&DiscoverOutput {
            root: args.dir,
            files,
            per_directory: report.per_directory.clone(),
            auxiliary_skipped: report.auxiliary_skipped,
        });
    }

    if files.is_empty() {
        println!("No eligible .{} files under {}", classifier.extension(), args.dir.display());
    } else {
        let rows = files
            .iter()
            .map(|f| {
                vec![
                    f.path.display().to_string(),
                    format_size(f.size),
                    if f.auxiliary { "yes".to_string() } else { String::new() },
                ]
            })
            .collect();
        print_table(&["PATH", "SIZE", "AUXILIARY"], rows);
    }
    for line in report.summary_lines() {
        println!("{}", line);
    }
    Ok(())
}
