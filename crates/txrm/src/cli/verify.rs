//! Verify command - check an aggregate artifact against the column schema

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use txrm_ingest::{latest_artifact, verify_columns, WatchState};

/// Execute the verify command
pub fn run(state_path: &Path, csv: Option<PathBuf>) -> Result<()> {
    let path = match csv {
        Some(p) => p,
        None => {
            let state = WatchState::load_or_default(state_path);
            latest_artifact(&state.output_directory)
                .with_context(|| format!("Cannot read {}", state.output_directory.display()))?
                .with_context(|| {
                    format!("No aggregate artifacts in {}", state.output_directory.display())
                })?
        }
    };

    let check = verify_columns(&path).with_context(|| format!("Cannot read {}", path.display()))?;
    if check.is_ok() {
        println!("OK: {} matches the current column schema", path.display());
        return Ok(());
    }

    println!("Column mismatch in {}", path.display());
    if !check.missing.is_empty() {
        println!("  missing: {}", check.missing.join(", "));
    }
    if !check.extra.is_empty() {
        println!("  extra:   {}", check.extra.join(", "));
    }
    if !check.order_correct {
        println!("  column order differs");
    }
    anyhow::bail!("Aggregate columns do not match")
}
