//! Ledger command - inspect processed files

use anyhow::Result;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use txrm_ingest::{Ledger, WatchState};

#[derive(Subcommand, Debug)]
pub enum LedgerAction {
    /// List every recorded path
    List,
    /// Report whether a file has already been ingested
    Check { path: PathBuf },
}

/// Execute a ledger subcommand
pub fn run(state_path: &Path, action: LedgerAction) -> Result<()> {
    let state = WatchState::load_or_default(state_path);
    let ledger = Ledger::load(&state.ledger_path);

    match action {
        LedgerAction::List => {
            for entry in ledger.entries() {
                println!("{}", entry);
            }
            eprintln!("{} file(s) in {}", ledger.len(), ledger.path().display());
        }
        LedgerAction::Check { path } => {
            if ledger.contains(&path) {
                println!("processed: {}", path.display());
            } else {
                println!("not processed: {}", path.display());
            }
        }
    }
    Ok(())
}
