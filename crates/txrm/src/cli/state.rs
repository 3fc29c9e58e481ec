//! State command - show or update the persisted watch state

use crate::cli::output::print_json;
use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;
use txrm_ingest::state::redact_token;
use txrm_ingest::WatchState;

#[derive(Subcommand, Debug)]
pub enum StateAction {
    /// Print the effective state
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set one key (e.g. `poll_interval_secs 30`, `sync.branch main`) and save
    Set {
        key: String,
        value: String,
    },
}

/// Execute a state subcommand
pub fn run(state_path: &Path, action: StateAction) -> Result<()> {
    let mut state = WatchState::load_or_default(state_path);

    match action {
        StateAction::Show { json } => {
            let shown = redacted(&state);
            if json {
                return print_json(&shown);
            }
            println!("# {}", state_path.display());
            print!("{}", format_fields(&shown)?);
            Ok(())
        }
        StateAction::Set { key, value } => {
            let mut candidate = state.clone();
            candidate
                .set_field(&key, &value)
                .with_context(|| format!("Cannot set {}", key))?;
            state
                .update(state_path, |s| *s = candidate)
                .with_context(|| format!("Failed to save {}", state_path.display()))?;
            let shown = if key.ends_with("token") {
                redact_token(&value)
            } else {
                value
            };
            println!("{} = {}", key, shown);
            Ok(())
        }
    }
}

fn redacted(state: &WatchState) -> WatchState {
    let mut shown = state.clone();
    if let Some(sync) = shown.sync.as_mut() {
        sync.token = sync.token.as_deref().map(redact_token);
    }
    shown
}

fn format_fields(state: &WatchState) -> Result<String> {
    let value = serde_json::to_value(state)?;
    let mut out = String::new();
    if let serde_json::Value::Object(map) = value {
        for (key, v) in map {
            match v {
                serde_json::Value::Object(inner) => {
                    for (inner_key, inner_v) in inner {
                        out.push_str(&format!("{}.{} = {}\n", key, inner_key, inner_v));
                    }
                }
                other => out.push_str(&format!("{} = {}\n", key, other)),
            }
        }
    }
    Ok(out)
}
