//! TXRM Flow command-line launcher
//!
//! - **watch**: poll a directory, ingest new acquisitions, save and sync the aggregate
//! - **batch**: one-shot ingestion of a directory tree
//! - **discover / state / ledger / verify**: inspection and maintenance

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::sdk::SdkArgs;

#[derive(Parser, Debug)]
#[command(name = "txrm", version, about = "Incremental TXRM metadata ingestion")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Watch state file (default: ~/.txrm_flow/watch_state.toml)
    #[arg(long, global = true, env = "TXRM_STATE")]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a directory and ingest new files until interrupted
    Watch {
        /// Directory to watch (persisted)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Poll interval in seconds, at least 1 (persisted)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,

        /// Include auxiliary (drift) captures (persisted)
        #[arg(long)]
        include_auxiliary: bool,

        #[command(flatten)]
        sdk: SdkArgs,
    },

    /// Process every eligible file under a directory once
    Batch {
        /// Directory to process
        dir: PathBuf,

        /// Include auxiliary (drift) captures
        #[arg(long)]
        include_auxiliary: bool,

        /// Aggregate output directory (default: from state)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Process files even if they are already in the ledger, and do not record them
        #[arg(long)]
        no_ledger: bool,

        #[command(flatten)]
        sdk: SdkArgs,
    },

    /// List eligible files without processing them
    Discover {
        /// Directory to scan
        dir: PathBuf,

        /// Include auxiliary (drift) captures
        #[arg(long)]
        include_auxiliary: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or change the persisted watch state
    State {
        #[command(subcommand)]
        action: cli::state::StateAction,
    },

    /// Inspect the processed-file ledger
    Ledger {
        #[command(subcommand)]
        action: cli::ledger::LedgerAction,
    },

    /// Check an aggregate artifact's columns against the current schema
    Verify {
        /// Aggregate CSV (default: latest in the output directory)
        csv: Option<PathBuf>,
    },
}

fn run_command(cli: Cli) -> Result<()> {
    let state_path = cli
        .state
        .unwrap_or_else(txrm_ingest::state::default_state_path);

    match cli.command {
        Commands::Watch {
            dir,
            interval,
            include_auxiliary,
            sdk,
        } => cli::watch::run(cli::watch::WatchArgs {
            state_path,
            dir,
            interval,
            include_auxiliary,
            sdk,
        }),
        Commands::Batch {
            dir,
            include_auxiliary,
            output,
            no_ledger,
            sdk,
        } => cli::batch::run(cli::batch::BatchArgs {
            state_path,
            dir,
            include_auxiliary,
            output,
            no_ledger,
            sdk,
        }),
        Commands::Discover {
            dir,
            include_auxiliary,
            json,
        } => cli::discover::run(cli::discover::DiscoverArgs {
            state_path,
            dir,
            include_auxiliary,
            json,
        }),
        Commands::State { action } => cli::state::run(&state_path, action),
        Commands::Ledger { action } => cli::ledger::run(&state_path, action),
        Commands::Verify { csv } => cli::verify::run(&state_path, csv),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match txrm_logging::init_logging(txrm_logging::LogConfig {
        app_name: "txrm",
        verbose: cli.verbose,
        log_dir: txrm_ingest::state::logs_dir(),
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize file logging: {:?}", err);
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cli::sdk::SdkKind;

    #[test]
    fn test_watch_flags_parse() {
        let cli = Cli::try_parse_from([
            "txrm",
            "-v",
            "watch",
            "--dir",
            "/data/incoming",
            "--interval",
            "15",
            "--include-auxiliary",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Watch {
                dir,
                interval,
                include_auxiliary,
                sdk,
            } => {
                assert_eq!(dir, Some(PathBuf::from("/data/incoming")));
                assert_eq!(interval, Some(15));
                assert!(include_auxiliary);
                assert_eq!(sdk.sdk, SdkKind::Sidecar);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Cli::try_parse_from(["txrm", "watch", "--interval", "0"]).is_err());
    }

    #[test]
    fn test_command_sdk_requires_program() {
        assert!(Cli::try_parse_from(["txrm", "batch", "/data", "--sdk", "command"]).is_err());

        let cli = Cli::try_parse_from([
            "txrm",
            "batch",
            "/data",
            "--sdk",
            "command",
            "--sdk-program",
            "txrm-extract",
            "--sdk-arg",
            "--format=json",
            "--no-ledger",
        ])
        .unwrap();
        match cli.command {
            Commands::Batch { sdk, no_ledger, .. } => {
                assert!(no_ledger);
                assert_eq!(sdk.sdk_program, Some(PathBuf::from("txrm-extract")));
                assert_eq!(sdk.sdk_args, vec!["--format=json".to_string()]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_state_set_parses() {
        let cli = Cli::try_parse_from([
            "txrm",
            "--state",
            "/tmp/state.toml",
            "state",
            "set",
            "sync.branch",
            "data",
        ])
        .unwrap();
        assert_eq!(cli.state, Some(PathBuf::from("/tmp/state.toml")));
        assert!(matches!(
            cli.command,
            Commands::State {
                action: cli::state::StateAction::Set { .. }
            }
        ));
    }
}
