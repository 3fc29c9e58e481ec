//! CLI module for TXRM Flow
//!
//! Each subcommand lives in its own module with an `Args` struct and a
//! `run` entry point. Everything here is a thin shell over `txrm_ingest`.

pub mod batch;
pub mod discover;
pub mod ledger;
pub mod output;
pub mod sdk;
pub mod signals;
pub mod state;
pub mod verify;
pub mod watch;
