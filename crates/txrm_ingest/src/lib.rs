//! TXRM Ingest - Incremental Metadata Ingestion & Aggregation
//!
//! Watches a directory for acquisition files, extracts their metadata once,
//! writes per-file reports, and keeps a cumulative aggregate table that can
//! be pushed to a git remote.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌───────────────┐
//! │  Discovery  │     │   Ledger    │     │  Pipeline   │     │   Aggregate   │
//! │ (classifier │────▶│ (skip seen  │────▶│ (validate → │────▶│ (CSV per save │
//! │   filter)   │     │   paths)    │     │  extract →  │     │  → git sync)  │
//! │             │     │             │     │  artifacts) │     │               │
//! └─────────────┘     └─────────────┘     └─────────────┘     └───────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Auxiliary file**: a companion capture (drift scan) marked in its name
//! - **Ledger**: persisted set of ingested paths; at-most-once processing
//! - **MetadataSdk**: the non-reentrant provider, used through one session per file
//! - **Aggregate artifact**: timestamped CSV with a fixed column schema

pub mod aggregate;
pub mod artifacts;
pub mod cancel;
pub mod classifier;
pub mod derive;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod sdk;
pub mod state;
pub mod sync;
pub mod types;
pub mod watch;

// Re-exports for convenience
pub use aggregate::{aggregate_columns, latest_artifact, verify_columns, AggregateTable, TRACKED_AXES};
pub use artifacts::{ConfigEmitter, IniConfigEmitter};
pub use cancel::CancellationToken;
pub use classifier::FileClassifier;
pub use discovery::{discover, DiscoveryReport};
pub use error::{ErrorKind, IngestError, Result, SdkError};
pub use ledger::Ledger;
pub use pipeline::{Pipeline, ProcessedFile};
pub use sdk::{CommandSdk, DatasetSession, MetadataSdk, SidecarSdk};
pub use state::{SyncConfig, WatchState};
pub use sync::{GitRunner, GitSync, ProcessGitRunner};
pub use types::{DerivedFields, FileRecord, MetadataRecord, ProcessedRecord};
pub use watch::{run_batch, BatchOptions, BatchSummary, CycleReport, WatchLoop, WatchPhase, WatchSummary};
