//! Metadata provider selection

use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use txrm_ingest::{CommandSdk, MetadataSdk, SidecarSdk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SdkKind {
    /// Read `<stem>.metadata.json` written next to each file
    Sidecar,
    /// Run an external extractor that prints JSON metadata
    Command,
}

#[derive(Args, Debug, Clone)]
pub struct SdkArgs {
    /// Metadata provider
    #[arg(long, value_enum, default_value_t = SdkKind::Sidecar)]
    pub sdk: SdkKind,

    /// Extractor executable (with --sdk command)
    #[arg(long, required_if_eq("sdk", "command"))]
    pub sdk_program: Option<PathBuf>,

    /// Extra argument passed to the extractor before the file path (repeatable)
    #[arg(long = "sdk-arg", allow_hyphen_values = true)]
    pub sdk_args: Vec<String>,
}

impl SdkArgs {
    /// Build the provider; `timeout_secs == 0` disables the per-file bound.
    pub fn build(&self, timeout_secs: u64) -> anyhow::Result<Box<dyn MetadataSdk>> {
        match self.sdk {
            SdkKind::Sidecar => Ok(Box::new(SidecarSdk::new())),
            SdkKind::Command => {
                let program = self
                    .sdk_program
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("--sdk command requires --sdk-program"))?;
                Ok(Box::new(
                    CommandSdk::new(program)
                        .with_args(self.sdk_args.iter().cloned())
                        .with_timeout(Some(Duration::from_secs(timeout_secs))),
                ))
            }
        }
    }
}
