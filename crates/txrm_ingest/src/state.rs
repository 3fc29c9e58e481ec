//! Persisted watch configuration
//!
//! `WatchState` is loaded once at startup (falling back to defaults), changed
//! only through [`WatchState::update`], and written back after every change.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "TXRM_HOME";
/// Environment variable supplying the sync token out of band.
pub const TOKEN_ENV: &str = "TXRM_SYNC_TOKEN";

const STATE_FILE_NAME: &str = "watch_state.toml";

/// Get the TXRM home directory: `$TXRM_HOME` or `~/.txrm_flow`.
pub fn txrm_home() -> PathBuf {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        if !override_path.is_empty() {
            return PathBuf::from(override_path);
        }
    }
    dirs::home_dir()
        .map(|h| h.join(".txrm_flow"))
        .unwrap_or_else(|| PathBuf::from(".txrm_flow"))
}

/// Log directory: `<home>/logs`.
pub fn logs_dir() -> PathBuf {
    txrm_home().join("logs")
}

/// Default location of the state file.
pub fn default_state_path() -> PathBuf {
    txrm_home().join(STATE_FILE_NAME)
}

/// Watch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchState {
    /// Directory to poll; the watch loop refuses to start without one
    #[serde(default)]
    pub watch_directory: Option<PathBuf>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Also ingest auxiliary (drift) captures
    #[serde(default)]
    pub include_auxiliary: bool,

    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,

    /// Per-file extraction bound; 0 disables it
    #[serde(default = "default_file_timeout")]
    pub file_timeout_secs: u64,

    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_auxiliary_marker")]
    pub auxiliary_marker: String,

    #[serde(default)]
    pub sync: Option<SyncConfig>,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_ledger_path() -> PathBuf {
    txrm_home().join("processed_files.json")
}

fn default_output_directory() -> PathBuf {
    txrm_home().join("metadata_output")
}

fn default_file_timeout() -> u64 {
    300
}

fn default_extension() -> String {
    crate::classifier::DEFAULT_EXTENSION.to_string()
}

fn default_auxiliary_marker() -> String {
    crate::classifier::DEFAULT_AUXILIARY_MARKER.to_string()
}

impl Default for WatchState {
    fn default() -> Self {
        Self {
            watch_directory: None,
            poll_interval_secs: default_poll_interval(),
            include_auxiliary: false,
            ledger_path: default_ledger_path(),
            output_directory: default_output_directory(),
            file_timeout_secs: default_file_timeout(),
            extension: default_extension(),
            auxiliary_marker: default_auxiliary_marker(),
            sync: None,
        }
    }
}

impl WatchState {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut state: WatchState = toml::from_str(&content)?;
        state.apply_env();
        Ok(state)
    }

    /// Load from `path`, or defaults when the file is absent or unparsable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No watch state on disk, using defaults");
            let mut state = Self::default();
            state.apply_env();
            return state;
        }
        match Self::load(path) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Watch state unreadable, using defaults");
                let mut state = Self::default();
                state.apply_env();
                state
            }
        }
    }

    /// Save configuration to a TOML file
    ///
    /// A token that came from the environment is not written back.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut persisted = self.clone();
        if let Some(sync) = persisted.sync.as_mut() {
            if sync.token_from_env {
                sync.token = None;
            }
        }
        let content = toml::to_string_pretty(&persisted)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `change` and persist the result immediately.
    pub fn update<F>(&mut self, path: &Path, change: F) -> Result<()>
    where
        F: FnOnce(&mut WatchState),
    {
        change(self);
        self.save(path)
    }

    /// Set one field from its textual form, as used by `state set`.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "watch_directory" => {
                self.watch_directory = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "poll_interval_secs" => {
                let secs: u64 = parse_value(key, value)?;
                if secs == 0 {
                    return Err(IngestError::Config(
                        "poll_interval_secs must be at least 1".to_string(),
                    ));
                }
                self.poll_interval_secs = secs;
            }
            "include_auxiliary" => self.include_auxiliary = parse_value(key, value)?,
            "ledger_path" => self.ledger_path = PathBuf::from(value),
            "output_directory" => self.output_directory = PathBuf::from(value),
            "file_timeout_secs" => self.file_timeout_secs = parse_value(key, value)?,
            "extension" => self.extension = value.trim_start_matches('.').to_string(),
            "auxiliary_marker" => self.auxiliary_marker = value.to_string(),
            other => {
                let Some(sync_key) = other.strip_prefix("sync.") else {
                    return Err(IngestError::Config(format!("Unknown state key '{}'", other)));
                };
                self.sync
                    .get_or_insert_with(SyncConfig::default)
                    .set_field(sync_key, value)?;
            }
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        let Ok(token) = std::env::var(TOKEN_ENV) else {
            return;
        };
        if token.is_empty() {
            return;
        }
        if let Some(sync) = self.sync.as_mut() {
            sync.token = Some(token);
            sync.token_from_env = true;
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| IngestError::Config(format!("Invalid value '{}' for {}", value, key)))
}

/// Remote repository sync settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Local working copy
    #[serde(default)]
    pub repo_path: Option<PathBuf>,

    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub repo_owner: Option<String>,

    #[serde(default)]
    pub repo_name: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(skip)]
    token_from_env: bool,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_path: None,
            remote_url: None,
            branch: default_branch(),
            repo_owner: None,
            repo_name: None,
            token: None,
            token_from_env: false,
        }
    }
}

impl SyncConfig {
    /// Enabled and carrying everything a push needs.
    pub fn is_complete(&self) -> bool {
        self.enabled
            && self.repo_path.is_some()
            && self.remote_url.as_deref().is_some_and(|u| !u.is_empty())
            && !self.branch.is_empty()
            && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Remote URL, or the GitHub URL built from owner and name.
    pub fn resolved_remote(&self) -> Option<String> {
        if let Some(url) = self.remote_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        match (self.repo_owner.as_deref(), self.repo_name.as_deref()) {
            (Some(owner), Some(name)) => Some(format!("https://github.com/{}/{}.git", owner, name)),
            _ => None,
        }
    }

    fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());
        match key {
            "enabled" => self.enabled = parse_value(key, value)?,
            "repo_path" => self.repo_path = optional(value).map(PathBuf::from),
            "remote_url" => self.remote_url = optional(value),
            "branch" => self.branch = value.to_string(),
            "repo_owner" => self.repo_owner = optional(value),
            "repo_name" => self.repo_name = optional(value),
            "token" => {
                self.token = optional(value);
                self.token_from_env = false;
            }
            other => {
                return Err(IngestError::Config(format!("Unknown state key 'sync.{}'", other)));
            }
        }
        if self.remote_url.is_none() {
            self.remote_url = self.resolved_remote();
        }
        Ok(())
    }
}

/// Show at most a short prefix of a secret.
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    if token.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", prefix)
    }
}
