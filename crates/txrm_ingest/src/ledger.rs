//! Processed-file ledger
//!
//! The ledger is the at-most-once guarantee of the watch loop: a path that
//! has been recorded is never handed to the pipeline again, including after
//! a restart. It is persisted as a pretty-printed JSON array of normalized
//! paths and flushed synchronously after every append.

use crate::error::{IngestError, Result};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Ordered, persisted set of ingested file paths.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<String>,
    index: HashSet<String>,
}

impl Ledger {
    /// Empty ledger bound to `path`; nothing is read or written yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
            index: HashSet::new(),
        }
    }

    /// Load the ledger persisted at `path`.
    ///
    /// A missing or unreadable file yields an empty ledger; startup never
    /// fails because of ledger state.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut ledger = Self::new(path);
        ledger.reload();
        ledger
    }

    /// Replace in-memory state with what is on disk.
    pub fn reload(&mut self) {
        self.entries.clear();
        self.index.clear();

        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No ledger on disk, starting empty");
                return;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ledger unreadable, starting empty");
                return;
            }
        };

        let stored: Vec<String> = match serde_json::from_str(&content) {
            Ok(list) => list,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ledger corrupt, starting empty");
                return;
            }
        };

        for entry in stored {
            let key = normalize_key(Path::new(&entry));
            if self.index.insert(key.clone()) {
                self.entries.push(key);
            }
        }
        info!(path = %self.path.display(), entries = self.entries.len(), "Loaded ledger");
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded paths in insertion order (normalized form).
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains(&normalize_key(path))
    }

    /// Append `path` and flush immediately.
    ///
    /// The in-memory append is kept even when the flush fails: the file is
    /// considered processed from here on, and the next successful flush
    /// brings the persisted copy up to date.
    pub fn record(&mut self, path: &Path) -> Result<()> {
        let key = normalize_key(path);
        if self.index.insert(key.clone()) {
            self.entries.push(key);
        }
        self.flush()
    }

    /// Write the full ledger to disk via a temp file + rename.
    pub fn flush(&self) -> Result<()> {
        self.write_to_disk().map_err(|source| IngestError::LedgerPersist {
            path: self.path.clone(),
            source,
        })
    }

    fn write_to_disk(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "ledger".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &self.path)
    }
}

/// Normalized comparison key for a path.
///
/// Absolute, lexically cleaned (`.` and `..` resolved), forward slashes, and
/// lower-cased on case-insensitive hosts. Existing paths are canonicalized
/// first so symlinked spellings collapse to one key.
pub fn normalize_key(path: &Path) -> String {
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| lexical_absolute(path));
    let joined = resolved
        .components()
        .filter_map(|c| match c {
            Component::RootDir => None,
            other => Some(other.as_os_str().to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/");
    let has_root = resolved.has_root();
    let key = if has_root && !cfg!(windows) {
        format!("/{}", joined)
    } else {
        joined
    };
    if cfg!(any(windows, target_os = "macos")) {
        key.to_lowercase()
    } else {
        key
    }
}

fn lexical_absolute(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
