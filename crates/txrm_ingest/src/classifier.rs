//! Eligibility rules for discovered files
//!
//! Pure predicates over the path string; nothing here touches the filesystem.

use std::path::Path;

pub const DEFAULT_EXTENSION: &str = "txrm";
pub const DEFAULT_AUXILIARY_MARKER: &str = "drift";

/// Decides which discovered files enter the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClassifier {
    extension: String,
    auxiliary_marker: String,
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION, DEFAULT_AUXILIARY_MARKER)
    }
}

impl FileClassifier {
    /// `extension` may be given with or without the leading dot.
    pub fn new(extension: &str, auxiliary_marker: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_lowercase(),
            auxiliary_marker: auxiliary_marker.to_lowercase(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// True when the file carries the acquisition extension (case-insensitive).
    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase() == self.extension)
            .unwrap_or(false)
    }

    /// True when the file name contains the auxiliary marker (case-insensitive).
    /// Only the final component is inspected, so a `drift/` directory does
    /// not turn its primary scans into auxiliary ones.
    pub fn is_auxiliary(&self, path: &Path) -> bool {
        if self.auxiliary_marker.is_empty() {
            return false;
        }
        path.file_name()
            .map(|name| {
                name.to_string_lossy()
                    .to_lowercase()
                    .contains(&self.auxiliary_marker)
            })
            .unwrap_or(false)
    }

    /// Eligible and, unless auxiliaries are wanted, not auxiliary.
    pub fn accepts(&self, path: &Path, include_auxiliary: bool) -> bool {
        self.is_eligible(path) && (include_auxiliary || !self.is_auxiliary(path))
    }
}
