//! Recursive discovery of eligible acquisition files
//!
//! Discovery is stateless: it knows nothing about the ledger. Results are
//! ordered by parent directory, then file name, so repeated walks over an
//! unchanged tree return identical lists.

use crate::classifier::FileClassifier;
use crate::error::{IngestError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of one discovery walk.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Eligible files in deterministic order
    pub files: Vec<PathBuf>,
    /// Eligible file count per directory, relative to the root ("." for the root)
    pub per_directory: BTreeMap<String, usize>,
    /// Auxiliary files that were seen but excluded
    pub auxiliary_skipped: usize,
    /// Auxiliary files that were included
    pub auxiliary_included: usize,
    /// Entries that could not be read during the walk
    pub walk_errors: usize,
}

impl DiscoveryReport {
    /// Human-readable folder summary, one line per directory.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .per_directory
            .iter()
            .map(|(dir, count)| format!("{}: {} files", dir, count))
            .collect();
        lines.push(format!("Total eligible files: {}", self.files.len()));
        if self.auxiliary_skipped > 0 {
            lines.push(format!("Auxiliary files excluded: {}", self.auxiliary_skipped));
        }
        if self.auxiliary_included > 0 {
            lines.push(format!("Auxiliary files included: {}", self.auxiliary_included));
        }
        lines
    }
}

/// Walk `root` recursively and return every eligible file.
pub fn discover(
    root: &Path,
    classifier: &FileClassifier,
    include_auxiliary: bool,
) -> Result<DiscoveryReport> {
    if !root.is_dir() {
        return Err(IngestError::Config(format!(
            "watch directory does not exist or is not a directory: {}",
            root.display()
        )));
    }

    let mut report = DiscoveryReport::default();
    let mut found: Vec<(PathBuf, PathBuf)> = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                report.walk_errors += 1;
                warn!(root = %root.display(), error = %e, "Skipping unreadable entry during discovery");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !classifier.is_eligible(path) {
            continue;
        }
        if classifier.is_auxiliary(path) {
            if !include_auxiliary {
                report.auxiliary_skipped += 1;
                debug!(path = %path.display(), "Excluding auxiliary file");
                continue;
            }
            report.auxiliary_included += 1;
        }

        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        found.push((parent, path.to_path_buf()));
    }

    found.sort_by(|(dir_a, path_a), (dir_b, path_b)| {
        dir_a
            .cmp(dir_b)
            .then_with(|| path_a.file_name().cmp(&path_b.file_name()))
    });

    for (dir, path) in found {
        let rel = match dir.strip_prefix(root) {
            Ok(r) if r.as_os_str().is_empty() => ".".to_string(),
            Ok(r) => r.display().to_string(),
            Err(_) => dir.display().to_string(),
        };
        *report.per_directory.entry(rel).or_insert(0) += 1;
        report.files.push(path);
    }

    info!(
        root = %root.display(),
        eligible = report.files.len(),
        directories = report.per_directory.len(),
        auxiliary_skipped = report.auxiliary_skipped,
        "Discovery complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_auxiliary_filtering() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.txrm");
        touch(temp.path(), "a_drift.txrm");
        let classifier = FileClassifier::default();

        let without = discover(temp.path(), &classifier, false).unwrap();
        assert_eq!(without.files, vec![temp.path().join("a.txrm")]);
        assert_eq!(without.auxiliary_skipped, 1);

        let with = discover(temp.path(), &classifier, true).unwrap();
        assert_eq!(
            with.files,
            vec![temp.path().join("a.txrm"), temp.path().join("a_drift.txrm")]
        );
        assert_eq!(with.auxiliary_included, 1);
    }

    #[test]
    fn test_deterministic_directory_then_name_order() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "b/2.txrm");
        touch(temp.path(), "a/z.txrm");
        touch(temp.path(), "root.txrm");
        touch(temp.path(), "a/m.TXRM");
        touch(temp.path(), "a/notes.txt");

        let classifier = FileClassifier::default();
        let first = discover(temp.path(), &classifier, false).unwrap();
        let second = discover(temp.path(), &classifier, false).unwrap();
        assert_eq!(first.files, second.files);

        let names: Vec<String> = first
            .files
            .iter()
            .map(|p| p.strip_prefix(temp.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "root.txrm".to_string(),
                Path::new("a").join("m.TXRM").display().to_string(),
                Path::new("a").join("z.txrm").display().to_string(),
                Path::new("b").join("2.txrm").display().to_string(),
            ]
        );
        assert_eq!(first.per_directory.get("."), Some(&1));
        assert_eq!(first.per_directory.get("a"), Some(&2));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(discover(&missing, &FileClassifier::default(), false).is_err());
    }

    #[test]
    fn test_summary_lines() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "x/a.txrm");
        touch(temp.path(), "x/a_drift.txrm");
        let report = discover(temp.path(), &FileClassifier::default(), false).unwrap();
        let lines = report.summary_lines();
        assert!(lines.contains(&"x: 1 files".to_string()));
        assert!(lines.contains(&"Total eligible files: 1".to_string()));
        assert!(lines.contains(&"Auxiliary files excluded: 1".to_string()));
    }
}
