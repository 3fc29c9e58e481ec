//! Cumulative aggregate table
//!
//! One row per successfully processed file, every row carrying exactly the
//! columns of [`aggregate_columns`] in the same order. Each `save` writes a
//! new timestamped CSV; nothing is updated in place and nothing is read back.

use crate::artifacts::fmt_opt;
use crate::error::Result;
use crate::types::{ProcessedRecord, ProjectionSample};
use chrono::Local;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

pub const ARTIFACT_PREFIX: &str = "cumulative_metadata_";
pub const ARTIFACT_EXTENSION: &str = "csv";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Axes that get start/end/range columns, in column order.
pub const TRACKED_AXES: &[&str] = &[
    "Sample X",
    "Sample Y",
    "Sample Z",
    "Sample Theta",
    "Source X",
    "Source Z",
    "Detector Z",
    "CCD Z",
    "CCD X",
    "Flat Panel X",
    "Flat Panel Z",
    "MkIV Filter Wheel",
    "DCT",
];

/// Fixed leading columns, before the per-axis block.
pub const BASE_COLUMNS: &[&str] = &[
    "file_path",
    "file_name",
    "folder_path",
    "file_hash",
    "file_size_bytes",
    "validated_at",
    "acquisition_complete",
    "objective",
    "pixel_size_um",
    "power_watts",
    "voltage_kv",
    "current",
    "filter",
    "binning",
    "width_pixels",
    "height_pixels",
    "total_projections",
    "pixel_size_corrected_um",
    "pixel_size_correction_factor",
    "width_real_um",
    "height_real_um",
    "start_date",
    "end_date",
    "scan_duration",
    "exposure_s",
    "detector_to_ra_distance",
    "source_to_ra_distance",
];

fn axis_column_base(axis: &str) -> String {
    axis.trim().replace(' ', "_")
}

/// The complete, ordered column schema.
pub fn aggregate_columns() -> &'static [String] {
    static COLUMNS: OnceLock<Vec<String>> = OnceLock::new();
    COLUMNS.get_or_init(|| {
        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        for axis in TRACKED_AXES {
            let base = axis_column_base(axis);
            columns.push(format!("{}_start", base));
            columns.push(format!("{}_end", base));
            columns.push(format!("{}_range", base));
        }
        columns
    })
}

/// One row of the aggregate, aligned with [`aggregate_columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    values: Vec<String>,
}

impl AggregateRow {
    /// Flatten a processed record. Absent values become empty cells; the
    /// row always has one value per schema column.
    pub fn from_record(record: &ProcessedRecord) -> Self {
        let meta = &record.metadata;
        let derived = &record.derived;
        let first = meta.first_projection.as_ref();
        let last = meta.last_projection.as_ref();
        let sample = |f: fn(&ProjectionSample) -> Option<f64>| fmt_opt(&first.and_then(f));

        let mut values = vec![
            record.file.path.display().to_string(),
            record.file_name(),
            record.folder_path(),
            record.file.content_hash.clone(),
            record.file.size_bytes.to_string(),
            record.file.validated_at.to_rfc3339(),
            meta.file.acquisition_complete.to_string(),
            fmt_opt(&meta.machine.objective),
            fmt_opt(&meta.machine.pixel_size_um),
            fmt_opt(&meta.machine.power_watts),
            fmt_opt(&meta.machine.voltage_kv),
            fmt_opt(&derived.current),
            fmt_opt(&meta.machine.filter),
            fmt_opt(&meta.machine.binning),
            fmt_opt(&meta.image.width_pixels),
            fmt_opt(&meta.image.height_pixels),
            fmt_opt(&meta.image.total_projections),
            fmt_opt(&derived.pixel_size_um),
            fmt_opt(&derived.pixel_size_correction),
            fmt_opt(&derived.width_real_um),
            fmt_opt(&derived.height_real_um),
            fmt_opt(&first.and_then(|p| p.date.clone())),
            fmt_opt(&last.and_then(|p| p.date.clone())),
            fmt_opt(&derived.scan_duration),
            sample(|p| p.exposure_s),
            sample(|p| p.detector_to_ra_distance),
            sample(|p| p.source_to_ra_distance),
        ];

        for axis in TRACKED_AXES {
            let start = first.and_then(|p| p.axis(axis));
            let end = last.and_then(|p| p.axis(axis));
            let range = match (start, end) {
                (Some(s), Some(e)) => Some(e - s),
                _ => None,
            };
            values.push(fmt_opt(&start));
            values.push(fmt_opt(&end));
            values.push(fmt_opt(&range));
        }

        debug_assert_eq!(values.len(), aggregate_columns().len());
        Self { values }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        aggregate_columns()
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    /// Column/value pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        aggregate_columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

/// In-memory table of every file processed during this run.
#[derive(Debug)]
pub struct AggregateTable {
    output_dir: PathBuf,
    rows: Vec<AggregateRow>,
}

impl AggregateTable {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            rows: Vec::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn add_row(&mut self, record: &ProcessedRecord) {
        self.rows.push(AggregateRow::from_record(record));
    }

    pub fn rows(&self) -> &[AggregateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write all rows to a fresh timestamped CSV.
    ///
    /// Returns `Ok(None)` when there is nothing to write.
    pub fn save(&self) -> Result<Option<PathBuf>> {
        if self.rows.is_empty() {
            debug!("Aggregate is empty, nothing to save");
            return Ok(None);
        }

        fs::create_dir_all(&self.output_dir)?;
        let path = next_artifact_path(&self.output_dir);

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(aggregate_columns())?;
        for row in &self.rows {
            writer.write_record(row.values())?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = self.rows.len(), "Saved cumulative metadata");
        Ok(Some(path))
    }
}

/// Pick a timestamped artifact name that does not exist yet.
fn next_artifact_path(dir: &Path) -> PathBuf {
    let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let base = dir.join(format!("{}{}.{}", ARTIFACT_PREFIX, stamp, ARTIFACT_EXTENSION));
    if !base.exists() {
        return base;
    }
    (2u32..)
        .map(|n| dir.join(format!("{}{}_{}.{}", ARTIFACT_PREFIX, stamp, n, ARTIFACT_EXTENSION)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}

/// Sort key for an artifact file name: (timestamp, collision suffix).
fn artifact_sort_key(name: &str) -> Option<(String, u32)> {
    let rest = name
        .strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_EXTENSION)?
        .strip_suffix('.')?;
    let (stamp, suffix) = match rest.get(15..) {
        Some("") | None => (rest, 1),
        Some(tail) => (rest.get(..15)?, tail.strip_prefix('_')?.parse().ok()?),
    };
    Some((stamp.to_string(), suffix))
}

/// Most recent aggregate artifact in `dir`, by name.
pub fn latest_artifact(dir: &Path) -> Result<Option<PathBuf>> {
    let mut best: Option<((String, u32), PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(key) = artifact_sort_key(&name) else {
            continue;
        };
        if best.as_ref().map_or(true, |(k, _)| key > *k) {
            best = Some((key, entry.path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

/// Result of comparing an artifact header with the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnVerification {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    pub order_correct: bool,
}

impl ColumnVerification {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.order_correct
    }
}

/// Check that an artifact's header matches the schema exactly.
pub fn verify_columns(path: &Path) -> Result<ColumnVerification> {
    let mut reader = csv::Reader::from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let expected = aggregate_columns();

    let header_set: HashSet<&str> = header.iter().map(String::as_str).collect();
    let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();

    Ok(ColumnVerification {
        missing: expected
            .iter()
            .filter(|c| !header_set.contains(c.as_str()))
            .cloned()
            .collect(),
        extra: header
            .iter()
            .filter(|c| !expected_set.contains(c.as_str()))
            .cloned()
            .collect(),
        order_correct: header.as_slice() == expected,
    })
}
