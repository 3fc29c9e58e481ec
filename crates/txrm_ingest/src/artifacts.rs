//! Per-file side artifacts
//!
//! Two files are written beside each processed acquisition:
//! - `<stem>_metadata.txt`: human-readable report (primary, failure is terminal)
//! - `<stem>_config.txt`: reconstruction config from a [`ConfigEmitter`]
//!   (secondary, failure is logged and tolerated)

use crate::error::{IngestError, Result};
use crate::types::{ProcessedRecord, ProjectionSample};
use std::fmt::{Display, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

const NOT_AVAILABLE: &str = "n/a";

/// Format an optional value, empty when absent.
pub(crate) fn fmt_opt<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn or_na(text: String) -> String {
    if text.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        text
    }
}

fn sibling_path(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{}{}", stem, suffix))
}

pub fn report_path(source: &Path) -> PathBuf {
    sibling_path(source, "_metadata.txt")
}

pub fn config_path(source: &Path) -> PathBuf {
    sibling_path(source, "_config.txt")
}

// ============================================================================
// Text report
// ============================================================================

/// Render the human-readable metadata report.
pub fn render_text_report(record: &ProcessedRecord) -> String {
    let meta = &record.metadata;
    let derived = &record.derived;
    let mut out = String::new();

    let _ = writeln!(out, "TXRM File Metadata");
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out);

    section(&mut out, "Basic Information", &[
        ("file_name", record.file_name()),
        ("file_path", record.file.path.display().to_string()),
        ("folder_path", record.folder_path()),
        ("acquisition_complete", meta.file.acquisition_complete.to_string()),
    ]);

    section(&mut out, "Validation", &[
        ("sha256", record.file.content_hash.clone()),
        ("size_bytes", record.file.size_bytes.to_string()),
        ("validated_at", record.file.validated_at.to_rfc3339()),
    ]);

    section(&mut out, "Machine Settings", &[
        ("objective", fmt_opt(&meta.machine.objective)),
        ("pixel_size_um", fmt_opt(&meta.machine.pixel_size_um)),
        ("power_watts", fmt_opt(&meta.machine.power_watts)),
        ("voltage_kv", fmt_opt(&meta.machine.voltage_kv)),
        ("current", fmt_opt(&derived.current)),
        ("filter", fmt_opt(&meta.machine.filter)),
        ("binning", fmt_opt(&meta.machine.binning)),
    ]);

    section(&mut out, "Image Properties", &[
        ("width_pixels", fmt_opt(&meta.image.width_pixels)),
        ("height_pixels", fmt_opt(&meta.image.height_pixels)),
        ("total_projections", fmt_opt(&meta.image.total_projections)),
        ("pixel_size_corrected_um", fmt_opt(&derived.pixel_size_um)),
        ("width_real_um", fmt_opt(&derived.width_real_um)),
        ("height_real_um", fmt_opt(&derived.height_real_um)),
    ]);

    let _ = writeln!(out, "Projection Data Summary:");
    let _ = writeln!(out, "{}", "-".repeat(20));
    match (&meta.first_projection, &meta.last_projection) {
        (None, None) => {
            let _ = writeln!(out, "No projection data available");
        }
        (first, last) => {
            let date = |p: &Option<ProjectionSample>| {
                or_na(p.as_ref().and_then(|s| s.date.clone()).unwrap_or_default())
            };
            let _ = writeln!(out, "First Projection Date: {}", date(first));
            let _ = writeln!(out, "Last Projection Date: {}", date(last));
            let _ = writeln!(out, "Scan Duration: {}", or_na(fmt_opt(&derived.scan_duration)));
            if let Some(first) = first {
                axis_block(&mut out, "First Projection Axis Positions", first);
            }
            if let Some(last) = last {
                axis_block(&mut out, "Last Projection Axis Positions", last);
            }
        }
    }

    out
}

fn section(out: &mut String, title: &str, rows: &[(&str, String)]) {
    let _ = writeln!(out, "{}:", title);
    let _ = writeln!(out, "{}", "-".repeat(20));
    for (key, value) in rows {
        let _ = writeln!(out, "{}: {}", key, or_na(value.clone()));
    }
    let _ = writeln!(out);
}

fn axis_block(out: &mut String, title: &str, sample: &ProjectionSample) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}:", title);
    for axis in &sample.axes {
        let _ = writeln!(out, "{}: {}", axis.name, or_na(fmt_opt(&axis.position)));
    }
}

/// Write the text report beside the source file.
pub fn write_text_report(record: &ProcessedRecord) -> Result<PathBuf> {
    let path = report_path(&record.file.path);
    fs::write(&path, render_text_report(record)).map_err(|source| IngestError::Artifact {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

// ============================================================================
// Configuration export
// ============================================================================

/// An INI-style document: ordered sections of ordered key/value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        let idx = match self.sections.iter().position(|(name, _)| name == section) {
            Some(idx) => idx,
            None => {
                self.sections.push((section.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        };
        let entries = &mut self.sections[idx].1;
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .and_then(|(_, entries)| entries.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.as_str())
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, entries) in &self.sections {
            let _ = writeln!(out, "[{}]", name);
            for (key, value) in entries {
                let _ = writeln!(out, "{} = {}", key, value);
            }
            let _ = writeln!(out);
        }
        out
    }
}

/// Produces the per-file configuration document.
pub trait ConfigEmitter {
    fn emit_config(&self, record: &ProcessedRecord) -> Result<ConfigDocument>;
}

/// Config key used for each tracked axis in the `Axis` section.
const AXIS_CONFIG_KEYS: &[(&str, &str)] = &[
    ("sample x", "Sample X"),
    ("sample y", "Sample Y"),
    ("sample z", "Sample Z"),
    ("sample theta", "Sample Theta"),
    ("source x", "Source X"),
    ("source z", "Source Z"),
    ("detector z", "Detector Z"),
    ("ccd_z", "CCD Z"),
    ("ccd_x", "CCD X"),
    ("flat panel x", "Flat Panel X"),
    ("flat panel z", "Flat Panel Z"),
    ("mkiv filter wheel", "MkIV Filter Wheel"),
    ("dct", "DCT"),
];

/// Default emitter: Geometry / CT / Image / Detector / Axis / General.
#[derive(Debug, Clone, Default)]
pub struct IniConfigEmitter;

fn truncated(value: Option<f64>) -> String {
    value.map(|v| (v.trunc() as i64).to_string()).unwrap_or_default()
}

impl ConfigEmitter for IniConfigEmitter {
    fn emit_config(&self, record: &ProcessedRecord) -> Result<ConfigDocument> {
        let meta = &record.metadata;
        let first = meta.first_projection.as_ref();
        let mut doc = ConfigDocument::new();

        let pixel = fmt_opt(&record.derived.pixel_size_um.or(meta.machine.pixel_size_um));
        doc.set("Geometry", "FDD", fmt_opt(&first.and_then(|p| p.detector_to_ra_distance)));
        doc.set("Geometry", "FOD", fmt_opt(&first.and_then(|p| p.source_to_ra_distance)));
        doc.set("Geometry", "VoxelSizeX", pixel.clone());
        doc.set("Geometry", "VoxelSizeY", pixel);

        let projections = fmt_opt(&meta.image.total_projections);
        doc.set("CT", "NumberImages", projections.clone());
        doc.set("CT", "Type", "0");
        doc.set("CT", "RotationSector", "360.00000000");
        doc.set("CT", "NrImgDone", projections);
        doc.set("CT", "Voltage", truncated(meta.machine.voltage_kv));
        doc.set("CT", "Power", truncated(meta.machine.power_watts));
        doc.set("CT", "Current", truncated(record.derived.current));
        doc.set("CT", "Filter", fmt_opt(&meta.machine.filter));

        doc.set("Image", "Width", fmt_opt(&meta.image.width_pixels));
        doc.set("Image", "Height", fmt_opt(&meta.image.height_pixels));

        doc.set("Detector", "Binning", fmt_opt(&meta.machine.binning));

        for (key, axis) in AXIS_CONFIG_KEYS {
            let position = first.and_then(|p| p.axis(axis)).unwrap_or(0.0);
            doc.set("Axis", key, format!("{:?}", position));
        }

        doc.set("General", "Version", "1.0");
        Ok(doc)
    }
}

/// Emit and write the config artifact beside the source file.
///
/// Every failure is reported as a config-export error so callers can treat
/// it as non-terminal.
pub fn write_config(emitter: &dyn ConfigEmitter, record: &ProcessedRecord) -> Result<PathBuf> {
    let path = config_path(&record.file.path);
    let doc = emitter
        .emit_config(record)
        .map_err(|e| IngestError::ConfigExport {
            path: record.file.path.clone(),
            reason: e.to_string(),
        })?;
    fs::write(&path, doc.render()).map_err(|e| IngestError::ConfigExport {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AxisPosition, DerivedFields, FileRecord, MetadataRecord};
    use chrono::Utc;

    fn sample_record(path: &Path) -> ProcessedRecord {
        let mut metadata = MetadataRecord::default();
        metadata.file.file_name = Some("scan_01".to_string());
        metadata.machine.voltage_kv = Some(80.0);
        metadata.machine.power_watts = Some(10.0);
        metadata.machine.pixel_size_um = Some(1.5);
        metadata.image.total_projections = Some(1601);
        metadata.first_projection = Some(ProjectionSample {
            index: 0,
            date: Some("2024-03-01 10:00:00".to_string()),
            detector_to_ra_distance: Some(120.5),
            source_to_ra_distance: Some(-30.0),
            axes: vec![AxisPosition {
                name: "Sample_X".to_string(),
                position: Some(12.25),
            }],
            ..Default::default()
        });
        ProcessedRecord {
            file: FileRecord {
                path: path.to_path_buf(),
                content_hash: "abc123".to_string(),
                size_bytes: 42,
                validated_at: Utc::now(),
            },
            metadata,
            derived: DerivedFields {
                current: Some(12.5),
                pixel_size_um: Some(1.5),
                pixel_size_correction: Some(1.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_axis_keys_cover_tracked_axes() {
        let mapped: Vec<&str> = AXIS_CONFIG_KEYS.iter().map(|(_, axis)| *axis).collect();
        assert_eq!(mapped, crate::aggregate::TRACKED_AXES.to_vec());
    }

    #[test]
    fn test_sibling_paths() {
        let src = Path::new("/data/run/scan_01.txrm");
        assert_eq!(report_path(src), PathBuf::from("/data/run/scan_01_metadata.txt"));
        assert_eq!(config_path(src), PathBuf::from("/data/run/scan_01_config.txt"));
    }

    #[test]
    fn test_text_report_sections() {
        let record = sample_record(Path::new("/data/run/scan_01.txrm"));
        let report = render_text_report(&record);
        assert!(report.starts_with("TXRM File Metadata\n"));
        assert!(report.contains("Machine Settings:"));
        assert!(report.contains("current: 12.5"));
        assert!(report.contains("objective: n/a"));
        assert!(report.contains("sha256: abc123"));
        assert!(report.contains("First Projection Date: 2024-03-01 10:00:00"));
        assert!(report.contains("Last Projection Date: n/a"));
        assert!(report.contains("Sample_X: 12.25"));
    }

    #[test]
    fn test_ini_config_document() {
        let record = sample_record(Path::new("/data/run/scan_01.txrm"));
        let doc = IniConfigEmitter.emit_config(&record).unwrap();
        assert_eq!(
            doc.section_names(),
            vec!["Geometry", "CT", "Image", "Detector", "Axis", "General"]
        );
        assert_eq!(doc.get("Geometry", "FDD"), Some("120.5"));
        assert_eq!(doc.get("CT", "Voltage"), Some("80"));
        assert_eq!(doc.get("CT", "Current"), Some("12"));
        assert_eq!(doc.get("Axis", "sample x"), Some("12.25"));
        assert_eq!(doc.get("Axis", "dct"), Some("0.0"));
        assert!(doc.render().contains("[General]\nVersion = 1.0\n"));
    }

    #[test]
    fn test_write_artifacts_beside_source() {
        let temp = tempfile::TempDir::new().unwrap();
        let src = temp.path().join("scan_01.txrm");
        let record = sample_record(&src);

        let report = write_text_report(&record).unwrap();
        assert!(report.exists());
        let config = write_config(&IniConfigEmitter, &record).unwrap();
        assert!(fs::read_to_string(config).unwrap().contains("[CT]"));
    }

    #[test]
    fn test_write_report_into_missing_directory_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let record = sample_record(&temp.path().join("gone").join("scan.txrm"));
        let err = write_text_report(&record).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Artifact);
    }
}
