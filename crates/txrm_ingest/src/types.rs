//! Core types for the ingestion pipeline
//!
//! The metadata provider returns a [`MetadataRecord`]; the pipeline wraps it
//! with the [`FileRecord`] produced at validation time and the
//! [`DerivedFields`] it computes, yielding a [`ProcessedRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// File identity
// ============================================================================

/// Identity of a validated input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path of the input
    pub path: PathBuf,
    /// Hex SHA-256 over the full byte stream
    pub content_hash: String,
    /// Size in bytes (always > 0 for a valid record)
    pub size_bytes: u64,
    /// When validation completed
    pub validated_at: DateTime<Utc>,
}

// ============================================================================
// Metadata record (provider response)
// ============================================================================

/// Structured metadata for one acquisition file.
///
/// Every group is present; individual values inside a group are optional so
/// that a provider which cannot report a field simply leaves it out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataRecord {
    pub file: FileIdentity,
    pub machine: MachineSettings,
    pub image: ImageGeometry,
    pub first_projection: Option<ProjectionSample>,
    pub last_projection: Option<ProjectionSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileIdentity {
    pub file_name: Option<String>,
    pub acquisition_complete: bool,
}

impl Default for FileIdentity {
    fn default() -> Self {
        Self {
            file_name: None,
            acquisition_complete: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    pub objective: Option<String>,
    /// Pixel size as reported, nominally micrometres
    pub pixel_size_um: Option<f64>,
    pub power_watts: Option<f64>,
    pub voltage_kv: Option<f64>,
    pub filter: Option<String>,
    pub binning: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageGeometry {
    pub width_pixels: Option<u32>,
    pub height_pixels: Option<u32>,
    pub total_projections: Option<u32>,
}

/// Per-projection values sampled at the first and last projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionSample {
    pub index: u32,
    /// Timestamp text exactly as the provider reports it
    pub date: Option<String>,
    pub exposure_s: Option<f64>,
    pub detector_to_ra_distance: Option<f64>,
    pub source_to_ra_distance: Option<f64>,
    pub axes: Vec<AxisPosition>,
}

impl ProjectionSample {
    /// Position of a named axis. Names compare case-insensitively and treat
    /// `_` and ` ` as equivalent.
    pub fn axis(&self, name: &str) -> Option<f64> {
        let wanted = normalize_axis_name(name);
        self.axes
            .iter()
            .find(|a| normalize_axis_name(&a.name) == wanted)
            .and_then(|a| a.position)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisPosition {
    pub name: String,
    pub position: Option<f64>,
}

pub(crate) fn normalize_axis_name(name: &str) -> String {
    name.trim().to_lowercase().replace('_', " ")
}

// ============================================================================
// Derived values
// ============================================================================

/// Values computed from raw metadata fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    /// power / voltage * CURRENT_SCALE; None when voltage is zero or missing
    pub current: Option<f64>,
    /// Pixel size after the sanity-range correction
    pub pixel_size_um: Option<f64>,
    /// Factor applied to the reported pixel size (1.0 when unchanged)
    pub pixel_size_correction: Option<f64>,
    pub width_real_um: Option<f64>,
    pub height_real_um: Option<f64>,
    /// Elapsed scan time as `H:MM:SS`
    pub scan_duration: Option<String>,
}

/// A fully processed file: provider metadata plus pipeline-added fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub file: FileRecord,
    pub metadata: MetadataRecord,
    pub derived: DerivedFields,
}

impl ProcessedRecord {
    pub fn file_name(&self) -> String {
        self.metadata.file.file_name.clone().unwrap_or_else(|| {
            self.file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        })
    }

    pub fn folder_path(&self) -> String {
        self.file
            .path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_record_partial_json() {
        let json = r#"{
            "machine": { "power_watts": 10.0, "voltage_kv": 80.0 },
            "first_projection": {
                "index": 0,
                "date": "2024-03-01 10:00:00",
                "axes": [{ "name": "Sample X", "position": 1.5 }]
            }
        }"#;
        let record: MetadataRecord = serde_json::from_str(json).unwrap();
        assert!(record.file.acquisition_complete);
        assert_eq!(record.machine.power_watts, Some(10.0));
        assert_eq!(record.machine.objective, None);
        assert!(record.last_projection.is_none());

        let first = record.first_projection.unwrap();
        assert_eq!(first.axis("sample_x"), Some(1.5));
        assert_eq!(first.axis("Sample Y"), None);
    }
}
