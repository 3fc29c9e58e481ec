//! Per-file processing pipeline
//!
//! validate → extract → derive → report → config. Validation, extraction and
//! the text report are terminal for a file; the config artifact is
//! best-effort and its failure is only recorded on the result.

use crate::artifacts::{write_config, write_text_report, ConfigEmitter, IniConfigEmitter};
use crate::derive::derive_fields;
use crate::error::{IngestError, Result};
use crate::sdk::{DatasetSession, MetadataSdk};
use crate::types::{FileRecord, ProcessedRecord};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// A file that made it through every terminal stage.
#[derive(Debug)]
pub struct ProcessedFile {
    pub record: ProcessedRecord,
    pub report_path: PathBuf,
    pub config_path: Option<PathBuf>,
    /// Set when the config artifact could not be written.
    pub config_error: Option<IngestError>,
}

/// Owns the metadata provider and the config emitter for the whole run.
pub struct Pipeline {
    sdk: Box<dyn MetadataSdk>,
    emitter: Box<dyn ConfigEmitter>,
}

impl Pipeline {
    pub fn new(sdk: Box<dyn MetadataSdk>) -> Self {
        Self::with_emitter(sdk, Box::new(IniConfigEmitter))
    }

    pub fn with_emitter(sdk: Box<dyn MetadataSdk>, emitter: Box<dyn ConfigEmitter>) -> Self {
        Self { sdk, emitter }
    }

    pub fn sdk_name(&self) -> &str {
        self.sdk.name()
    }

    /// Run every stage for one file.
    ///
    /// Errors are logged here with their kind before being returned, so the
    /// caller only has to count them.
    pub fn process_single_file(&mut self, path: &Path) -> Result<ProcessedFile> {
        match self.run_stages(path) {
            Ok(processed) => {
                info!(
                    path = %path.display(),
                    report = %processed.report_path.display(),
                    config_exported = processed.config_error.is_none(),
                    "File processed"
                );
                Ok(processed)
            }
            Err(e) => {
                error!(path = %path.display(), kind = %e.kind(), error = %e, "File failed");
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, path: &Path) -> Result<ProcessedFile> {
        let file = validate(path)?;
        debug!(path = %path.display(), hash = %file.content_hash, size = file.size_bytes, "Validated");

        let metadata = {
            let mut session = DatasetSession::open(self.sdk.as_mut(), path);
            session.read().map_err(|source| IngestError::Extraction {
                path: path.to_path_buf(),
                source,
            })?
        };

        let derived = derive_fields(&metadata);
        let record = ProcessedRecord {
            file,
            metadata,
            derived,
        };

        let report_path = write_text_report(&record)?;

        let (config_path, config_error) = match write_config(self.emitter.as_ref(), &record) {
            Ok(p) => (Some(p), None),
            Err(e) => {
                warn!(path = %path.display(), kind = %e.kind(), error = %e, "Config export failed, continuing");
                (None, Some(e))
            }
        };

        Ok(ProcessedFile {
            record,
            report_path,
            config_path,
            config_error,
        })
    }
}

/// Check the file exists and is non-empty, and hash its contents.
pub fn validate(path: &Path) -> Result<FileRecord> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(IngestError::validation(path, "File not found"));
        }
        Err(e) => return Err(IngestError::validation(path, format!("Cannot stat file: {}", e))),
    };
    if !meta.is_file() {
        return Err(IngestError::validation(path, "Not a regular file"));
    }
    if meta.len() == 0 {
        return Err(IngestError::validation(path, "File is empty"));
    }

    let content_hash = hash_file(path)
        .map_err(|e| IngestError::validation(path, format!("Cannot read file: {}", e)))?;

    Ok(FileRecord {
        path: std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
        content_hash,
        size_bytes: meta.len(),
        validated_at: Utc::now(),
    })
}

/// Hex SHA-256 of the full byte stream.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{config_path, report_path, ConfigDocument};
    use crate::error::{ErrorKind, SdkError};
    use crate::types::MetadataRecord;
    use std::fs;
    use tempfile::TempDir;

    struct StaticSdk {
        record: MetadataRecord,
        calls: usize,
    }

    impl MetadataSdk for StaticSdk {
        fn name(&self) -> &str {
            "static"
        }

        fn read_metadata(&mut self, _path: &Path) -> std::result::Result<MetadataRecord, SdkError> {
            self.calls += 1;
            Ok(self.record.clone())
        }
    }

    struct FailingSdk;

    impl MetadataSdk for FailingSdk {
        fn name(&self) -> &str {
            "failing"
        }

        fn read_metadata(&mut self, _path: &Path) -> std::result::Result<MetadataRecord, SdkError> {
            Err(SdkError::Open("dataset locked".to_string()))
        }
    }

    struct BrokenEmitter;

    impl ConfigEmitter for BrokenEmitter {
        fn emit_config(&self, _record: &ProcessedRecord) -> Result<ConfigDocument> {
            Err(IngestError::ConfigExport {
                path: PathBuf::from("n/a"),
                reason: "emitter exploded".to_string(),
            })
        }
    }

    fn sample_metadata() -> MetadataRecord {
        let mut record = MetadataRecord::default();
        record.machine.power_watts = Some(10.0);
        record.machine.voltage_kv = Some(80.0);
        record
    }

    fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        let temp = TempDir::new().unwrap();
        let path = create_test_file(temp.path(), "a.txrm", b"abc");
        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_validate_missing_and_empty() {
        let temp = TempDir::new().unwrap();
        let err = validate(&temp.path().join("nope.txrm")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let empty = create_test_file(temp.path(), "empty.txrm", b"");
        let err = validate(&empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_validation_failure_skips_extraction() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = Pipeline::new(Box::new(FailingSdk));
        let err = pipeline
            .process_single_file(&temp.path().join("missing.txrm"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_successful_file_writes_both_artifacts() {
        let temp = TempDir::new().unwrap();
        let path = create_test_file(temp.path(), "scan.txrm", b"payload");
        let mut pipeline = Pipeline::new(Box::new(StaticSdk {
            record: sample_metadata(),
            calls: 0,
        }));

        let processed = pipeline.process_single_file(&path).unwrap();
        assert_eq!(processed.record.file.size_bytes, 7);
        assert_eq!(processed.record.derived.current, Some(12.5));
        assert!(processed.config_error.is_none());
        assert!(report_path(&path).exists());
        assert!(config_path(&path).exists());
    }

    #[test]
    fn test_extraction_failure_is_terminal() {
        let temp = TempDir::new().unwrap();
        let path = create_test_file(temp.path(), "scan.txrm", b"payload");
        let mut pipeline = Pipeline::new(Box::new(FailingSdk));

        let err = pipeline.process_single_file(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
        assert!(!report_path(&path).exists());
    }

    #[test]
    fn test_incomplete_acquisition_is_extraction_error() {
        let temp = TempDir::new().unwrap();
        let path = create_test_file(temp.path(), "scan.txrm", b"payload");
        let mut record = sample_metadata();
        record.file.acquisition_complete = false;
        let mut pipeline = Pipeline::new(Box::new(StaticSdk { record, calls: 0 }));

        let err = pipeline.process_single_file(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
    }

    #[test]
    fn test_config_failure_is_tolerated() {
        let temp = TempDir::new().unwrap();
        let path = create_test_file(temp.path(), "scan.txrm", b"payload");
        let mut pipeline = Pipeline::with_emitter(
            Box::new(StaticSdk {
                record: sample_metadata(),
                calls: 0,
            }),
            Box::new(BrokenEmitter),
        );

        let processed = pipeline.process_single_file(&path).unwrap();
        assert!(processed.config_path.is_none());
        assert_eq!(
            processed.config_error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::ConfigExport)
        );
        assert!(report_path(&path).exists());
    }
}
