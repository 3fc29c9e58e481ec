//! Metadata provider port
//!
//! The vendor reader is not reentrant: it keeps a single open dataset handle.
//! [`MetadataSdk::read_metadata`] therefore takes `&mut self`, and the
//! pipeline holds the provider exclusively through a [`DatasetSession`] for
//! the duration of one file.

use crate::error::SdkError;
use crate::types::MetadataRecord;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A source of structured metadata for acquisition files.
pub trait MetadataSdk {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Read the metadata for `path`. Only one call may be in flight.
    fn read_metadata(&mut self, path: &Path) -> Result<MetadataRecord, SdkError>;
}

impl<T: MetadataSdk + ?Sized> MetadataSdk for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read_metadata(&mut self, path: &Path) -> Result<MetadataRecord, SdkError> {
        (**self).read_metadata(path)
    }
}

/// Exclusive, scoped use of the provider for one file.
pub struct DatasetSession<'a> {
    sdk: &'a mut dyn MetadataSdk,
    path: PathBuf,
    started: Instant,
}

impl<'a> DatasetSession<'a> {
    pub fn open(sdk: &'a mut dyn MetadataSdk, path: &Path) -> Self {
        debug!(sdk = sdk.name(), path = %path.display(), "Dataset session opened");
        Self {
            sdk,
            path: path.to_path_buf(),
            started: Instant::now(),
        }
    }

    /// Read the dataset and reject acquisitions the provider flags as incomplete.
    pub fn read(&mut self) -> Result<MetadataRecord, SdkError> {
        let record = self.sdk.read_metadata(&self.path)?;
        if !record.file.acquisition_complete {
            return Err(SdkError::Incomplete);
        }
        Ok(record)
    }
}

impl Drop for DatasetSession<'_> {
    fn drop(&mut self) {
        debug!(
            path = %self.path.display(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Dataset session released"
        );
    }
}

// ============================================================================
// Sidecar export
// ============================================================================

/// Reads the JSON export the acquisition software writes beside each file
/// (`scan.txrm` → `scan.metadata.json`).
#[derive(Debug, Default, Clone)]
pub struct SidecarSdk;

impl SidecarSdk {
    pub fn new() -> Self {
        Self
    }

    pub fn sidecar_path(path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("{}.metadata.json", stem))
    }
}

impl MetadataSdk for SidecarSdk {
    fn name(&self) -> &str {
        "sidecar"
    }

    fn read_metadata(&mut self, path: &Path) -> Result<MetadataRecord, SdkError> {
        let sidecar = Self::sidecar_path(path);
        let content = std::fs::read_to_string(&sidecar).map_err(|e| {
            SdkError::Open(format!("cannot read metadata export {}: {}", sidecar.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| SdkError::Malformed(format!("{}: {}", sidecar.display(), e)))
    }
}

// ============================================================================
// External extractor process
// ============================================================================

/// Runs an external extractor (`<program> <args...> <path>`) that prints a
/// JSON metadata record on stdout.
///
/// Each invocation is bounded by `timeout`; an extractor that hangs on a
/// corrupt file is killed and reported as [`SdkError::Timeout`].
#[derive(Debug, Clone)]
pub struct CommandSdk {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandSdk {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `None` or a zero duration disables the bound.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }
}

impl MetadataSdk for CommandSdk {
    fn name(&self) -> &str {
        "command"
    }

    fn read_metadata(&mut self, path: &Path) -> Result<MetadataRecord, SdkError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SdkError::Open(format!(
                    "failed to start extractor '{}': {}",
                    self.program.display(),
                    e
                ))
            })?;

        // Drain pipes on helper threads so a chatty extractor cannot block on
        // a full pipe while we wait for it.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let status = wait_with_deadline(&mut child, self.timeout)?;

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(SdkError::Open(format!(
                "extractor exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&stdout).map_err(|e| SdkError::Malformed(e.to_string()))
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || read_pipe(pipe))
}

/// Read to EOF, keeping whatever arrived before a read error.
fn read_pipe<R: Read>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf) {
        debug!(error = %e, bytes = buf.len(), "Extractor pipe read failed, output truncated");
    }
    buf
}

fn join_reader(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Wait for process exit, killing it once `timeout` has elapsed.
fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus, SdkError> {
    let Some(timeout) = timeout else {
        return Ok(child.wait()?);
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            warn!(timeout_secs = timeout.as_secs(), "Extractor exceeded timeout, killing");
            let _ = child.kill();
            let _ = child.wait();
            return Err(SdkError::Timeout(timeout.as_secs()));
        }
        std::thread::sleep(CHILD_POLL_INTERVAL);
    }
}
