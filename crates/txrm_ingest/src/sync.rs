//! Remote repository sync
//!
//! Pushes each freshly saved aggregate into a git working copy:
//! copy → pull → add → commit → push. Any failing step aborts the sequence
//! and is reported as `false`; ingestion is never affected.

use crate::error::{ErrorKind, IngestError, Result};
use crate::state::{redact_token, SyncConfig};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

/// Runs one git invocation inside a working copy.
pub trait GitRunner {
    /// `Err` carries a human-readable reason (usually git's stderr).
    fn run(&mut self, repo: &Path, args: &[&str], env: &[(String, String)]) -> std::result::Result<(), String>;
}

/// Shells out to the `git` executable found on `PATH`.
#[derive(Debug, Clone)]
pub struct ProcessGitRunner {
    git: PathBuf,
}

impl ProcessGitRunner {
    pub fn new() -> Result<Self> {
        let git = which::which("git")
            .map_err(|e| IngestError::Config(format!("git executable not found: {}", e)))?;
        Ok(Self { git })
    }
}

impl GitRunner for ProcessGitRunner {
    fn run(&mut self, repo: &Path, args: &[&str], env: &[(String, String)]) -> std::result::Result<(), String> {
        let output = Command::new(&self.git)
            .args(args)
            .current_dir(repo)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("failed to run git: {}", e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("git exited with {}: {}", output.status, stderr.trim()))
        }
    }
}

/// Git-backed sync adapter for the aggregate artifact.
pub struct GitSync {
    repo_path: PathBuf,
    remote_url: String,
    branch: String,
    token: String,
    runner: Box<dyn GitRunner>,
}

impl std::fmt::Debug for GitSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitSync")
            .field("repo_path", &self.repo_path)
            .field("remote_url", &self.remote_url)
            .field("branch", &self.branch)
            .field("token", &redact_token(&self.token))
            .finish()
    }
}

impl GitSync {
    /// Build from a sync configuration; incomplete configurations are rejected.
    pub fn from_config(config: &SyncConfig, runner: Box<dyn GitRunner>) -> Result<Self> {
        if !config.is_complete() {
            return Err(IngestError::Config("incomplete sync configuration".to_string()));
        }
        let (Some(repo_path), Some(remote_url), Some(token)) = (
            config.repo_path.clone(),
            config.resolved_remote(),
            config.token.clone(),
        ) else {
            return Err(IngestError::Config("incomplete sync configuration".to_string()));
        };
        Ok(Self {
            repo_path,
            remote_url,
            branch: config.branch.clone(),
            token,
            runner,
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Initialise the working copy when it is not a repository yet.
    pub fn prepare(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.repo_path)?;
        if self.repo_path.join(".git").exists() {
            debug!(repo = %self.repo_path.display(), "Working copy already initialised");
            return Ok(());
        }

        info!(repo = %self.repo_path.display(), remote = %self.remote_url, "Initialising sync working copy");
        let remote = self.remote_url.clone();
        let branch = self.branch.clone();
        self.step("init", &["init"])?;
        self.step("branch", &["branch", "-M", &branch])?;
        self.step("remote", &["remote", "add", "origin", &remote])?;
        Ok(())
    }

    /// Push `artifact` with `message` (a timestamped default when `None`).
    ///
    /// Returns `false` on the first failing step; the failure is logged.
    pub fn push(&mut self, artifact: &Path, message: Option<&str>) -> bool {
        match self.try_push(artifact, message) {
            Ok(()) => {
                info!(artifact = %artifact.display(), branch = %self.branch, "Aggregate synced");
                true
            }
            Err(e) => {
                error!(
                    artifact = %artifact.display(),
                    kind = %ErrorKind::Sync,
                    error = %e,
                    "Sync failed, continuing"
                );
                false
            }
        }
    }

    fn try_push(&mut self, artifact: &Path, message: Option<&str>) -> Result<()> {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| sync_error("copy", "artifact has no file name"))?;

        std::fs::copy(artifact, self.repo_path.join(&name))
            .map_err(|e| sync_error("copy", e.to_string()))?;

        let message = message.map(str::to_string).unwrap_or_else(|| {
            format!("Update metadata CSV - {}", Local::now().format("%Y-%m-%d %H:%M:%S"))
        });
        let branch = self.branch.clone();

        // An earlier cycle may have committed without pushing; merge rather
        // than stop on divergent branches.
        self.step("pull", &["pull", "--no-rebase", "--no-edit", "origin", &branch])?;
        self.step("add", &["add", &name])?;
        self.step("commit", &["commit", "-m", &message])?;
        self.step("push", &["push", "origin", &branch])?;
        Ok(())
    }

    fn step(&mut self, name: &str, args: &[&str]) -> Result<()> {
        debug!(step = name, token = %redact_token(&self.token), "Running git step");
        let env = credential_env(&self.token);
        self.runner
            .run(&self.repo_path, args, &env)
            .map_err(|reason| sync_error(name, reason))
    }
}

fn sync_error(step: &str, reason: impl Into<String>) -> IngestError {
    IngestError::Sync {
        step: step.to_string(),
        reason: reason.into(),
    }
}

/// Environment that injects the token as an HTTP header for this invocation
/// only, so it never appears in argv or in the repository config.
pub fn credential_env(token: &str) -> Vec<(String, String)> {
    let basic = STANDARD.encode(format!("x-access-token:{}", token));
    vec![
        ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
        ("GIT_CONFIG_KEY_0".to_string(), "http.extraHeader".to_string()),
        (
            "GIT_CONFIG_VALUE_0".to_string(),
            format!("Authorization: Basic {}", basic),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct RecordingRunner {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        envs: Arc<Mutex<Vec<Vec<(String, String)>>>>,
        fail_on: Option<&'static str>,
    }

    impl GitRunner for RecordingRunner {
        fn run(&mut self, _repo: &Path, args: &[&str], env: &[(String, String)]) -> std::result::Result<(), String> {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(|a| a.to_string()).collect());
            self.envs.lock().unwrap().push(env.to_vec());
            if Some(args[0]) == self.fail_on {
                return Err(format!("{} rejected", args[0]));
            }
            Ok(())
        }
    }

    fn config(repo: &Path) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.enabled = true;
        config.repo_path = Some(repo.to_path_buf());
        config.remote_url = Some("https://example.com/lab/scans.git".to_string());
        config.token = Some("ghp_secret_token".to_string());
        config
    }

    fn artifact(dir: &Path) -> PathBuf {
        let path = dir.join("cumulative_metadata_20240301_101500.csv");
        fs::write(&path, "file_path\n/a.txrm\n").unwrap();
        path
    }

    #[test]
    fn test_incomplete_config_rejected() {
        let mut cfg = config(Path::new("/repo"));
        cfg.token = None;
        assert!(GitSync::from_config(&cfg, Box::new(RecordingRunner::default())).is_err());
    }

    #[test]
    fn test_prepare_initialises_once() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let runner = RecordingRunner::default();
        let mut sync = GitSync::from_config(&config(&repo), Box::new(runner.clone())).unwrap();

        sync.prepare().unwrap();
        let calls = runner.calls.lock().unwrap().clone();
        assert_eq!(calls[0], vec!["init"]);
        assert_eq!(calls[1], vec!["branch", "-M", "main"]);
        assert_eq!(calls[2], vec!["remote", "add", "origin", "https://example.com/lab/scans.git"]);

        fs::create_dir_all(repo.join(".git")).unwrap();
        sync.prepare().unwrap();
        assert_eq!(runner.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_push_runs_steps_in_order() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        let csv = artifact(temp.path());
        let runner = RecordingRunner::default();
        let mut sync = GitSync::from_config(&config(&repo), Box::new(runner.clone())).unwrap();

        assert!(sync.push(&csv, Some("Update metadata")));
        assert!(repo.join("cumulative_metadata_20240301_101500.csv").exists());

        let verbs: Vec<String> = runner.calls.lock().unwrap().iter().map(|c| c[0].clone()).collect();
        assert_eq!(verbs, vec!["pull", "add", "commit", "push"]);
        assert_eq!(
            runner.calls.lock().unwrap()[0],
            vec!["pull", "--no-rebase", "--no-edit", "origin", "main"]
        );
        assert_eq!(
            runner.calls.lock().unwrap()[2],
            vec!["commit", "-m", "Update metadata"]
        );
    }

    #[test]
    fn test_first_failure_aborts() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        let csv = artifact(temp.path());
        let runner = RecordingRunner {
            fail_on: Some("pull"),
            ..Default::default()
        };
        let mut sync = GitSync::from_config(&config(&repo), Box::new(runner.clone())).unwrap();

        assert!(!sync.push(&csv, None));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_artifact_fails_without_git() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::default();
        let mut sync =
            GitSync::from_config(&config(&temp.path().join("repo")), Box::new(runner.clone())).unwrap();

        assert!(!sync.push(&temp.path().join("gone.csv"), None));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_token_only_in_env() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        let csv = artifact(temp.path());
        let runner = RecordingRunner::default();
        let mut sync = GitSync::from_config(&config(&repo), Box::new(runner.clone())).unwrap();
        assert!(sync.push(&csv, None));

        for call in runner.calls.lock().unwrap().iter() {
            assert!(call.iter().all(|a| !a.contains("ghp_secret_token")));
        }
        let env = &runner.envs.lock().unwrap()[0];
        let expected = STANDARD.encode("x-access-token:ghp_secret_token");
        assert!(env
            .iter()
            .any(|(k, v)| k == "GIT_CONFIG_VALUE_0" && v.ends_with(&expected)));
        assert!(!format!("{:?}", sync).contains("ghp_secret_token"));
    }

    // ------------------------------------------------------------------------
    // Real git against a local bare remote
    // ------------------------------------------------------------------------

    /// Delegates to `git`, failing the next `fail_pushes` push steps.
    struct FlakyPushRunner {
        inner: ProcessGitRunner,
        fail_pushes: Arc<Mutex<usize>>,
    }

    impl GitRunner for FlakyPushRunner {
        fn run(&mut self, repo: &Path, args: &[&str], env: &[(String, String)]) -> std::result::Result<(), String> {
            if args[0] == "push" {
                let mut remaining = self.fail_pushes.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err("connection reset".to_string());
                }
            }
            self.inner.run(repo, args, env)
        }
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("git should run");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn set_identity(dir: &Path) {
        git(dir, &["config", "user.name", "TXRM Test"]);
        git(dir, &["config", "user.email", "txrm@example.com"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
    }

    #[test]
    fn test_push_recovers_after_remote_diverges() {
        let Ok(inner) = ProcessGitRunner::new() else {
            eprintln!("git not installed, skipping");
            return;
        };
        let temp = TempDir::new().unwrap();
        let remote = temp.path().join("remote.git");
        fs::create_dir_all(&remote).unwrap();
        git(&remote, &["init", "--bare"]);
        let remote_url = remote.to_string_lossy().into_owned();

        // Another writer seeds the remote.
        let other = temp.path().join("other");
        fs::create_dir_all(&other).unwrap();
        git(&other, &["init"]);
        set_identity(&other);
        git(&other, &["branch", "-M", "main"]);
        git(&other, &["remote", "add", "origin", &remote_url]);
        fs::write(other.join("README.md"), "scans\n").unwrap();
        git(&other, &["add", "README.md"]);
        git(&other, &["commit", "-m", "seed"]);
        git(&other, &["push", "origin", "main"]);

        let repo = temp.path().join("repo");
        let mut cfg = config(&repo);
        cfg.remote_url = Some(remote_url);
        let fail_pushes = Arc::new(Mutex::new(0));
        let runner = FlakyPushRunner {
            inner,
            fail_pushes: fail_pushes.clone(),
        };
        let mut sync = GitSync::from_config(&cfg, Box::new(runner)).unwrap();
        sync.prepare().unwrap();
        set_identity(&repo);

        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let write_artifact = |name: &str| {
            let path = out.join(name);
            fs::write(&path, "file_path\n/a.txrm\n").unwrap();
            path
        };

        assert!(sync.push(&write_artifact("cumulative_metadata_20240301_100000.csv"), None));

        *fail_pushes.lock().unwrap() = 1;
        assert!(!sync.push(&write_artifact("cumulative_metadata_20240301_110000.csv"), None));

        // The remote moves on while the working copy holds an unpushed commit.
        git(&other, &["pull", "--no-rebase", "origin", "main"]);
        fs::write(other.join("NOTES.md"), "calibrated\n").unwrap();
        git(&other, &["add", "NOTES.md"]);
        git(&other, &["commit", "-m", "notes"]);
        git(&other, &["push", "origin", "main"]);

        assert!(sync.push(&write_artifact("cumulative_metadata_20240301_120000.csv"), None));

        let files = git(&remote, &["ls-tree", "--name-only", "main"]);
        for name in [
            "README.md",
            "NOTES.md",
            "cumulative_metadata_20240301_100000.csv",
            "cumulative_metadata_20240301_110000.csv",
            "cumulative_metadata_20240301_120000.csv",
        ] {
            assert!(files.lines().any(|l| l == name), "{} missing from remote: {}", name, files);
        }
    }
}
