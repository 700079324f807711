//! Spin adapter.
//!
//! `spin -search -a -O2 <file>` generates and runs the verifier in one go. A violation
//! leaves `<basename>.trail` in the directory the search ran in; the trail is moved
//! next to the work file and replayed with `spin -t <file>`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use super::{CheckerError, ModelChecker, VerifyResult};
use crate::util::sanitize_output;

pub struct SpinModelChecker {
    spin_path: PathBuf,
    /// Where the search runs and the trail appears; the work dir when unset.
    search_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl SpinModelChecker {
    pub fn new(spin_path: impl Into<PathBuf>) -> Self {
        Self {
            spin_path: spin_path.into(),
            search_dir: None,
            timeout: None,
        }
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn run(&self, args: &[&OsStr], cwd: &Path) -> Result<Output, CheckerError> {
        let mut command = Command::new(&self.spin_path);
        command
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawn_error = |source: std::io::Error| CheckerError::Spawn {
            binary: self.spin_path.display().to_string(),
            source,
        };

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result.map_err(spawn_error),
                Err(_) => {
                    tracing::error!("Spin timed out after {} seconds", limit.as_secs());
                    Err(CheckerError::Timeout(limit))
                }
            },
            None => command.output().await.map_err(spawn_error),
        }
    }
}

fn combined_output(output: &Output) -> String {
    let mut text = sanitize_output(&output.stdout);
    let stderr = sanitize_output(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

#[async_trait]
impl ModelChecker for SpinModelChecker {
    async fn verify(
        &self,
        program: &str,
        property: &str,
        work_dir: &Path,
    ) -> Result<VerifyResult, CheckerError> {
        tokio::fs::create_dir_all(work_dir).await?;
        let work_dir = tokio::fs::canonicalize(work_dir).await?;

        let file_name = format!("mission-{}.pml", Uuid::new_v4());
        let workfile = work_dir.join(&file_name);
        tokio::fs::write(&workfile, format!("{}\n{}\n", program, property)).await?;

        let search_dir = self.search_dir.clone().unwrap_or_else(|| work_dir.clone());
        tracing::info!("Running spin on {}", workfile.display());

        let output = self
            .run(
                &[
                    OsStr::new("-search"),
                    OsStr::new("-a"),
                    OsStr::new("-O2"),
                    workfile.as_os_str(),
                ],
                &search_dir,
            )
            .await?;

        if !output.status.success() {
            let status = output.status.code().unwrap_or(-1);
            let text = combined_output(&output);
            tracing::warn!("Spin exited with status {}", status);
            return Err(CheckerError::Execution { status, output: text });
        }

        let produced = search_dir.join(format!("{}.trail", file_name));
        if !tokio::fs::try_exists(&produced).await? {
            tracing::info!("Spin found no violation");
            return Ok(VerifyResult::pass());
        }

        let trail = work_dir.join(format!("{}.trail", file_name));
        if produced != trail {
            tokio::fs::rename(&produced, &trail).await?;
        }

        let replay = self
            .run(&[OsStr::new("-t"), workfile.as_os_str()], &work_dir)
            .await?;
        if !replay.status.success() {
            tracing::error!(
                "Failed to replay trail {}; returning its output anyway",
                trail.display()
            );
        }

        let text = combined_output(&replay);
        tracing::info!("Spin found a property violation");
        tracing::debug!("Trail replay: {}", text);
        Ok(VerifyResult::violated(text))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Stand-in for spin: `-search` succeeds (optionally dropping a trail in cwd),
    /// `-t` prints a replay.
    fn fake_spin(dir: &Path, leaves_trail: bool) -> PathBuf {
        let trail = if leaves_trail {
            ": > \"$(basename \"$4\").trail\""
        } else {
            ":"
        };
        let body = format!(
            "#!/bin/sh\nif [ \"$1\" = \"-search\" ]; then\n  echo \"pan: searching $4\"\n  {}\n  exit 0\nfi\necho \"replay of $2\"\necho \"spin: trail ends after 7 steps\"\n",
            trail
        );
        let path = dir.join("spin");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("spin");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_no_trail_passes() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let checker = SpinModelChecker::new(fake_spin(bin.path(), false));

        let result = checker
            .verify("init { skip }", "ltl p { <> true }", work.path())
            .await
            .unwrap();
        assert_eq!(result, VerifyResult::pass());

        // the work file holds program then property
        let pml = std::fs::read_dir(work.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.extension().map_or(false, |e| e == "pml"))
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(pml).unwrap(),
            "init { skip }\nltl p { <> true }\n"
        );
    }

    #[tokio::test]
    async fn test_trail_is_replayed() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let checker = SpinModelChecker::new(fake_spin(bin.path(), true));

        let result = checker
            .verify("init { skip }", "ltl p { [] false }", work.path())
            .await
            .unwrap();
        assert!(!result.ok);
        let trail = result.trail.unwrap();
        assert!(trail.contains("trail ends after 7 steps"));
        assert!(trail.contains("replay of "));
    }

    #[tokio::test]
    async fn test_trail_relocated_from_search_dir() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let search = tempfile::tempdir().unwrap();
        let checker =
            SpinModelChecker::new(fake_spin(bin.path(), true)).with_search_dir(search.path());

        let result = checker
            .verify("init { skip }", "ltl p { [] false }", work.path())
            .await
            .unwrap();
        assert!(!result.ok);

        let in_search = std::fs::read_dir(search.path()).unwrap().count();
        assert_eq!(in_search, 0);
        let trails = std::fs::read_dir(work.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".pml.trail"))
            .count();
        assert_eq!(trails, 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_error() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let spin = script(bin.path(), "echo 'spin: line 12, Error: syntax error' >&2\nexit 1");

        let err = SpinModelChecker::new(spin)
            .verify("init { skip }", "ltl p { [] ( }", work.path())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        match err {
            CheckerError::Execution { status, output } => {
                assert_eq!(status, 1);
                assert!(output.contains("line 12, Error: syntax error"));
            }
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let spin = script(bin.path(), "sleep 5");

        let err = SpinModelChecker::new(spin)
            .with_timeout(Duration::from_millis(200))
            .verify("init { skip }", "ltl p { <> true }", work.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckerError::Timeout(limit) if limit == Duration::from_millis(200)));
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "model checker timed out after 200ms");
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_recoverable() {
        let work = tempfile::tempdir().unwrap();
        let err = SpinModelChecker::new("/nonexistent/spin")
            .verify("init { skip }", "ltl p { <> true }", work.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckerError::Spawn { .. }));
        assert!(!err.is_recoverable());
    }
}
