use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::process::{CommandRunner, CommandSpec};
use crate::common::config::ManagerConfig;
use crate::ui::prelude::*;

/// Detects whether the preferred package manager is installed.
#[derive(Clone)]
pub struct PrerequisiteChecker {
    program: String,
    version_args: Vec<String>,
    known_paths: Vec<PathBuf>,
    probe_timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl PrerequisiteChecker {
    pub fn new(manager: &ManagerConfig, probe_timeout: Duration, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: manager.program.clone(),
            version_args: manager.version_args.clone(),
            known_paths: manager.known_paths.clone(),
            probe_timeout,
            runner,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// True if the version command succeeds or the manager is found on disk.
    /// Never fails: every probe error counts as "not available".
    pub async fn is_manager_available(&self) -> bool {
        if self.version_command_succeeds().await {
            return true;
        }
        self.installed_on_disk()
    }

    async fn version_command_succeeds(&self) -> bool {
        let spec = CommandSpec::new(self.program.as_str(), self.version_args.iter().cloned())
            .with_timeout(self.probe_timeout);
        match self.runner.run(&spec, &CancellationToken::new()).await {
            Ok(()) => true,
            Err(err) => {
                emit(
                    Level::Debug,
                    "prerequisite.version.failed",
                    &format!("Version probe failed: {err}"),
                    None,
                );
                false
            }
        }
    }

    /// A fresh install may not be on `PATH` yet, so the well-known locations
    /// are checked as well.
    fn installed_on_disk(&self) -> bool {
        which::which(&self.program).is_ok() || self.known_paths.iter().any(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::process::ProcessError;
    use crate::install::test_support::FakeRunner;

    fn manager(known_paths: Vec<PathBuf>) -> ManagerConfig {
        ManagerConfig {
            program: "spaller-test-manager-absent".into(),
            version_args: vec!["--version".into()],
            known_paths,
            bootstrap_command: "true".into(),
        }
    }

    fn exit(code: i32) -> Result<(), ProcessError> {
        Err(ProcessError::NonZeroExit {
            program: "spaller-test-manager-absent".into(),
            code: Some(code),
        })
    }

    #[tokio::test]
    async fn version_success_means_available() {
        let runner = Arc::new(FakeRunner::with_results(vec![Ok(())]));
        let checker = PrerequisiteChecker::new(&manager(vec![]), Duration::from_secs(1), runner.clone());
        assert!(checker.is_manager_available().await);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "spaller-test-manager-absent");
        assert_eq!(calls[0].args, vec!["--version"]);
        assert!(!calls[0].elevated);
    }

    #[tokio::test]
    async fn falls_back_to_known_paths() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("manager.exe");
        std::fs::write(&exe, b"").unwrap();

        let runner = Arc::new(FakeRunner::with_results(vec![exit(1)]));
        let checker = PrerequisiteChecker::new(&manager(vec![exe]), Duration::from_secs(1), runner);
        assert!(checker.is_manager_available().await);
    }

    #[tokio::test]
    async fn probe_errors_mean_unavailable() {
        let runner = Arc::new(FakeRunner::with_results(vec![Err(ProcessError::Spawn {
            program: "x".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })]));
        let checker = PrerequisiteChecker::new(
            &manager(vec![PathBuf::from("/definitely/missing/manager")]),
            Duration::from_secs(1),
            runner,
        );
        assert!(!checker.is_manager_available().await);
    }
}
