use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::process::{CommandRunner, CommandSpec, ProcessError};
use super::strategy::InstallerKind;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Installer did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Installer failed: {0}")]
    NonZeroExit(String),

    #[error("Could not start installer: {0}")]
    Spawn(String),

    #[error("Installation cancelled")]
    Cancelled,
}

impl From<ProcessError> for InstallError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout { timeout, .. } => InstallError::Timeout(timeout),
            ProcessError::Cancelled { .. } => InstallError::Cancelled,
            err @ ProcessError::NonZeroExit { .. } => InstallError::NonZeroExit(err.to_string()),
            err @ ProcessError::Spawn { .. } => InstallError::Spawn(err.to_string()),
        }
    }
}

/// Runs package installations, either through the package manager or by
/// executing a downloaded installer silently.
pub struct Installer {
    runner: Arc<dyn CommandRunner>,
    manager_timeout: Duration,
    binary_timeout: Duration,
}

impl Installer {
    pub fn new(runner: Arc<dyn CommandRunner>, manager_timeout: Duration, binary_timeout: Duration) -> Self {
        Self {
            runner,
            manager_timeout,
            binary_timeout,
        }
    }

    /// Run a manager invocation such as `install firefox -y` through the shell.
    ///
    /// The invocation is trusted catalog text and is passed through unquoted.
    pub async fn install_via_manager(&self, invocation: &str, cancel: &CancellationToken) -> Result<(), InstallError> {
        let spec = CommandSpec::shell(invocation)
            .elevated()
            .with_timeout(self.manager_timeout);
        self.runner.run(&spec, cancel).await?;
        Ok(())
    }

    pub async fn install_via_binary(
        &self,
        path: &Path,
        kind: InstallerKind,
        cancel: &CancellationToken,
    ) -> Result<(), InstallError> {
        #[cfg(unix)]
        {
            if kind == InstallerKind::Executable {
                make_executable(path).await?;
            }
        }

        let spec = binary_command(path, kind).with_timeout(self.binary_timeout);
        self.runner.run(&spec, cancel).await?;
        Ok(())
    }
}

/// Silent install command for a downloaded installer.
pub fn binary_command(path: &Path, kind: InstallerKind) -> CommandSpec {
    let path = path.to_string_lossy().into_owned();
    match kind {
        InstallerKind::Msi => CommandSpec::new(
            "msiexec",
            ["/i".to_string(), path, "/quiet".to_string(), "/norestart".to_string()],
        ),
        InstallerKind::Executable => CommandSpec::new(path, ["/S"]),
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|err| InstallError::Spawn(format!("{}: {err}", path.display())))
}
