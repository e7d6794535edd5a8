use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::prerequisite::PrerequisiteChecker;
use super::process::{CommandRunner, CommandSpec, ProcessError};
use crate::ui::prelude::*;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Package manager bootstrap did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Package manager bootstrap failed: {0}")]
    CommandFailed(String),

    #[error("Package manager still not available after bootstrap")]
    VerificationFailed,
}

/// Installs the package manager when it is missing.
///
/// The availability re-check after the bootstrap command is authoritative:
/// a failing command that still left the manager installed counts as success,
/// a clean exit that left nothing behind counts as failure.
pub struct ManagerBootstrapper {
    checker: PrerequisiteChecker,
    runner: Arc<dyn CommandRunner>,
    bootstrap_command: String,
    timeout: Duration,
    settle_delay: Duration,
}

impl ManagerBootstrapper {
    pub fn new(
        checker: PrerequisiteChecker,
        runner: Arc<dyn CommandRunner>,
        bootstrap_command: impl Into<String>,
        timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            checker,
            runner,
            bootstrap_command: bootstrap_command.into(),
            timeout,
            settle_delay,
        }
    }

    pub async fn install(&self) -> Result<(), BootstrapError> {
        if self.checker.is_manager_available().await {
            emit(
                Level::Debug,
                "bootstrap.skip",
                &format!("{} is already installed", self.checker.program()),
                None,
            );
            return Ok(());
        }

        emit(
            Level::Info,
            "bootstrap.start",
            &format!(
                "{} Installing {}...",
                icon(NerdFont::Gear),
                self.checker.program()
            ),
            None,
        );

        let spec = CommandSpec::shell(&self.bootstrap_command)
            .elevated()
            .with_timeout(self.timeout);
        let outcome = self.runner.run(&spec, &CancellationToken::new()).await;

        if let Err(err) = &outcome {
            emit(
                Level::Debug,
                "bootstrap.command.failed",
                &format!("Bootstrap command reported: {err}"),
                None,
            );
        }

        // Shell integration needs a moment before the manager shows up
        tokio::time::sleep(self.settle_delay).await;

        if self.checker.is_manager_available().await {
            return Ok(());
        }

        Err(match outcome {
            Ok(()) => BootstrapError::VerificationFailed,
            Err(ProcessError::Timeout { timeout, .. }) => BootstrapError::Timeout(timeout),
            Err(err) => BootstrapError::CommandFailed(err.to_string()),
        })
    }

    /// Run [`Self::install`] up to `attempts` times, returning the last error.
    pub async fn install_with_retries(&self, attempts: u32) -> Result<(), BootstrapError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.install().await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts => {
                    emit(
                        Level::Warn,
                        "bootstrap.retry",
                        &format!(
                            "{} {err} (attempt {attempt} of {attempts}), retrying",
                            icon(NerdFont::Warning)
                        ),
                        None,
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
