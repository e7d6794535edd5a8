use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::download::{DownloadError, Downloader};
use super::installer::{InstallError, Installer};
use super::job::InstallationJob;
use super::progress::{Phase, ProgressEvent, ProgressMap};
use super::strategy::{InstallStrategy, StrategyError, StrategyMode, resolve_strategy};
use crate::catalog::PackageManifestEntry;
use crate::ui::prelude::*;

/// Fixed for the lifetime of an orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub mode: StrategyMode,
    /// Where direct downloads are staged; created on first use
    pub destination: PathBuf,
    /// Pause between items so installers can release system resources
    pub item_settle: Duration,
}

/// Set while any run is in flight, across all orchestrators in the process.
static RUN_ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Running,
            2 => RunState::Completed,
            3 => RunState::Cancelled,
            _ => RunState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Running => 1,
            RunState::Completed => 2,
            RunState::Cancelled => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Drives one installation job at a time on a background task.
pub struct InstallationOrchestrator {
    installer: Arc<Installer>,
    downloader: Arc<Downloader>,
    settings: Arc<OrchestratorSettings>,
    state: Arc<AtomicU8>,
}

impl InstallationOrchestrator {
    pub fn new(installer: Installer, downloader: Downloader, settings: OrchestratorSettings) -> Self {
        Self {
            installer: Arc::new(installer),
            downloader: Arc::new(downloader),
            settings: Arc::new(settings),
            state: Arc::new(AtomicU8::new(RunState::Idle.as_u8())),
        }
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Start installing `job`, streaming events into `events`.
    ///
    /// Returns `None` without doing anything if a run is already active
    /// anywhere in the process.
    pub fn start(&self, job: InstallationJob, events: UnboundedSender<ProgressEvent>) -> Option<RunHandle> {
        if RUN_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            emit(
                Level::Debug,
                "install.run.rejected",
                "Ignoring start request: an installation is already running",
                None,
            );
            return None;
        }
        self.state.store(RunState::Running.as_u8(), Ordering::Release);

        let cancel = CancellationToken::new();

        let run = Run {
            installer: self.installer.clone(),
            downloader: self.downloader.clone(),
            settings: self.settings.clone(),
            map: ProgressMap::new(job.len()),
            job,
            emitter: Emitter::new(events),
            cancel: cancel.clone(),
        };
        let guard = RunGuard {
            state: self.state.clone(),
        };

        let task = tokio::spawn(async move {
            let outcome = run.execute().await;
            guard.finish(outcome);
            drop(guard);
            outcome
        });

        Some(RunHandle { cancel, task })
    }
}

/// Handle to a started run.
pub struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Kill the in-flight child process and stop before the next item.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<RunOutcome, JoinError> {
        self.task.await
    }
}

/// Releases the single-run guard when the run task ends, even by panic.
struct RunGuard {
    state: Arc<AtomicU8>,
}

impl RunGuard {
    fn finish(&self, outcome: RunOutcome) {
        let state = match outcome {
            RunOutcome::Completed => RunState::Completed,
            RunOutcome::Cancelled => RunState::Cancelled,
        };
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let _ = self.state.compare_exchange(
            RunState::Running.as_u8(),
            RunState::Idle.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        RUN_ACTIVE.store(false, Ordering::Release);
    }
}

/// Sends events and remembers the highest percent sent.
struct Emitter {
    events: UnboundedSender<ProgressEvent>,
    // Non-negative floats order the same as their bit patterns
    high_water: AtomicU64,
}

impl Emitter {
    fn new(events: UnboundedSender<ProgressEvent>) -> Self {
        Self {
            events,
            high_water: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    fn send(&self, event: ProgressEvent) {
        self.high_water
            .fetch_max(event.percent.to_bits(), Ordering::Relaxed);
        // A dropped receiver only means nobody is watching
        let _ = self.events.send(event);
    }

    fn high_water(&self) -> f64 {
        f64::from_bits(self.high_water.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Error)]
enum ItemError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("Cannot create {}: {source}", path.display())]
    Destination {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Install(#[from] InstallError),
}

impl ItemError {
    fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ItemError::Download(DownloadError::Cancelled) | ItemError::Install(InstallError::Cancelled)
        )
    }

    /// Local disk trouble is an `Error`; everything else about the item `Failed`.
    fn phase(&self) -> Phase {
        match self {
            ItemError::Destination { .. } | ItemError::Download(DownloadError::Io { .. }) => Phase::Error,
            _ => Phase::Failed,
        }
    }
}

struct Run {
    installer: Arc<Installer>,
    downloader: Arc<Downloader>,
    settings: Arc<OrchestratorSettings>,
    map: ProgressMap,
    job: InstallationJob,
    emitter: Emitter,
    cancel: CancellationToken,
}

impl Run {
    async fn execute(self) -> RunOutcome {
        let total = self.job.len();
        emit(
            Level::Debug,
            "install.run.start",
            &format!("Installing {total} package(s) via {}", self.settings.mode),
            None,
        );

        for (index, (key, entry)) in self.job.items().iter().enumerate() {
            if self.cancel.is_cancelled() {
                return self.cancelled();
            }

            let name = entry.display_name();
            self.emitter.send(
                ProgressEvent::new(self.map.item_start(index), Phase::Connecting, name, total)
                    .for_item(index),
            );

            match self.install_item(index, entry).await {
                Ok(()) => {
                    emit(
                        Level::Debug,
                        "install.item.completed",
                        &format!("{key} installed"),
                        None,
                    );
                    self.emitter.send(
                        ProgressEvent::new(self.map.item_end(index), Phase::Completed, name, total)
                            .for_item(index),
                    );
                }
                Err(err) if err.is_cancellation() => return self.cancelled(),
                Err(err) => {
                    emit(
                        Level::Debug,
                        "install.item.failed",
                        &format!("{key} failed: {err}"),
                        None,
                    );
                    self.emitter.send(
                        ProgressEvent::new(
                            self.map.item_end(index),
                            err.phase(),
                            format!("{name} - {err}"),
                            total,
                        )
                        .for_item(index),
                    );
                }
            }

            if index + 1 < total {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.item_settle) => {}
                    _ = self.cancel.cancelled() => return self.cancelled(),
                }
            }
        }

        self.emitter.send(ProgressEvent::new(
            100.0,
            Phase::Completed,
            "All installations completed",
            0,
        ));
        RunOutcome::Completed
    }

    async fn install_item(&self, index: usize, entry: &PackageManifestEntry) -> Result<(), ItemError> {
        let total = self.job.len();
        let name = entry.display_name();

        match resolve_strategy(entry, self.settings.mode)? {
            InstallStrategy::Manager { invocation } => {
                self.emitter.send(
                    ProgressEvent::new(self.map.install_start(index), Phase::Installing, name, total)
                        .for_item(index),
                );
                self.installer
                    .install_via_manager(&invocation, &self.cancel)
                    .await?;
            }
            InstallStrategy::Direct { url, filename, kind } => {
                let destination = &self.settings.destination;
                ensure_dir(destination).await?;
                let path = destination.join(&filename);

                let emitter = &self.emitter;
                self.downloader
                    .download(
                        &url,
                        &path,
                        self.map.download_range(index),
                        |progress| {
                            let label = format!("{name} - {} KB", progress.downloaded / 1024);
                            emitter.send(
                                ProgressEvent::new(progress.percent, Phase::Downloading, label, total)
                                    .for_item(index),
                            );
                        },
                        &self.cancel,
                    )
                    .await?;

                self.emitter.send(
                    ProgressEvent::new(self.map.install_start(index), Phase::Installing, name, total)
                        .for_item(index),
                );
                let result = self
                    .installer
                    .install_via_binary(&path, kind, &self.cancel)
                    .await;
                let _ = tokio::fs::remove_file(&path).await;
                result?;
            }
        }
        Ok(())
    }

    fn cancelled(&self) -> RunOutcome {
        emit(
            Level::Debug,
            "install.run.cancelled",
            "Installation run cancelled",
            None,
        );
        self.emitter.send(ProgressEvent::new(
            self.emitter.high_water(),
            Phase::Cancelled,
            "Installation cancelled",
            self.job.len(),
        ));
        RunOutcome::Cancelled
    }
}

async fn ensure_dir(path: &Path) -> Result<(), ItemError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| ItemError::Destination {
            path: path.to_path_buf(),
            source,
        })
}
