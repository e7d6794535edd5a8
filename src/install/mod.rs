//! Installation engine: manager detection and bootstrap, strategy resolution,
//! downloads, installer execution and the sequential run orchestrator.

mod bootstrap;
pub mod cli;
mod command_log;
mod download;
mod installer;
mod job;
mod orchestrator;
mod prerequisite;
mod process;
mod progress;
mod strategy;

#[cfg(test)]
pub mod test_support;

pub use bootstrap::ManagerBootstrapper;
pub use command_log::CommandLogger;
pub use download::Downloader;
pub use installer::Installer;
pub use job::InstallationJob;
pub use orchestrator::{InstallationOrchestrator, OrchestratorSettings, RunOutcome};
pub use prerequisite::PrerequisiteChecker;
pub use process::{CommandRunner, SystemRunner};
pub use progress::{Phase, ProgressEvent, RunSummary};
pub use strategy::StrategyMode;
