use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use indexmap::IndexSet;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{
    CommandLogger, CommandRunner, Downloader, InstallationOrchestrator, Installer, ManagerBootstrapper,
    OrchestratorSettings, PrerequisiteChecker, RunOutcome, RunSummary, StrategyMode, SystemRunner,
};
use crate::catalog::cli::load_catalog;
use crate::catalog::{Catalog, PackageKey, SelectionSet, format_size};
use crate::common::config::{AppConfig, StrategyPreference};
use crate::common::progress::{ProgressRenderer, create_spinner};
use crate::ui::prelude::*;

/// Exit code when at least one package failed to install.
pub const EXIT_PARTIAL_FAILURE: i32 = 2;
/// Exit code after Ctrl-C, following the shell convention.
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Args, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Packages to install, as `<category>:<package>` or a bare package name
    pub packages: Vec<String>,

    /// Install every package in a category (repeatable)
    #[arg(short, long = "category", value_name = "NAME")]
    pub categories: Vec<String>,

    /// Install every package whose name or description contains TEXT
    #[arg(short, long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Install every package in the catalog
    #[arg(long)]
    pub all: bool,

    /// Installation method (defaults to the configured strategy)
    #[arg(short, long, value_enum)]
    pub mode: Option<StrategyPreference>,

    /// Directory for downloaded installers
    #[arg(long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Catalog URL or local file (defaults to the configured URL)
    #[arg(long, value_name = "SOURCE")]
    pub catalog: Option<String>,
}

fn system_runner() -> Result<Arc<dyn CommandRunner>> {
    let logger = CommandLogger::from_debug_mode()?;
    Ok(Arc::new(SystemRunner::new(logger)))
}

fn checker(config: &AppConfig, runner: Arc<dyn CommandRunner>) -> PrerequisiteChecker {
    PrerequisiteChecker::new(&config.manager, config.timeouts.probe(), runner)
}

fn bootstrapper(config: &AppConfig, runner: Arc<dyn CommandRunner>) -> ManagerBootstrapper {
    ManagerBootstrapper::new(
        checker(config, runner.clone()),
        runner,
        config.manager.bootstrap_command.clone(),
        config.timeouts.bootstrap(),
        config.timeouts.bootstrap_settle(),
    )
}

/// Report whether the package manager is installed. Returns availability.
pub async fn handle_check(config: &AppConfig) -> Result<bool> {
    let checker = checker(config, system_runner()?);
    let available = checker.is_manager_available().await;
    let data = Some(json!({ "program": checker.program(), "available": available }));

    if available {
        emit(
            Level::Success,
            "prerequisite.available",
            &format!("{} {} is installed", icon(NerdFont::Check), checker.program()),
            data,
        );
    } else {
        emit(
            Level::Warn,
            "prerequisite.missing",
            &format!(
                "{} {} is not installed (run `spaller bootstrap` to install it)",
                icon(NerdFont::Warning),
                checker.program()
            ),
            data,
        );
    }
    Ok(available)
}

pub async fn handle_bootstrap(config: &AppConfig, retries: Option<u32>) -> Result<()> {
    let attempts = retries.unwrap_or(config.bootstrap_retries);
    let bootstrapper = bootstrapper(config, system_runner()?);

    let spinner = (get_output_format() == OutputFormat::Text)
        .then(|| create_spinner(format!("Setting up {}...", config.manager.program)));
    let result = bootstrapper.install_with_retries(attempts).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    result.with_context(|| format!("Could not set up {}", config.manager.program))?;
    emit(
        Level::Success,
        "bootstrap.completed",
        &format!("{} {} is ready", icon(NerdFont::Check), config.manager.program),
        None,
    );
    Ok(())
}

/// Settle on the mode for this run, bootstrapping the manager when asked to.
async fn resolve_mode(
    config: &AppConfig,
    preference: StrategyPreference,
    runner: Arc<dyn CommandRunner>,
) -> Result<StrategyMode> {
    match preference {
        StrategyPreference::Direct => Ok(StrategyMode::DirectDownload),
        StrategyPreference::Manager => {
            bootstrapper(config, runner)
                .install_with_retries(config.bootstrap_retries)
                .await
                .with_context(|| format!("{} is required but could not be set up", config.manager.program))?;
            Ok(StrategyMode::PackageManager)
        }
        StrategyPreference::Auto => {
            match bootstrapper(config, runner)
                .install_with_retries(config.bootstrap_retries)
                .await
            {
                Ok(()) => Ok(StrategyMode::PackageManager),
                Err(err) => {
                    emit(
                        Level::Warn,
                        "install.mode.fallback",
                        &format!(
                            "{} {err}; falling back to direct downloads",
                            icon(NerdFont::Warning)
                        ),
                        None,
                    );
                    Ok(StrategyMode::DirectDownload)
                }
            }
        }
    }
}

/// Build the selection from positional keys, categories and `--all`.
fn build_selection(catalog: &Catalog, args: &InstallArgs) -> Result<SelectionSet> {
    let mut selection = SelectionSet::from_catalog(catalog);

    if args.all {
        selection.toggle_all();
    } else {
        // Categories are disjoint, so toggling each once on an empty selection selects it
        let categories: IndexSet<&String> = args.categories.iter().collect();
        for category in categories {
            selection.toggle_category(category)?;
        }
    }

    if let Some(text) = &args.search {
        let found: Vec<PackageKey> = catalog.search(text).map(|(key, _)| key).collect();
        if found.is_empty() {
            bail!("No packages found matching '{text}'");
        }
        for key in found {
            selection.set_selected(&key, true)?;
        }
    }

    for raw in &args.packages {
        let key = match raw.parse::<PackageKey>() {
            Ok(key) => key,
            Err(_) => catalog
                .find_by_id(raw)
                .ok_or_else(|| anyhow!("Unknown or ambiguous package '{raw}' (use <category>:<package>)"))?,
        };
        if selection.is_selected(&key) {
            emit(
                Level::Debug,
                "install.selection.duplicate",
                &format!("{key} is already selected"),
                None,
            );
            continue;
        }
        selection.set_selected(&key, true)?;
    }

    Ok(selection)
}

/// Run an installation. Returns the process exit code.
pub async fn handle_install(config: &AppConfig, args: InstallArgs) -> Result<i32> {
    let catalog = load_catalog(config, args.catalog.as_deref()).await?;
    let selection = build_selection(&catalog, &args)?;
    let job = selection.snapshot(&catalog);
    if job.is_empty() {
        bail!("Nothing to install: name packages, pass --category or --search, or use --all");
    }

    emit(
        Level::Info,
        "install.selection",
        &format!(
            "{} Installing {} package(s), about {}",
            icon(NerdFont::Package),
            selection.selected_count(),
            format_size(selection.estimated_size_mb())
        ),
        Some(json!({
            "packages": job.items().iter().map(|(key, _)| key.to_string()).collect::<Vec<_>>(),
            "size_mb": job.total_size_mb(),
        })),
    );

    let runner = system_runner()?;
    let mode = resolve_mode(config, args.mode.unwrap_or(config.strategy), runner.clone()).await?;
    emit(
        Level::Info,
        "install.mode",
        &format!("{} Using {mode}", icon(NerdFont::Gear)),
        Some(json!({ "mode": mode })),
    );

    let destination = args.dest.clone().unwrap_or_else(|| config.download_dir());
    if mode == StrategyMode::DirectDownload {
        emit(
            Level::Debug,
            "install.destination",
            &format!("{} Installers are staged in {}", icon(NerdFont::Folder), destination.display()),
            None,
        );
    }

    let downloader = Downloader::new(config.timeouts.connect())
        .context("creating HTTP client")?
        .keep_partial_files(config.keep_failed_downloads);
    let orchestrator = InstallationOrchestrator::new(
        Installer::new(
            runner,
            config.timeouts.manager_install(),
            config.timeouts.binary_install(),
        ),
        downloader,
        OrchestratorSettings {
            mode,
            destination,
            item_settle: config.timeouts.item_settle(),
        },
    );

    let total = job.len();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = orchestrator
        .start(job, tx)
        .ok_or_else(|| anyhow!("An installation is already running"))?;

    let mut renderer = ProgressRenderer::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => renderer.handle(&event),
                None => break,
            },
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if signal.is_ok() {
                    emit(
                        Level::Warn,
                        "install.cancel.requested",
                        &format!("{} Cancelling installation...", icon(NerdFont::Stop)),
                        None,
                    );
                    handle.cancel();
                }
            }
        }
    }
    let summary = renderer.finish();
    separator();

    let outcome = handle.wait().await.context("installation task failed")?;
    emit(
        Level::Debug,
        "install.run.finished",
        &format!("Run finished in state {:?}", orchestrator.state()),
        None,
    );
    report_summary(&summary, total, outcome);

    Ok(exit_code(&summary, outcome))
}

fn exit_code(summary: &RunSummary, outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Cancelled => EXIT_CANCELLED,
        RunOutcome::Completed if summary.failed > 0 => EXIT_PARTIAL_FAILURE,
        RunOutcome::Completed => 0,
    }
}

fn report_summary(summary: &RunSummary, total: usize, outcome: RunOutcome) {
    let data = Some(json!({
        "completed": summary.completed,
        "failed": summary.failed,
        "total": total,
        "cancelled": outcome == RunOutcome::Cancelled,
    }));

    if outcome == RunOutcome::Cancelled {
        emit(
            Level::Warn,
            "install.summary.cancelled",
            &format!(
                "{} Cancelled: {} installed, {} failed, {} not attempted",
                icon(NerdFont::Stop),
                summary.completed,
                summary.failed,
                total.saturating_sub(summary.total())
            ),
            data,
        );
    } else if summary.failed > 0 {
        emit(
            Level::Warn,
            "install.summary.partial",
            &format!(
                "{} {} of {} package(s) failed to install",
                icon(NerdFont::Warning),
                summary.failed,
                total
            ),
            data,
        );
    } else {
        emit(
            Level::Success,
            "install.summary.completed",
            &format!("{} All {} package(s) installed", icon(NerdFont::Check), total),
            data,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::SAMPLE_CATALOG;
    use crate::install::test_support::FakeRunner;

    fn catalog() -> Catalog {
        Catalog::from_json(SAMPLE_CATALOG).unwrap()
    }

    fn keys(selection: &SelectionSet) -> Vec<String> {
        selection.selected_keys().map(ToString::to_string).collect()
    }

    #[test]
    fn selection_from_keys_and_bare_names() {
        let args = InstallArgs {
            packages: vec!["Browsers:Firefox".into(), "7zip".into()],
            ..InstallArgs::default()
        };
        let selection = build_selection(&catalog(), &args).unwrap();
        assert_eq!(keys(&selection), vec!["Browsers:Firefox", "Tools:7zip"]);
    }

    #[test]
    fn category_and_key_overlap_stays_selected() {
        let args = InstallArgs {
            packages: vec!["Browsers:Edge".into()],
            categories: vec!["Browsers".into()],
            ..InstallArgs::default()
        };
        let selection = build_selection(&catalog(), &args).unwrap();
        assert_eq!(keys(&selection), vec!["Browsers:Firefox", "Browsers:Edge"]);
    }

    #[test]
    fn repeated_category_is_selected_once() {
        let args = InstallArgs {
            categories: vec!["Browsers".into(), "Browsers".into()],
            ..InstallArgs::default()
        };
        assert_eq!(build_selection(&catalog(), &args).unwrap().selected_count(), 2);
    }

    #[test]
    fn search_selects_matches_from_every_category() {
        let args = InstallArgs {
            search: Some("I".into()),
            packages: vec!["Browsers:Firefox".into()],
            ..InstallArgs::default()
        };
        let selection = build_selection(&catalog(), &args).unwrap();
        assert_eq!(keys(&selection), vec!["Browsers:Firefox", "Browsers:Edge", "Tools:7zip"]);

        let args = InstallArgs {
            search: Some("archiv".into()),
            ..InstallArgs::default()
        };
        assert_eq!(keys(&build_selection(&catalog(), &args).unwrap()), vec!["Tools:7zip"]);
    }

    #[test]
    fn search_without_matches_is_rejected() {
        let args = InstallArgs {
            search: Some("opera".into()),
            ..InstallArgs::default()
        };
        let err = build_selection(&catalog(), &args).unwrap_err();
        assert!(err.to_string().contains("opera"));
    }

    #[test]
    fn all_selects_everything() {
        let args = InstallArgs {
            all: true,
            ..InstallArgs::default()
        };
        assert_eq!(build_selection(&catalog(), &args).unwrap().selected_count(), 3);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let unknown_key = InstallArgs {
            packages: vec!["Browsers:Opera".into()],
            ..InstallArgs::default()
        };
        assert!(build_selection(&catalog(), &unknown_key).is_err());

        let unknown_name = InstallArgs {
            packages: vec!["opera".into()],
            ..InstallArgs::default()
        };
        assert!(build_selection(&catalog(), &unknown_name).is_err());

        let unknown_category = InstallArgs {
            categories: vec!["Games".into()],
            ..InstallArgs::default()
        };
        assert!(build_selection(&catalog(), &unknown_category).is_err());
    }

    #[test]
    fn exit_codes() {
        let clean = RunSummary {
            completed: 2,
            failed: 0,
            cancelled: false,
        };
        let partial = RunSummary {
            completed: 1,
            failed: 1,
            cancelled: false,
        };
        assert_eq!(exit_code(&clean, RunOutcome::Completed), 0);
        assert_eq!(exit_code(&partial, RunOutcome::Completed), EXIT_PARTIAL_FAILURE);
        assert_eq!(exit_code(&clean, RunOutcome::Cancelled), EXIT_CANCELLED);
    }

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.manager.program = "spaller-test-manager-absent".into();
        config.manager.known_paths = vec![];
        config.bootstrap_retries = 1;
        config.timeouts.bootstrap_settle_ms = 0;
        config
    }

    #[tokio::test]
    async fn direct_preference_skips_bootstrap() {
        let runner = Arc::new(FakeRunner::default());
        let mode = resolve_mode(&fast_config(), StrategyPreference::Direct, runner.clone())
            .await
            .unwrap();
        assert_eq!(mode, StrategyMode::DirectDownload);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn auto_uses_manager_when_available() {
        let runner = Arc::new(FakeRunner::default());
        let mode = resolve_mode(&fast_config(), StrategyPreference::Auto, runner)
            .await
            .unwrap();
        assert_eq!(mode, StrategyMode::PackageManager);
    }

    #[tokio::test]
    async fn auto_falls_back_to_direct_when_bootstrap_fails() {
        let missing = || {
            Err(crate::install::process::ProcessError::NonZeroExit {
                program: "spaller-test-manager-absent".into(),
                code: Some(1),
            })
        };
        let runner = Arc::new(FakeRunner::with_results(vec![missing(), missing(), missing()]));
        let mode = resolve_mode(&fast_config(), StrategyPreference::Auto, runner)
            .await
            .unwrap();
        assert_eq!(mode, StrategyMode::DirectDownload);
    }

    #[tokio::test]
    async fn manager_preference_fails_when_bootstrap_fails() {
        let missing = || {
            Err(crate::install::process::ProcessError::NonZeroExit {
                program: "spaller-test-manager-absent".into(),
                code: Some(1),
            })
        };
        let runner = Arc::new(FakeRunner::with_results(vec![missing(), missing(), missing()]));
        let err = resolve_mode(&fast_config(), StrategyPreference::Manager, runner)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("spaller-test-manager-absent"));
    }
}
