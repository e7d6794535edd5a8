//! Application configuration stored as TOML.
//!
//! Every field has a serde default, so a partial (or empty) file is valid and
//! missing keys fall back to the values below. CLI flags override whatever is
//! loaded here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::paths;

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/ice-exe/Spaller/main/resources/apps_data.json";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Which installation strategy a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreference {
    /// Use the package manager, bootstrapping it if needed; fall back to direct downloads
    #[default]
    Auto,
    /// Require the package manager
    Manager,
    /// Always download and run installers directly
    Direct,
}

/// How to find, query and install the preferred package manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    pub program: String,
    pub version_args: Vec<String>,
    pub known_paths: Vec<PathBuf>,
    pub bootstrap_command: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            program: "choco".to_string(),
            version_args: vec!["--version".to_string()],
            known_paths: vec![
                PathBuf::from(r"C:\ProgramData\chocolatey\bin\choco.exe"),
                PathBuf::from(r"C:\ProgramData\chocolatey\choco.exe"),
            ],
            bootstrap_command: concat!(
                "powershell -NoProfile -InputFormat None -ExecutionPolicy Bypass -Command ",
                "\"[System.Net.ServicePointManager]::SecurityProtocol = ",
                "[System.Net.ServicePointManager]::SecurityProtocol -bor 3072; ",
                "iex ((New-Object System.Net.WebClient).DownloadString(",
                "'https://community.chocolatey.org/install.ps1'))\""
            )
            .to_string(),
        }
    }
}

/// Timeouts and settle delays, in seconds unless the name says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub catalog_secs: u64,
    pub connect_secs: u64,
    pub probe_secs: u64,
    pub bootstrap_secs: u64,
    pub manager_install_secs: u64,
    pub binary_install_secs: u64,
    pub bootstrap_settle_ms: u64,
    pub item_settle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            catalog_secs: 15,
            connect_secs: 30,
            probe_secs: 15,
            bootstrap_secs: 300,
            manager_install_secs: 600,
            binary_install_secs: 300,
            bootstrap_settle_ms: 5_000,
            item_settle_ms: 1_000,
        }
    }
}

impl TimeoutConfig {
    pub fn catalog(&self) -> Duration {
        Duration::from_secs(self.catalog_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn bootstrap(&self) -> Duration {
        Duration::from_secs(self.bootstrap_secs)
    }

    pub fn manager_install(&self) -> Duration {
        Duration::from_secs(self.manager_install_secs)
    }

    pub fn binary_install(&self) -> Duration {
        Duration::from_secs(self.binary_install_secs)
    }

    pub fn bootstrap_settle(&self) -> Duration {
        Duration::from_millis(self.bootstrap_settle_ms)
    }

    pub fn item_settle(&self) -> Duration {
        Duration::from_millis(self.item_settle_ms)
    }
}

fn default_bootstrap_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub catalog_url: String,
    /// Staging directory for downloaded installers; `~` is expanded
    pub download_dir: Option<String>,
    pub strategy: StrategyPreference,
    /// Keep partially written installers after a failed download
    pub keep_failed_downloads: bool,
    #[serde(default = "default_bootstrap_retries")]
    pub bootstrap_retries: u32,
    pub manager: ManagerConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            download_dir: None,
            strategy: StrategyPreference::default(),
            keep_failed_downloads: false,
            bootstrap_retries: default_bootstrap_retries(),
            manager: ManagerConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Default location of the config file
pub fn config_file_path() -> Result<PathBuf> {
    Ok(paths::spaller_config_dir()?.join(CONFIG_FILE_NAME))
}

impl AppConfig {
    /// Load the config from `path`, or from the default location.
    ///
    /// A missing file at the default location is created with defaults. A
    /// missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let path = config_file_path()?;
                if !path.exists() {
                    let default = AppConfig::default();
                    default.save_to(&path)?;
                    return Ok(default);
                }
                Self::load_from_path(&path)
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("parsing config toml")
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let toml = toml::to_string_pretty(self).context("serializing config to toml")?;
        fs::write(path, toml).with_context(|| format!("writing config to {}", path.display()))?;
        Ok(())
    }

    /// Resolved download directory with `~` and environment variables expanded
    pub fn download_dir(&self) -> PathBuf {
        match &self.download_dir {
            Some(dir) => match shellexpand::full(dir) {
                Ok(expanded) => PathBuf::from(expanded.as_ref()),
                Err(_) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            },
            None => paths::default_download_dir(),
        }
    }
}
