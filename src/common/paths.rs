use anyhow::{Context, Result};
use std::path::PathBuf;

/// Centralized path management for spaller

/// Get the spaller config directory
pub fn spaller_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("spaller");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Get the spaller data directory
pub fn spaller_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("spaller");

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory at {}", data_dir.display()))?;

    Ok(data_dir)
}

/// Get the directory holding child process logs (debug runs only)
pub fn command_logs_dir() -> Result<PathBuf> {
    let logs_dir = spaller_data_dir()?.join("logs");
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("creating logs directory at {}", logs_dir.display()))?;
    Ok(logs_dir)
}

/// Default staging directory for downloaded installers.
///
/// Not created here; the orchestrator creates it right before the first download.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(std::env::temp_dir)
        .join("spaller")
}
