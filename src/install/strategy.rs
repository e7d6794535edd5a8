use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::catalog::PackageManifestEntry;

/// Process-wide installation mode, fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    PackageManager,
    DirectDownload,
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyMode::PackageManager => write!(f, "package manager"),
            StrategyMode::DirectDownload => write!(f, "direct download"),
        }
    }
}

/// Kind of downloaded installer, decided by its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerKind {
    /// Windows Installer package, run through `msiexec`
    Msi,
    /// Self-contained setup program accepting `/S`
    Executable,
}

impl InstallerKind {
    pub fn from_filename(filename: &str) -> Self {
        let is_msi = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("msi"));
        if is_msi {
            InstallerKind::Msi
        } else {
            InstallerKind::Executable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStrategy {
    Manager {
        invocation: String,
    },
    Direct {
        url: String,
        filename: String,
        kind: InstallerKind,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("No {mode} install method available")]
    NoStrategyAvailable { mode: StrategyMode },
}

/// Decide how to install `entry` in `mode`. Pure: no I/O, no state.
pub fn resolve_strategy(
    entry: &PackageManifestEntry,
    mode: StrategyMode,
) -> Result<InstallStrategy, StrategyError> {
    let unavailable = StrategyError::NoStrategyAvailable { mode };
    match mode {
        StrategyMode::PackageManager => entry
            .usable_manager_command()
            .map(|invocation| InstallStrategy::Manager {
                invocation: invocation.to_string(),
            })
            .ok_or(unavailable),
        StrategyMode::DirectDownload => {
            let (url, filename) = entry.usable_download().ok_or(unavailable.clone())?;
            // The installer is staged inside the download directory, never elsewhere
            if !is_plain_file_name(filename) {
                return Err(unavailable);
            }
            Ok(InstallStrategy::Direct {
                url: url.to_string(),
                filename: filename.to_string(),
                kind: InstallerKind::from_filename(filename),
            })
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.contains(['/', '\\'])
        && Path::new(name)
            .file_name()
            .is_some_and(|file_name| file_name == name)
}
