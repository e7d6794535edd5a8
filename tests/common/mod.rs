use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SAMPLE_CATALOG: &str = r#"{
    "Browsers": {
        "Firefox": {
            "description": "Mozilla Firefox",
            "size": 90,
            "url": "http://127.0.0.1:9/firefox.exe",
            "installer": "firefox.exe",
            "managerCommand": "choco install firefox -y"
        },
        "Edge": {
            "description": "Ships with Windows",
            "size": 0,
            "managerCommand": "builtin"
        }
    },
    "Tools": {
        "7zip": {
            "description": "Archiver",
            "url": "http://127.0.0.1:9/7z.msi",
            "installer": "7z.msi"
        }
    }
}"#;

/// Isolated config, data and download directories for one test.
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Config file handed to the binary with `--config`
    pub fn config_path(&self) -> PathBuf {
        self.path().join("config.toml")
    }

    pub fn downloads(&self) -> PathBuf {
        self.path().join("downloads")
    }

    /// Write a config that keeps the manager out of reach and the run fast.
    pub fn write_config(&self) -> Result<PathBuf> {
        let config = format!(
            r#"
strategy = "direct"
download_dir = "{}"
bootstrap_retries = 1

[manager]
program = "spaller-test-manager-absent"
known_paths = []

[timeouts]
connect_secs = 2
bootstrap_settle_ms = 0
item_settle_ms = 0
"#,
            self.downloads().display()
        );
        std::fs::write(self.config_path(), config)?;
        Ok(self.config_path())
    }

    pub fn write_catalog(&self, contents: &str) -> Result<PathBuf> {
        let path = self.path().join("apps.json");
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}
