use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::PathBuf;

use crate::common::paths;

const LOG_FILE_NAME: &str = "commands.jsonl";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CommandLogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub elevated: bool,
    pub exit_code: Option<i32>,
    pub outcome: String,
    pub duration_ms: u128,
}

/// Appends one JSON line per child process to the command log.
#[derive(Debug, Clone)]
pub struct CommandLogger {
    log_dir: PathBuf,
}

impl CommandLogger {
    /// Logger writing to the default logs directory; `None` unless debug mode is on.
    pub fn from_debug_mode() -> Result<Option<Self>> {
        if !crate::ui::is_debug_enabled() {
            return Ok(None);
        }
        Ok(Some(Self::new(paths::command_logs_dir()?)?))
    }

    pub fn new(log_dir: PathBuf) -> Result<Self> {
        create_dir_all(&log_dir).context("Failed to create command log directory")?;
        Ok(Self { log_dir })
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }

    pub fn log(&self, entry: &CommandLogEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file_path())
            .context("Failed to open command log file")?;

        let json_line =
            serde_json::to_string(entry).context("Failed to serialize command log entry")?;

        writeln!(file, "{json_line}").context("Failed to write to command log file")?;

        Ok(())
    }
}
