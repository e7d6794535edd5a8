use anyhow::Result;
use std::process::Command;

use super::common::TestEnvironment;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Run the built binary with config, data and cache directories inside the
/// test environment.
pub fn run_spaller_command(env: &TestEnvironment, args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(env!("CARGO_BIN_EXE_spaller"))
        .args(args)
        .env("HOME", env.path())
        .env("XDG_CONFIG_HOME", env.path().join("xdg-config"))
        .env("XDG_DATA_HOME", env.path().join("xdg-data"))
        .env("NO_COLOR", "1")
        .output()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Parse every stdout line as a JSON event.
pub fn json_lines(output: &CommandOutput) -> Result<Vec<serde_json::Value>> {
    output
        .stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}
