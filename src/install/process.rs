//! Child process execution with timeouts, cancellation and elevation.
//!
//! Every external command (manager probe, manager bootstrap, package
//! installs) goes through a [`CommandRunner`]. The system implementation
//! kills the child on timeout or cancellation instead of leaving it running.

use async_trait::async_trait;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::command_log::{CommandLogEntry, CommandLogger};
use crate::ui::prelude::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
/// Time a process group gets to exit after SIGTERM before it is killed.
#[cfg(unix)]
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// A command to run, independent of how it is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Run with administrative rights
    pub elevated: bool,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            elevated: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A full command line handed to the platform shell.
    pub fn shell(command_line: &str) -> Self {
        if cfg!(windows) {
            Self::new("cmd", ["/C", command_line])
        } else {
            Self::new("sh", ["-c", command_line])
        }
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {}", describe_exit(*code))]
    NonZeroExit { program: String, code: Option<i32> },

    #[error("{program} was cancelled")]
    Cancelled { program: String },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Runs external commands.
///
/// Implementations must honor `spec.timeout` and `cancel`, killing the child
/// when either fires.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<(), ProcessError>;
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Spawns real child processes through tokio.
#[derive(Debug, Default)]
pub struct SystemRunner {
    logger: Option<CommandLogger>,
}

impl SystemRunner {
    pub fn new(logger: Option<CommandLogger>) -> Self {
        Self { logger }
    }

    fn build_command(spec: &CommandSpec) -> Command {
        let (program, args) = elevate(spec);
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        // Own process group, so shell wrappers and sudo can be killed with
        // everything they started
        #[cfg(unix)]
        command.process_group(0);

        if crate::ui::is_debug_enabled() {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        command
    }

    fn log(&self, spec: &CommandSpec, result: &Result<(), ProcessError>, code: Option<i32>, started: Instant) {
        let Some(logger) = &self.logger else {
            return;
        };
        let entry = CommandLogEntry {
            timestamp: chrono::Utc::now(),
            command: spec.to_string(),
            elevated: spec.elevated,
            exit_code: code,
            outcome: match result {
                Ok(()) => "ok".to_string(),
                Err(err) => err.to_string(),
            },
            duration_ms: started.elapsed().as_millis(),
        };
        if let Err(err) = logger.log(&entry) {
            emit(
                Level::Debug,
                "process.log.failed",
                &format!("Could not write command log: {err:#}"),
                None,
            );
        }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<(), ProcessError> {
        let program = spec.program.clone();
        emit(
            Level::Debug,
            "process.spawn",
            &format!("$ {spec}"),
            None,
        );

        let started = Instant::now();
        let mut child = match Self::build_command(spec).spawn() {
            Ok(child) => child,
            Err(source) => {
                let result = Err(ProcessError::Spawn { program, source });
                self.log(spec, &result, None, started);
                return result;
            }
        };

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = tokio::time::sleep(spec.timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let mut code = None;
        let result = match outcome {
            Outcome::Exited(Ok(status)) => {
                code = status.code();
                if status.success() {
                    Ok(())
                } else {
                    Err(ProcessError::NonZeroExit { program, code })
                }
            }
            Outcome::Exited(Err(source)) => Err(ProcessError::Spawn { program, source }),
            Outcome::TimedOut => {
                kill_tree(&mut child).await;
                Err(ProcessError::Timeout {
                    program,
                    timeout: spec.timeout,
                })
            }
            Outcome::Cancelled => {
                kill_tree(&mut child).await;
                Err(ProcessError::Cancelled { program })
            }
        };

        self.log(spec, &result, code, started);
        result
    }
}

/// Kill `child` and every process it started.
///
/// On unix the child leads its own process group. The group gets SIGTERM
/// first, which `sudo` relays to the command it runs as root, then SIGKILL
/// for anything left. On Windows `taskkill /T` walks the process tree.
async fn kill_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;

            let group = Pid::from_raw(pid as i32);
            let _ = killpg(group, Signal::SIGTERM);
            let _ = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
            let _ = killpg(group, Signal::SIGKILL);
        }
        #[cfg(windows)]
        {
            let _ = Command::new("taskkill")
                .args(["/T", "/F", "/PID", &pid.to_string()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
        }
    }
    let _ = child.kill().await;
}

/// Program and arguments to spawn, wrapped in `sudo` when elevation is
/// requested and the process is not already root.
///
/// On Windows the process itself has to be started elevated; the command is run as is.
fn elevate(spec: &CommandSpec) -> (String, Vec<String>) {
    #[cfg(unix)]
    {
        if spec.elevated && matches!(sudo::check(), sudo::RunningAs::User) {
            let mut args = Vec::with_capacity(spec.args.len() + 2);
            args.push("--non-interactive".to_string());
            args.push(spec.program.clone());
            args.extend(spec.args.iter().cloned());
            return ("sudo".to_string(), args);
        }
    }
    (spec.program.clone(), spec.args.clone())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::shell(script).with_timeout(Duration::from_secs(10))
    }

    #[test]
    fn shell_spec_wraps_command_line() {
        let spec = CommandSpec::shell("choco install a -y");
        assert_eq!(spec.program, "sh");
        assert_eq!(spec.args, vec!["-c", "choco install a -y"]);
        assert!(!spec.elevated);
        assert_eq!(spec.to_string(), "sh -c \"choco install a -y\"");
    }

    #[test]
    fn unelevated_spec_is_spawned_verbatim() {
        let spec = CommandSpec::new("echo", ["hi"]);
        assert_eq!(elevate(&spec), ("echo".to_string(), vec!["hi".to_string()]));
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let runner = SystemRunner::default();
        runner.run(&sh("exit 0"), &CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_reports_code() {
        let runner = SystemRunner::default();
        let err = runner
            .run(&sh("exit 7"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::NonZeroExit { code: Some(7), .. }));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let runner = SystemRunner::default();
        let spec = CommandSpec::new("spaller-no-such-program-xyz", Vec::<String>::new());
        let err = runner.run(&spec, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let runner = SystemRunner::default();
        let spec = sh("sleep 30").with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = runner.run(&spec, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn timeout_kills_commands_started_by_the_shell() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let script = format!("sh -c 'sleep 1; touch \"{}\"'; true", marker.display());
        let spec = sh(&script).with_timeout(Duration::from_millis(200));

        let runner = SystemRunner::default();
        let err = runner.run(&spec, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "sh did not finish within 200ms");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists(), "inner command outlived the timeout");
    }

    #[tokio::test]
    async fn cancellation_kills_commands_started_by_the_shell() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let script = format!("sh -c 'sleep 1; touch \"{}\"'; true", marker.display());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let runner = SystemRunner::default();
        let err = runner.run(&sh(&script), &cancel).await.unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { .. }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists(), "inner command outlived the cancellation");
    }

    #[tokio::test]
    async fn cancellation_kills_child() {
        let runner = SystemRunner::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = runner.run(&sh("sleep 30"), &cancel).await.unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn runs_are_logged_when_logger_present() {
        let dir = tempfile::tempdir().unwrap();
        let logger = CommandLogger::new(dir.path().to_path_buf()).unwrap();
        let runner = SystemRunner::new(Some(logger.clone()));

        let _ = runner.run(&sh("exit 2"), &CancellationToken::new()).await;

        let contents = std::fs::read_to_string(logger.log_file_path()).unwrap();
        let entry: CommandLogEntry = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(entry.exit_code, Some(2));
        assert!(entry.outcome.contains("code 2"));
    }
}
