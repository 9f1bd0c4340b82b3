//! Runs external commands for command-backed collaborators.
//!
//! Input is written to stdin; stdout and stderr are read concurrently so a
//! chatty stderr can never block the process. An optional timeout sends
//! SIGTERM and reports the run as timed out.

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of one command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Whether the command exited 0 within the timeout.
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Stdout followed by stderr, for error classification.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }

    /// Last non-empty stderr line, or the exit code when stderr is silent.
    pub fn failure_summary(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map_or_else(
                || match self.exit_code {
                    Some(code) => format!("exited with code {code}"),
                    None => "terminated by signal".to_string(),
                },
                str::to_string,
            )
    }
}

/// An executable plus its fixed arguments.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
        }
    }

    /// Runs the command from `dir` instead of the current directory.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the command with its fixed arguments.
    pub async fn run(
        &self,
        input: Option<&str>,
        timeout: Option<Duration>,
    ) -> std::io::Result<CommandOutput> {
        self.run_with_args(&[], input, timeout).await
    }

    /// Runs the command with `extra` appended to its fixed arguments.
    pub async fn run_with_args(
        &self,
        extra: &[&str],
        input: Option<&str>,
        timeout: Option<Duration>,
    ) -> std::io::Result<CommandOutput> {
        let mut command = Command::new(&self.command);
        command.args(&self.args);
        command.args(extra);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(
            command = %self.command,
            args = ?self.args,
            extra = ?extra,
            cwd = ?self.working_dir,
            "Spawning command"
        );

        let mut child = command.spawn()?;

        if let Some(input) = input
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin.write_all(input.as_bytes()).await?;
            drop(stdin);
        }

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        let streams = async {
            let stdout_future = async {
                let mut lines_out = Vec::new();
                if let Some(stdout) = stdout_handle {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Some(line) = lines.next_line().await? {
                        lines_out.push(line);
                    }
                }
                Ok::<_, std::io::Error>(lines_out)
            };

            let stderr_future = async {
                let mut lines_out = Vec::new();
                if let Some(stderr) = stderr_handle {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Some(line) = lines.next_line().await? {
                        lines_out.push(line);
                    }
                }
                Ok::<_, std::io::Error>(lines_out)
            };

            tokio::try_join!(stdout_future, stderr_future)
        };

        let mut timed_out = false;
        let (stdout_lines, stderr_lines) = match timeout {
            Some(duration) => match tokio::time::timeout(duration, streams).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        command = %self.command,
                        timeout_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                        "Command timed out, sending SIGTERM"
                    );
                    timed_out = true;
                    Self::terminate_child(&child);
                    (Vec::new(), Vec::new())
                }
            },
            None => streams.await?,
        };

        let status = child.wait().await?;

        Ok(CommandOutput {
            stdout: stdout_lines.join("\n"),
            stderr: stderr_lines.join("\n"),
            success: status.success() && !timed_out,
            exit_code: status.code(),
            timed_out,
        })
    }

    fn terminate_child(child: &tokio::process::Child) {
        if let Some(pid) = child.id() {
            #[allow(clippy::cast_possible_wrap)]
            let pid = Pid::from_raw(pid as i32);
            debug!(%pid, "Sending SIGTERM to child process");
            let _ = kill(pid, Signal::SIGTERM);
        }
    }
}
