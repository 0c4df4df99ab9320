//! External process invocation
//!
//! Two shapes of child process: synchronous commands whose output is
//! captured whole (installer runs, clean scripts), and asynchronous
//! children whose stdout/stderr are streamed line by line into a task
//! writer while the build proceeds.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::InstallError;
use crate::infra::interleaver::TaskWriter;

/// Captured result of a synchronous command
#[derive(Debug)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a shell command synchronously, capturing its output.
///
/// The command string is handed to the platform shell, matching how
/// manifest scripts are declared.
pub fn run_shell(command: &str, cwd: &Path) -> std::io::Result<CommandOutput> {
    let output = shell_command(command).current_dir(cwd).output()?;
    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command up to `max_attempts` times, returning the first success.
///
/// Output of every attempt is captured; intermediate failures are logged
/// and the last failure is returned when the budget runs out.
pub fn run_shell_with_retries(
    command: &str,
    cwd: &Path,
    max_attempts: u32,
) -> Result<CommandOutput, InstallError> {
    for attempt in 1..=max_attempts {
        match run_shell(command, cwd) {
            Ok(output) if output.success() => return Ok(output),
            Ok(output) => {
                tracing::warn!(
                    "Command failed (attempt {attempt}/{max_attempts}): {command}\n{}",
                    output.stderr.trim_end()
                );
            }
            Err(e) => {
                tracing::warn!("Command could not start (attempt {attempt}/{max_attempts}): {e}");
            }
        }
    }
    Err(InstallError::InstallerFailed {
        command: command.to_string(),
        attempts: max_attempts,
    })
}

/// Result of a streamed child process
#[derive(Debug)]
pub struct StreamedExit {
    pub exit_code: i32,
    /// Combined stdout+stderr, in arrival order
    pub combined: String,
    /// Whether anything arrived on stderr
    pub stderr_activity: bool,
}

/// Spawn a shell command and stream its output through `writer`.
///
/// Lines are forwarded as they arrive so long-running builds stay
/// observable; the combined transcript is also returned for diagnostic
/// scanning and log persistence.
pub async fn stream_shell(
    command: &str,
    cwd: &Path,
    writer: &TaskWriter,
) -> std::io::Result<StreamedExit> {
    let mut child = tokio_shell_command(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();

    let mut combined = String::new();
    let mut stderr_activity = false;
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            line = out_lines.next_line(), if out_open => match line? {
                Some(line) => {
                    writer.write_line(&line);
                    combined.push_str(&line);
                    combined.push('\n');
                }
                None => out_open = false,
            },
            line = err_lines.next_line(), if err_open => match line? {
                Some(line) => {
                    stderr_activity = true;
                    writer.write_line(&line);
                    combined.push_str(&line);
                    combined.push('\n');
                }
                None => err_open = false,
            },
        }
    }

    let status = child.wait().await?;
    Ok(StreamedExit {
        exit_code: status.code().unwrap_or(-1),
        combined,
        stderr_activity,
    })
}

fn shell_command(command: &str) -> std::process::Command {
    #[cfg(unix)]
    {
        let mut cmd = std::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(windows)]
    {
        let mut cmd = std::process::Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

fn tokio_shell_command(command: &str) -> tokio::process::Command {
    #[cfg(unix)]
    {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(windows)]
    {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}
