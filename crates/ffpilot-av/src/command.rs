//! Builder for running an external binary to completion with captured output.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::CommandLine;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for one-shot tool invocations such as `ffprobe`.
///
/// Unlike the transcode session, the command's output is collected in full
/// and the child is killed if the timeout elapses.
///
/// # Example
///
/// ```no_run
/// use ffpilot_av::ToolCommand;
///
/// # async fn example() -> std::io::Result<()> {
/// let output = ToolCommand::new("ffprobe")
///     .args(["-print_format", "json", "-show_format"])
///     .arg("/path/to/video.mkv")
///     .output()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// The command line this builder will execute.
    pub fn command_line(&self) -> CommandLine {
        CommandLine::new(self.program.clone(), self.args.clone())
    }

    /// Run the command with a null stdin, capturing stdout and stderr.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`ToolOutput::status`].
    ///
    /// # Errors
    ///
    /// Returns the spawn or wait error, or [`std::io::ErrorKind::TimedOut`]
    /// once the timeout elapses (the child is killed on drop).
    pub async fn output(&self) -> std::io::Result<ToolOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = %self.command_line(), "running tool");
        let child = cmd.spawn()?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                let output = result?;
                Ok(ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Err(_elapsed) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn output_echo() {
        // `echo` should be universally available.
        match ToolCommand::new("echo").arg("hello").output().await {
            Ok(out) => {
                assert!(out.status.success());
                assert!(out.stdout.trim().contains("hello"));
            }
            Err(_) => {
                // On some minimal environments echo may not exist; skip.
            }
        }
    }

    #[tokio::test]
    async fn output_nonexistent_tool() {
        let result = ToolCommand::new("nonexistent_tool_xyz_12345").output().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn timeout_fires() {
        let result = ToolCommand::new("sleep")
            .arg("10")
            .timeout(Duration::from_millis(100))
            .output()
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[test]
    fn command_line_reflects_args() {
        let mut cmd = ToolCommand::new("/usr/bin/ffprobe");
        cmd.arg("-i").args(["a b.mkv", "-show_error"]);
        assert_eq!(
            cmd.command_line().to_string(),
            "/usr/bin/ffprobe -i 'a b.mkv' -show_error"
        );
    }
}
