//! Error types for ffpilot-av.

use std::fmt;
use std::path::{Path, PathBuf};

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// An external command line as it was (or would be) executed.
///
/// Carried by every process-related error so the exact invocation can be
/// replayed by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLine {
    /// Create a command line from a program path and its arguments.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The executable path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The arguments, in order, without the program itself.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", s.replace('\'', r"'\''"))
    } else {
        s.to_string()
    }
}

/// Errors that can occur while probing or transcoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binaries could not be resolved or the session is missing required input.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A path was set on an endpoint that already has a pipe, or vice versa.
    #[error("endpoint conflict: {0}")]
    EndpointConflict(String),

    /// The prober could not be spawned or exited unsuccessfully.
    #[error(
        "ffprobe failed ({command}): {reason}{}{}",
        section("stdout", .stdout),
        section("stderr", .stderr)
    )]
    ProbeExecution {
        /// The attempted invocation.
        command: CommandLine,
        /// Spawn error or exit status description.
        reason: String,
        /// The OS error, when the failure came from spawning or waiting.
        os_error: Option<std::io::Error>,
        /// Captured standard output, verbatim.
        stdout: String,
        /// Captured standard error, verbatim.
        stderr: String,
    },

    /// The prober succeeded but its output is not the expected JSON document.
    #[error("failed to decode ffprobe output for {input}: {source}")]
    ProbeDecode {
        /// The probed input.
        input: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The encoder could not be spawned.
    #[error("failed to start ffmpeg ({command}): {source}{}", section("diagnostics", .diagnostics))]
    ProcessStart {
        /// The attempted invocation.
        command: CommandLine,
        /// The spawn error.
        source: std::io::Error,
        /// Diagnostic text captured so far.
        diagnostics: String,
    },

    /// The encoder ran but did not finish successfully.
    #[error("ffmpeg {reason} ({command}){}", section("diagnostics", .diagnostics))]
    ProcessExit {
        /// The attempted invocation.
        command: CommandLine,
        /// Exit status description.
        reason: String,
        /// Exit code, if the process was not terminated by a signal.
        code: Option<i32>,
        /// Tail of the encoder's diagnostic stream.
        diagnostics: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn section(label: &str, text: &str) -> String {
    let text = text.trim_end();
    if text.is_empty() {
        String::new()
    } else {
        format!("\n{label}:\n{text}")
    }
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an endpoint conflict error.
    pub fn endpoint_conflict(message: impl Into<String>) -> Self {
        Self::EndpointConflict(message.into())
    }

    /// The command line attached to this error, if it is process-related.
    pub fn command(&self) -> Option<&CommandLine> {
        match self {
            Self::ProbeExecution { command, .. }
            | Self::ProcessStart { command, .. }
            | Self::ProcessExit { command, .. } => Some(command),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_display_quotes_whitespace() {
        let cmd = CommandLine::new(
            "/usr/bin/ffmpeg",
            vec!["-i".into(), "my movie.mkv".into(), "".into()],
        );
        assert_eq!(cmd.to_string(), "/usr/bin/ffmpeg -i 'my movie.mkv' ''");
    }

    #[test]
    fn process_exit_display_includes_command_and_diagnostics() {
        let err = Error::ProcessExit {
            command: CommandLine::new("ffmpeg", vec!["-y".into(), "-i".into(), "in.avi".into()]),
            reason: "exited with exit status: 1".into(),
            code: Some(1),
            diagnostics: "Unknown encoder 'libfoo'\n".into(),
        };
        let text = err.to_string();
        assert!(text.contains("ffmpeg -y -i in.avi"));
        assert!(text.contains("Unknown encoder 'libfoo'"));
        assert!(err.command().is_some());
    }

    #[test]
    fn empty_sections_are_omitted() {
        let err = Error::ProbeExecution {
            command: CommandLine::new("ffprobe", vec![]),
            reason: "exited with exit status: 1".into(),
            os_error: None,
            stdout: String::new(),
            stderr: "  \n".into(),
        };
        assert_eq!(err.to_string(), "ffprobe failed (ffprobe): exited with exit status: 1");
    }

    #[test]
    fn endpoint_conflict_display() {
        let err = Error::endpoint_conflict("input pipe already configured");
        assert_eq!(err.to_string(), "endpoint conflict: input pipe already configured");
        assert!(err.command().is_none());
    }
}
