//! Transcode session lifecycle.
//!
//! ```text
//! Transcoder ──initialize──▶ TranscodeSession ──start──▶ RunningTranscode
//! (unconfigured)             (configured)               (running → completed | failed)
//! ```
//!
//! Endpoints can only be changed on a [`TranscodeSession`]; `start` consumes
//! it, so nothing can be reconfigured once ffmpeg runs.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::io::DuplexStream;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use super::pipes::{self, PipeReader, PipeTasks, PipeWriter};
use super::progress::{spawn_progress_reader, DiagnosticLog, ProgressStream};
use crate::error::CommandLine;
use crate::media_file::{Endpoint, MediaFile};
use crate::probe::{FfprobeProber, MediaDescriptor};
use crate::tools::Toolchain;
use crate::{Error, Result};

/// Default capacity of the progress hand-off.
pub const DEFAULT_PROGRESS_BUFFER: usize = 16;

/// Default time a probe may take.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long the supervisor waits for the diagnostic reader after exit before
/// publishing the result without the remaining diagnostics.
const DIAGNOSTIC_GRACE: Duration = Duration::from_millis(500);

/// Flags that silence ffmpeg when progress is not requested.
const QUIET_FLAGS: [&str; 3] = ["-nostats", "-loglevel", "0"];

/// Quit command understood by ffmpeg on stdin.
const QUIT_COMMAND: &[u8] = b"q\n";

/// The media file type used by sessions.
pub type SessionMediaFile = MediaFile<DuplexStream, DuplexStream>;

/// Lifecycle state of a transcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unconfigured,
    Configured,
    Running,
    Completed,
    Failed,
}

impl SessionState {
    /// Whether the encoder has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Settings shared by every state of a session.
#[derive(Debug, Clone)]
struct Settings {
    tools: Toolchain,
    whitelist: Vec<String>,
    progress_buffer: usize,
    probe_timeout: Duration,
}

impl Settings {
    fn prober(&self) -> Result<FfprobeProber> {
        Ok(FfprobeProber::from_toolchain(&self.tools)?.with_timeout(self.probe_timeout))
    }
}

/// An unconfigured transcoder.
///
/// # Example
///
/// ```no_run
/// use futures::StreamExt;
/// use ffpilot_av::{Toolchain, ToolsConfig, Transcoder};
///
/// # async fn example() -> ffpilot_av::Result<()> {
/// let tools = Toolchain::discover(&ToolsConfig::default());
/// let session = Transcoder::new(tools).initialize("in.mkv", "out.mp4").await?;
///
/// let mut running = session.start(true)?;
/// let mut progress = running.progress();
/// while let Some(p) = progress.next().await {
///     println!("{:?}% at {}", p.percent, p.current_time);
/// }
/// running.wait().await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Transcoder {
    settings: Settings,
}

impl Transcoder {
    pub fn new(tools: Toolchain) -> Self {
        Self {
            settings: Settings {
                tools,
                whitelist: Vec::new(),
                progress_buffer: DEFAULT_PROGRESS_BUFFER,
                probe_timeout: DEFAULT_PROBE_TIMEOUT,
            },
        }
    }

    /// Restrict the protocols ffprobe and ffmpeg may open.
    pub fn with_protocol_whitelist(
        mut self,
        protocols: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.settings.whitelist = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Capacity of the progress hand-off; values below 1 are raised to 1.
    pub fn with_progress_buffer(mut self, capacity: usize) -> Self {
        self.settings.progress_buffer = capacity.max(1);
        self
    }

    /// Maximum time the input probe may take.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.settings.probe_timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        SessionState::Unconfigured
    }

    /// Configure a path-to-path transcode, probing `input` first.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the binaries cannot be resolved, `input`
    ///   is empty, or `input` names a local file that does not exist.
    /// - Probe errors from [`FfprobeProber::probe`].
    pub async fn initialize(mut self, input: &str, output: &str) -> Result<TranscodeSession> {
        self.settings.tools.ensure_resolved()?;
        check_input(input)?;

        let descriptor = self
            .settings
            .prober()?
            .probe(input, &self.settings.whitelist)
            .await?;

        let mut media = SessionMediaFile::new();
        media.set_descriptor(descriptor);
        media.set_input_path(input)?;
        media.set_output_path(output)?;

        tracing::debug!(input, output, "transcode configured");
        Ok(TranscodeSession {
            settings: self.settings,
            media,
        })
    }

    /// Configure a session with no endpoints and an empty descriptor, for
    /// pipe-driven transcodes. Nothing is probed.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the binaries cannot be resolved.
    pub fn initialize_empty(mut self) -> Result<TranscodeSession> {
        self.settings.tools.ensure_resolved()?;
        Ok(TranscodeSession {
            settings: self.settings,
            media: SessionMediaFile::new(),
        })
    }
}

/// Reject empty input and local files that do not exist. URLs and `pipe:`
/// inputs are left to the prober.
fn check_input(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(Error::configuration("input path missing"));
    }
    if input.contains("://") || input.starts_with("pipe:") {
        return Ok(());
    }
    if !Path::new(input).exists() {
        return Err(Error::configuration(format!(
            "input file does not exist: {input}"
        )));
    }
    Ok(())
}

/// A configured transcode whose endpoints may still change.
#[derive(Debug)]
pub struct TranscodeSession {
    settings: Settings,
    media: SessionMediaFile,
}

impl TranscodeSession {
    pub fn state(&self) -> SessionState {
        SessionState::Configured
    }

    pub fn media_file(&self) -> &SessionMediaFile {
        &self.media
    }

    pub fn descriptor(&self) -> &MediaDescriptor {
        self.media.descriptor()
    }

    pub fn protocol_whitelist(&self) -> &[String] {
        &self.settings.whitelist
    }

    /// Replace the protocol whitelist used by the encoder (and later probes).
    pub fn set_protocol_whitelist(&mut self, protocols: impl IntoIterator<Item = impl Into<String>>) {
        self.settings.whitelist = protocols.into_iter().map(Into::into).collect();
    }

    /// # Errors
    ///
    /// [`Error::EndpointConflict`] if an input pipe was created.
    pub fn set_input_path(&mut self, path: impl Into<String>) -> Result<()> {
        self.media.set_input_path(path)
    }

    /// # Errors
    ///
    /// [`Error::EndpointConflict`] if an output pipe was created.
    pub fn set_output_path(&mut self, path: impl Into<String>) -> Result<()> {
        self.media.set_output_path(path)
    }

    /// Feed the encoder from the returned writer instead of an input path.
    ///
    /// While an input pipe is in use stdin carries media, so
    /// [`TranscodeHandle::stop`] has no control channel and does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::EndpointConflict`] if an input path is set or a pipe exists.
    pub fn create_input_pipe(&mut self) -> Result<PipeWriter> {
        self.media.check_input_pipe()?;
        let (writer, session_side) = pipes::input_pipe();
        self.media.attach_input_pipe(session_side)?;
        Ok(writer)
    }

    /// Send the encoder output to the returned reader instead of an output
    /// path, muxed as `container_format` with fragmented keyframes.
    ///
    /// # Errors
    ///
    /// [`Error::EndpointConflict`] if an output path is set or a pipe exists.
    pub fn create_output_pipe(&mut self, container_format: impl Into<String>) -> Result<PipeReader> {
        self.media.check_output_pipe()?;
        let (reader, session_side) = pipes::output_pipe();
        self.media.attach_output_pipe(session_side, container_format)?;
        Ok(reader)
    }

    /// Force the output container format.
    pub fn set_output_format(&mut self, format: impl Into<String>) {
        self.media.set_output_format(format);
    }

    /// Override the muxer flags.
    pub fn set_movflags(&mut self, flags: impl Into<String>) {
        self.media.set_movflags(flags);
    }

    /// Encoder options placed before `-i`.
    pub fn add_input_flags(&mut self, flags: impl IntoIterator<Item = impl Into<String>>) {
        self.media.add_input_flags(flags);
    }

    /// Encoder options placed after the input.
    pub fn add_output_flags(&mut self, flags: impl IntoIterator<Item = impl Into<String>>) {
        self.media.add_output_flags(flags);
    }

    /// Probe the configured input path so progress can report percentages.
    ///
    /// # Errors
    ///
    /// - [`Error::EndpointConflict`] if the input is a pipe.
    /// - [`Error::Configuration`] if no input is set.
    /// - Probe errors from [`FfprobeProber::probe`].
    pub async fn probe_input(&mut self) -> Result<&MediaDescriptor> {
        let input = match self.media.input() {
            Endpoint::Path(p) => p.clone(),
            Endpoint::Pipe(_) => {
                return Err(Error::endpoint_conflict("cannot probe an input pipe"));
            }
            Endpoint::Unset => return Err(Error::configuration("input path missing")),
        };
        let descriptor = self
            .settings
            .prober()?
            .probe(&input, &self.settings.whitelist)
            .await?;
        self.media.set_descriptor(descriptor);
        Ok(self.media.descriptor())
    }

    /// The encoder arguments `start(progress)` would use:
    /// `-y [-protocol_whitelist ..] [-nostats -loglevel 0] <media flags>`.
    ///
    /// The quiet flags precede the media flags because ffmpeg ignores options
    /// after the last output.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if an endpoint is unset.
    pub fn args(&self, progress: bool) -> Result<Vec<String>> {
        let mut args = vec!["-y".to_string()];
        if !self.settings.whitelist.is_empty() {
            args.push("-protocol_whitelist".to_string());
            args.push(self.settings.whitelist.join(","));
        }
        if !progress {
            args.extend(QUIET_FLAGS.map(String::from));
        }
        args.extend(self.media.to_args()?);
        Ok(args)
    }

    /// The full command line `start(progress)` would spawn.
    pub fn command(&self, progress: bool) -> Result<CommandLine> {
        Ok(CommandLine::new(
            self.settings.tools.ffmpeg_path(),
            self.args(progress)?,
        ))
    }

    /// Spawn ffmpeg.
    ///
    /// With `progress`, stderr is parsed into [`RunningTranscode::progress`];
    /// otherwise it is discarded and ffmpeg is told to be quiet. Spawn failures
    /// are not returned here: they are delivered by [`RunningTranscode::wait`].
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the binaries cannot be resolved or an
    /// endpoint is unset.
    pub fn start(mut self, progress: bool) -> Result<RunningTranscode> {
        self.settings.tools.ensure_resolved()?;
        let command = self.command(progress)?;
        let (input_pipe, output_pipe, descriptor) = self.media.into_pipes();

        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .stdin(Stdio::piped())
            .stdout(if output_pipe.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(if progress { Stdio::piped() } else { Stdio::null() });

        tracing::debug!(command = %command, progress, "spawning ffmpeg");
        let (state_tx, state_rx) = watch::channel(SessionState::Running);
        let (done_tx, done_rx) = oneshot::channel();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                // The pipe halves are dropped here, so the caller's ends close.
                tracing::warn!(command = %command, error = %source, "failed to start ffmpeg");
                state_tx.send_replace(SessionState::Failed);
                let _ = done_tx.send(Err(Error::ProcessStart {
                    command: command.clone(),
                    source,
                    diagnostics: String::new(),
                }));
                return Ok(RunningTranscode {
                    handle: TranscodeHandle {
                        control: Arc::new(Mutex::new(None)),
                        state: state_rx,
                        pid: None,
                    },
                    progress: Some(ProgressStream::sentinel()),
                    done: done_rx,
                    command,
                });
            }
        };
        let pid = child.id();
        tracing::info!(pid, command = %command, "ffmpeg started");

        let mut pipe_tasks = PipeTasks::default();
        let control = match (child.stdin.take(), input_pipe) {
            (Some(stdin), Some(source)) => {
                pipe_tasks.feed(source, stdin);
                None
            }
            (stdin, _) => stdin,
        };
        if let (Some(stdout), Some(sink)) = (child.stdout.take(), output_pipe) {
            pipe_tasks.drain(stdout, sink);
        }

        let diagnostics = DiagnosticLog::new();
        let (progress_stream, progress_task) = match child.stderr.take() {
            Some(stderr) if progress => {
                let (stream, task) = spawn_progress_reader(
                    stderr,
                    descriptor.duration(),
                    self.settings.progress_buffer,
                    diagnostics.clone(),
                );
                (stream, Some(task))
            }
            _ => {
                if progress {
                    tracing::warn!("progress not available: stderr was not captured");
                }
                (ProgressStream::sentinel(), None)
            }
        };

        let control = Arc::new(Mutex::new(control));
        tokio::spawn(supervise(Supervisor {
            child,
            command: command.clone(),
            pipes: pipe_tasks,
            progress_task,
            diagnostics,
            control: control.clone(),
            state_tx,
            done_tx,
        }));

        Ok(RunningTranscode {
            handle: TranscodeHandle {
                control,
                state: state_rx,
                pid,
            },
            progress: Some(progress_stream),
            done: done_rx,
            command,
        })
    }
}

/// Everything the wait task owns.
struct Supervisor {
    child: Child,
    command: CommandLine,
    pipes: PipeTasks,
    progress_task: Option<JoinHandle<()>>,
    diagnostics: DiagnosticLog,
    control: Arc<Mutex<Option<ChildStdin>>>,
    state_tx: watch::Sender<SessionState>,
    done_tx: oneshot::Sender<Result<()>>,
}

/// Wait for exit, close what the session owns, then publish the result once.
async fn supervise(mut sv: Supervisor) {
    let status = sv.child.wait().await;

    // Let the reader catch the last diagnostic lines, but never block on a
    // progress consumer that stopped polling.
    if let Some(task) = sv.progress_task.take() {
        if tokio::time::timeout(DIAGNOSTIC_GRACE, task).await.is_err() {
            tracing::debug!("diagnostic reader still busy after exit");
        }
    }

    sv.control.lock().await.take();
    sv.pipes.close().await;

    let result = match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(Error::ProcessExit {
            command: sv.command,
            reason: format!("exited with {status}"),
            code: status.code(),
            diagnostics: sv.diagnostics.snapshot(),
        }),
        Err(e) => Err(Error::ProcessExit {
            command: sv.command,
            reason: format!("could not be waited on: {e}"),
            code: None,
            diagnostics: sv.diagnostics.snapshot(),
        }),
    };

    match &result {
        Ok(()) => {
            tracing::info!("transcode completed");
            sv.state_tx.send_replace(SessionState::Completed);
        }
        Err(e) => {
            tracing::warn!(error = %e, "transcode failed");
            sv.state_tx.send_replace(SessionState::Failed);
        }
    }
    let _ = sv.done_tx.send(result);
}

/// Cloneable control surface of a running transcode.
#[derive(Debug, Clone)]
pub struct TranscodeHandle {
    control: Arc<Mutex<Option<ChildStdin>>>,
    state: watch::Receiver<SessionState>,
    pid: Option<u32>,
}

impl TranscodeHandle {
    /// OS process id, if the encoder was spawned.
    ///
    /// Provided so callers can layer a forceful kill on top of [`stop`].
    ///
    /// [`stop`]: TranscodeHandle::stop
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Ask ffmpeg to finish gracefully by writing `q` to its stdin.
    ///
    /// A no-op when the session is terminal or stdin carries an input pipe.
    /// The process is never killed; completion is still reported by
    /// [`RunningTranscode::wait`].
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the write fails for a reason other than the process
    /// having already closed stdin.
    pub async fn stop(&self) -> Result<()> {
        if self.state().is_terminal() {
            return Ok(());
        }
        let mut control = self.control.lock().await;
        let Some(stdin) = control.as_mut() else {
            tracing::debug!("stop requested without a control channel");
            return Ok(());
        };
        tracing::info!(pid = self.pid, "requesting ffmpeg to quit");
        let written = match stdin.write_all(QUIT_COMMAND).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve once the transcode is completed or failed.
    pub async fn terminated(&self) -> SessionState {
        let mut state = self.state.clone();
        let reached = state.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        // The sender only goes away after publishing a terminal state.
        reached.unwrap_or_else(|_| *state.borrow())
    }
}

/// A spawned transcode.
#[derive(Debug)]
pub struct RunningTranscode {
    handle: TranscodeHandle,
    progress: Option<ProgressStream>,
    done: oneshot::Receiver<Result<()>>,
    command: CommandLine,
}

impl RunningTranscode {
    /// The command line that was spawned.
    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    pub fn id(&self) -> Option<u32> {
        self.handle.id()
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// A cloneable handle for stopping or observing from other tasks.
    pub fn handle(&self) -> TranscodeHandle {
        self.handle.clone()
    }

    /// See [`TranscodeHandle::stop`].
    pub async fn stop(&self) -> Result<()> {
        self.handle.stop().await
    }

    /// Take the progress stream.
    ///
    /// Without progress requested it yields one empty snapshot. Calls after
    /// the first return an already-ended stream. A stream that is held but
    /// never polled stalls the encoder once its buffer fills; drop it instead.
    pub fn progress(&mut self) -> ProgressStream {
        self.progress.take().unwrap_or_else(ProgressStream::closed)
    }

    /// Wait for the terminal result. Delivered exactly once.
    ///
    /// # Errors
    ///
    /// [`Error::ProcessStart`] or [`Error::ProcessExit`], each carrying the
    /// command line and captured diagnostics.
    pub async fn wait(mut self) -> Result<()> {
        // An untaken stream can no longer be drained; release it so the
        // reader keeps consuming stderr without a receiver.
        drop(self.progress.take());
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(Error::ProcessExit {
                command: self.command,
                reason: "supervisor ended without a result".to_string(),
                code: None,
                diagnostics: String::new(),
            }),
        }
    }
}
