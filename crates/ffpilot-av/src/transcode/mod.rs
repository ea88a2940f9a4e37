//! ffmpeg transcode orchestration.
//!
//! - [`session`]: the `Transcoder → TranscodeSession → RunningTranscode`
//!   lifecycle, completion signal and graceful stop.
//! - [`progress`]: stderr line splitting and status-line parsing.
//! - [`pipes`]: in-memory pipes that replace input/output paths.

pub mod pipes;
pub mod progress;
pub mod session;

pub use self::pipes::{PipeReader, PipeWriter};
pub use self::progress::{
    is_progress_line, parse_progress_line, DiagnosticLog, LineSplitter, Progress, ProgressStream,
};
pub use self::session::{
    RunningTranscode, SessionMediaFile, SessionState, TranscodeHandle, TranscodeSession, Transcoder,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_PROGRESS_BUFFER,
};
