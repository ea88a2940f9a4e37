//! # ffpilot-av
//!
//! Drive `ffmpeg` and `ffprobe` from async Rust.
//!
//! This crate provides:
//!
//! - **Tool resolution** ([`Toolchain`]) -- locate ffmpeg and ffprobe from
//!   configuration or `PATH`.
//! - **Probing** ([`probe`]) -- run ffprobe and decode its JSON into a
//!   [`MediaDescriptor`].
//! - **Media files** ([`MediaFile`]) -- input/output endpoints (path or pipe)
//!   and encoder flags, serialized into ffmpeg arguments.
//! - **Transcoding** ([`transcode`]) -- start ffmpeg, stream [`Progress`]
//!   with backpressure, stop it gracefully and await the terminal result.
//! - **Timestamps** ([`parse_duration`]) -- `HH:MM:SS.ff` to seconds.

pub mod command;
pub mod duration;
pub mod error;
pub mod media_file;
pub mod probe;
pub mod tools;
pub mod transcode;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use duration::{format_duration, parse_duration};
pub use error::{CommandLine, Error, Result};
pub use media_file::{Endpoint, MediaFile, FRAGMENTED_MOVFLAGS};
pub use probe::{CodecKind, FfprobeProber, Format, MediaDescriptor, Orientation, Stream};
pub use tools::{ToolInfo, Toolchain, ToolsConfig};
pub use transcode::{
    PipeReader, PipeWriter, Progress, ProgressStream, RunningTranscode, SessionState,
    TranscodeHandle, TranscodeSession, Transcoder,
};
