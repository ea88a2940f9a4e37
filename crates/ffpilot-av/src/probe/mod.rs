//! Media inspection through the external prober.
//!
//! [`MediaDescriptor`] is the decoded structure of one input; [`FfprobeProber`]
//! (or the [`probe`] shorthand) produces it by running `ffprobe`.

pub mod ffprobe;
pub mod types;

pub use self::ffprobe::{parse_probe_output, probe, probe_args, FfprobeProber};
pub use self::types::{
    CodecKind, Disposition, Format, FormatTags, MediaDescriptor, Orientation, SideData, Stream,
    StreamTags,
};
