//! Media descriptor types.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structure of one input as reported by the prober.
///
/// Built once per input and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaDescriptor {
    /// Streams in prober order.
    pub streams: Vec<Stream>,
    /// Container-level information.
    pub format: Format,
}

impl MediaDescriptor {
    /// Total duration. Zero means unknown or live.
    pub fn duration(&self) -> Duration {
        self.format.duration
    }

    /// All video streams, in order.
    pub fn video_streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter().filter(|s| s.is_video())
    }

    /// All audio streams, in order.
    pub fn audio_streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter().filter(|s| s.is_audio())
    }

    /// The first video stream, if any.
    pub fn first_video(&self) -> Option<&Stream> {
        self.video_streams().next()
    }

    /// The first audio stream, if any.
    pub fn first_audio(&self) -> Option<&Stream> {
        self.audio_streams().next()
    }

    /// Rotation flag of the first video stream; `None` without video.
    pub fn is_video_rotated(&self) -> Option<bool> {
        self.first_video().and_then(Stream::is_rotated)
    }

    /// [`CodecKind::Video`] if any video stream exists, else [`CodecKind::Audio`].
    pub fn primary_kind(&self) -> CodecKind {
        if self.first_video().is_some() {
            CodecKind::Video
        } else {
            CodecKind::Audio
        }
    }
}

/// Container-level information.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Format {
    /// Input name as the prober saw it.
    pub filename: String,
    /// Number of streams.
    pub nb_streams: u32,
    /// Number of programs.
    pub nb_programs: u32,
    /// Short format names (`format_name` split on `,`).
    pub extensions: Vec<String>,
    /// Descriptive format name.
    pub format_long_name: String,
    /// Total duration; zero when unknown.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Size in bytes; zero when unknown.
    pub size: u64,
    /// Bit rate in bits/s; zero when unknown.
    pub bit_rate: u64,
    /// Prober confidence score.
    pub probe_score: i32,
    /// Container tags.
    pub tags: FormatTags,
}

impl Format {
    /// Duration in fractional seconds.
    pub fn seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Container tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatTags {
    /// Writing application (`ENCODER` tag).
    pub encoder: Option<String>,
    /// Every other tag, verbatim.
    pub other: BTreeMap<String, String>,
}

/// Stream codec type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CodecKind {
    Video,
    Audio,
    /// Subtitle, data, attachment or anything else the prober reports.
    Other(String),
}

impl From<String> for CodecKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Other(s),
        }
    }
}

impl From<CodecKind> for String {
    fn from(kind: CodecKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Display orientation of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// One elementary stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stream {
    pub index: u32,
    pub id: Option<String>,
    pub codec_name: String,
    pub codec_long_name: String,
    pub profile: String,
    pub codec_kind: CodecKind,
    pub codec_time_base: String,
    pub codec_tag_string: String,
    pub codec_tag: String,
    /// Width in pixels (video only).
    pub width: u32,
    /// Height in pixels (video only).
    pub height: u32,
    pub coded_width: u32,
    pub coded_height: u32,
    pub has_b_frames: u32,
    pub sample_aspect_ratio: String,
    pub display_aspect_ratio: String,
    pub pix_fmt: String,
    pub level: i32,
    pub chroma_location: String,
    pub refs: u32,
    /// Raw `r_frame_rate` rational.
    pub r_frame_rate: String,
    /// Raw `avg_frame_rate` rational.
    pub avg_frame_rate: String,
    pub time_base: String,
    pub duration_ts: i64,
    /// Stream duration in seconds, as reported.
    pub duration: String,
    /// Stream bit rate, as reported.
    pub bit_rate: String,
    pub disposition: Disposition,
    pub side_data: Vec<SideData>,
    pub tags: Option<StreamTags>,
    /// Frames per second derived from `avg_frame_rate`, else `r_frame_rate`.
    /// Zero when neither parses.
    pub frame_rate: f64,
}

impl Default for CodecKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl Stream {
    pub fn is_video(&self) -> bool {
        self.codec_kind == CodecKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.codec_kind == CodecKind::Audio
    }

    /// `None` unless this is a video stream with non-zero dimensions.
    pub fn orientation(&self) -> Option<Orientation> {
        if !self.is_video() || self.width == 0 || self.height == 0 {
            return None;
        }
        if self.width < self.height {
            Some(Orientation::Portrait)
        } else {
            Some(Orientation::Landscape)
        }
    }

    /// `None` for non-video streams; otherwise whether any side-data entry
    /// rotates by exactly ±90 degrees.
    pub fn is_rotated(&self) -> Option<bool> {
        if !self.is_video() {
            return None;
        }
        Some(
            self.side_data
                .iter()
                .any(|sd| sd.rotation.is_some_and(|r| r.abs() == 90)),
        )
    }
}

/// Stream disposition flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Disposition {
    pub default: bool,
    pub dub: bool,
    pub original: bool,
    pub comment: bool,
    pub lyrics: bool,
    pub karaoke: bool,
    pub forced: bool,
    pub hearing_impaired: bool,
    pub visual_impaired: bool,
    pub clean_effects: bool,
}

/// A side-data entry attached to a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SideData {
    pub side_data_type: Option<String>,
    pub display_matrix: Option<String>,
    /// Rotation in degrees.
    pub rotation: Option<i64>,
    pub max_content: Option<i64>,
    pub max_average: Option<i64>,
    pub red_x: Option<String>,
    pub red_y: Option<String>,
    pub green_x: Option<String>,
    pub green_y: Option<String>,
    pub blue_x: Option<String>,
    pub blue_y: Option<String>,
    pub white_point_x: Option<String>,
    pub white_point_y: Option<String>,
    pub min_luminance: Option<String>,
    pub max_luminance: Option<String>,
}

/// Per-stream tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamTags {
    /// Parsed `creation_time`; `None` when absent or not RFC 3339.
    pub creation_time: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub handler_name: Option<String>,
    pub vendor_id: Option<String>,
    pub encoder: Option<String>,
}

/// Resolve a frame rate: `avg` wins when non-empty, else `r`.
pub(crate) fn resolve_frame_rate(avg: &str, r: &str) -> f64 {
    if !avg.is_empty() {
        parse_frame_rate(avg)
    } else if !r.is_empty() {
        parse_frame_rate(r)
    } else {
        0.0
    }
}

/// `"N/D"` is divided as integers; anything else is parsed as a float.
/// Every failure, including a zero denominator, yields zero.
pub(crate) fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let (Ok(num), Ok(den)) = (num.parse::<i64>(), den.parse::<i64>()) else {
                return 0.0;
            };
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        }
        None => rate
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0),
    }
}

/// Serde helper to serialize `Duration` as fractional seconds.
mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(width: u32, height: u32) -> Stream {
        Stream {
            codec_kind: CodecKind::Video,
            width,
            height,
            ..Default::default()
        }
    }

    fn audio() -> Stream {
        Stream {
            codec_kind: CodecKind::Audio,
            ..Default::default()
        }
    }

    fn rotated(degrees: i64) -> SideData {
        SideData {
            rotation: Some(degrees),
            ..Default::default()
        }
    }

    #[test]
    fn frame_rate_precedence() {
        assert!((resolve_frame_rate("30000/1001", "25/1") - 29.97).abs() < 0.01);
        assert_eq!(resolve_frame_rate("", "25/1"), 25.0);
        assert_eq!(resolve_frame_rate("", ""), 0.0);
    }

    #[test]
    fn frame_rate_failures_are_zero() {
        assert_eq!(parse_frame_rate("25/0"), 0.0);
        assert_eq!(parse_frame_rate("0/0"), 0.0);
        assert_eq!(parse_frame_rate("30/1.5"), 0.0);
        assert_eq!(parse_frame_rate("a/b"), 0.0);
        assert_eq!(parse_frame_rate("invalid"), 0.0);
        assert_eq!(parse_frame_rate("1/2/3"), 0.0);
        assert_eq!(parse_frame_rate("23.976"), 23.976);
    }

    #[test]
    fn orientation() {
        assert_eq!(video(1920, 1080).orientation(), Some(Orientation::Landscape));
        assert_eq!(video(1080, 1920).orientation(), Some(Orientation::Portrait));
        assert_eq!(video(720, 720).orientation(), Some(Orientation::Landscape));
        assert_eq!(video(0, 1080).orientation(), None);
        assert_eq!(audio().orientation(), None);
    }

    #[test]
    fn rotation() {
        let mut s = video(1920, 1080);
        assert_eq!(s.is_rotated(), Some(false));

        s.side_data = vec![rotated(-90)];
        assert_eq!(s.is_rotated(), Some(true));

        s.side_data = vec![rotated(180)];
        assert_eq!(s.is_rotated(), Some(false));

        s.side_data = vec![SideData::default(), rotated(90)];
        assert_eq!(s.is_rotated(), Some(true));

        assert_eq!(audio().is_rotated(), None);
    }

    #[test]
    fn descriptor_queries() {
        let mut portrait = video(1080, 1920);
        portrait.side_data = vec![rotated(90)];
        let desc = MediaDescriptor {
            streams: vec![audio(), portrait, video(640, 480), audio()],
            format: Format {
                duration: Duration::from_secs(100),
                ..Default::default()
            },
        };

        assert_eq!(desc.video_streams().count(), 2);
        assert_eq!(desc.audio_streams().count(), 2);
        assert_eq!(desc.first_video().map(|s| s.width), Some(1080));
        assert!(desc.first_audio().is_some());
        assert_eq!(desc.is_video_rotated(), Some(true));
        assert_eq!(desc.primary_kind(), CodecKind::Video);
        assert_eq!(desc.format.seconds(), 100.0);
    }

    #[test]
    fn audio_only_descriptor() {
        let desc = MediaDescriptor {
            streams: vec![audio()],
            ..Default::default()
        };
        assert_eq!(desc.primary_kind(), CodecKind::Audio);
        assert_eq!(desc.is_video_rotated(), None);
        assert_eq!(desc.duration(), Duration::ZERO);
    }

    #[test]
    fn codec_kind_strings() {
        assert_eq!(CodecKind::from("video".to_string()), CodecKind::Video);
        assert_eq!(
            CodecKind::from("subtitle".to_string()),
            CodecKind::Other("subtitle".into())
        );
        assert_eq!(String::from(CodecKind::Audio), "audio");
        let json = serde_json::to_string(&CodecKind::Other("data".into())).unwrap();
        assert_eq!(json, "\"data\"");
    }
}
