//! `ffprobe`-backed [`MediaDescriptor`] construction.
//!
//! Runs `ffprobe [-protocol_whitelist ..] -i <input> -print_format json
//! -show_format -show_streams -show_error` and maps the JSON document into
//! the public model. Numeric fields that fail to parse are left at zero.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::types::{
    resolve_frame_rate, CodecKind, Disposition, Format, FormatTags, MediaDescriptor, SideData,
    Stream, StreamTags,
};
use crate::command::ToolCommand;
use crate::tools::Toolchain;
use crate::{Error, Result};

/// Default probe timeout: 60 seconds.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a prober from a toolchain, resolving `ffprobe` if needed.
    pub fn from_toolchain(tools: &Toolchain) -> Result<Self> {
        let mut tools = tools.clone();
        tools.ensure_resolved()?;
        Ok(Self::new(tools.ffprobe_path()))
    }

    /// Set the maximum time a single probe may take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe `input`, optionally restricting the protocols ffprobe may use.
    ///
    /// # Errors
    ///
    /// - [`Error::ProbeExecution`] if ffprobe cannot be spawned, times out or
    ///   exits unsuccessfully. Both captured streams are attached.
    /// - [`Error::ProbeDecode`] if stdout is not the expected JSON document.
    pub async fn probe(&self, input: &str, whitelist: &[String]) -> Result<MediaDescriptor> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args(probe_args(input, whitelist)).timeout(self.timeout);
        let command = cmd.command_line();

        let output = cmd.output().await.map_err(|e| Error::ProbeExecution {
            command: command.clone(),
            reason: e.to_string(),
            os_error: Some(e),
            stdout: String::new(),
            stderr: String::new(),
        })?;

        if !output.status.success() {
            return Err(Error::ProbeExecution {
                command,
                reason: format!("exited with {}", output.status),
                os_error: None,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        let descriptor = parse_probe_output(input, &output.stdout)?;
        tracing::debug!(
            input,
            streams = descriptor.streams.len(),
            duration_secs = descriptor.format.seconds(),
            "probed input"
        );
        Ok(descriptor)
    }
}

/// Probe `input` with the toolchain's `ffprobe`.
///
/// Shorthand for [`FfprobeProber::from_toolchain`] followed by
/// [`FfprobeProber::probe`].
pub async fn probe(tools: &Toolchain, input: &str, whitelist: &[String]) -> Result<MediaDescriptor> {
    FfprobeProber::from_toolchain(tools)?
        .probe(input, whitelist)
        .await
}

/// Build the ffprobe argument vector for `input`.
pub fn probe_args(input: &str, whitelist: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(9);
    if !whitelist.is_empty() {
        args.push("-protocol_whitelist".to_string());
        args.push(whitelist.join(","));
    }
    args.extend(
        [
            "-i",
            input,
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-show_error",
        ]
        .map(String::from),
    );
    args
}

/// Decode ffprobe's JSON output.
///
/// # Errors
///
/// Returns [`Error::ProbeDecode`] when `json` is not a JSON object of the
/// expected shape.
pub fn parse_probe_output(input: &str, json: &str) -> Result<MediaDescriptor> {
    let raw: FfprobeOutput = serde_json::from_str(json).map_err(|source| Error::ProbeDecode {
        input: input.to_string(),
        source,
    })?;
    Ok(raw.into())
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    filename: Option<String>,
    nb_streams: Option<u32>,
    nb_programs: Option<u32>,
    format_name: Option<String>,
    format_long_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    duration: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    bit_rate: Option<String>,
    probe_score: Option<i32>,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: Option<u32>,
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    codec_name: Option<String>,
    codec_long_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    profile: Option<String>,
    codec_type: Option<String>,
    codec_time_base: Option<String>,
    codec_tag_string: Option<String>,
    codec_tag: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    coded_width: Option<u32>,
    coded_height: Option<u32>,
    has_b_frames: Option<u32>,
    sample_aspect_ratio: Option<String>,
    display_aspect_ratio: Option<String>,
    pix_fmt: Option<String>,
    level: Option<i32>,
    chroma_location: Option<String>,
    refs: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    time_base: Option<String>,
    duration_ts: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    duration: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    bit_rate: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    tags: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FfprobeDisposition {
    default: i64,
    dub: i64,
    original: i64,
    comment: i64,
    lyrics: i64,
    karaoke: i64,
    forced: i64,
    hearing_impaired: i64,
    visual_impaired: i64,
    clean_effects: i64,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    side_data_type: Option<String>,
    displaymatrix: Option<String>,
    rotation: Option<i64>,
    max_content: Option<i64>,
    max_average: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    red_x: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    red_y: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    green_x: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    green_y: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    blue_x: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    blue_y: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    white_point_x: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    white_point_y: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    min_luminance: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    max_luminance: Option<String>,
}

/// ffprobe prints some fields as a string or a bare number depending on
/// version and codec.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(value_to_string))
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

impl From<FfprobeOutput> for MediaDescriptor {
    fn from(raw: FfprobeOutput) -> Self {
        Self {
            streams: raw.streams.into_iter().map(Stream::from).collect(),
            format: raw.format.into(),
        }
    }
}

impl From<FfprobeFormat> for Format {
    fn from(raw: FfprobeFormat) -> Self {
        let extensions = raw
            .format_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        let mut other: BTreeMap<String, String> = raw
            .tags
            .into_iter()
            .filter_map(|(k, v)| value_to_string(v).map(|v| (k, v)))
            .collect();
        let encoder = other.remove("ENCODER").or_else(|| other.remove("encoder"));

        Self {
            filename: raw.filename.unwrap_or_default(),
            nb_streams: raw.nb_streams.unwrap_or(0),
            nb_programs: raw.nb_programs.unwrap_or(0),
            extensions,
            format_long_name: raw.format_long_name.unwrap_or_default(),
            duration: parse_seconds(raw.duration.as_deref()),
            size: parse_u64(raw.size.as_deref()),
            bit_rate: parse_u64(raw.bit_rate.as_deref()),
            probe_score: raw.probe_score.unwrap_or(0),
            tags: FormatTags { encoder, other },
        }
    }
}

impl From<FfprobeStream> for Stream {
    fn from(raw: FfprobeStream) -> Self {
        let r_frame_rate = raw.r_frame_rate.unwrap_or_default();
        let avg_frame_rate = raw.avg_frame_rate.unwrap_or_default();
        let frame_rate = resolve_frame_rate(&avg_frame_rate, &r_frame_rate);

        Self {
            index: raw.index.unwrap_or(0),
            id: raw.id,
            codec_name: raw.codec_name.unwrap_or_default(),
            codec_long_name: raw.codec_long_name.unwrap_or_default(),
            profile: raw.profile.unwrap_or_default(),
            codec_kind: CodecKind::from(raw.codec_type.unwrap_or_default()),
            codec_time_base: raw.codec_time_base.unwrap_or_default(),
            codec_tag_string: raw.codec_tag_string.unwrap_or_default(),
            codec_tag: raw.codec_tag.unwrap_or_default(),
            width: raw.width.unwrap_or(0),
            height: raw.height.unwrap_or(0),
            coded_width: raw.coded_width.unwrap_or(0),
            coded_height: raw.coded_height.unwrap_or(0),
            has_b_frames: raw.has_b_frames.unwrap_or(0),
            sample_aspect_ratio: raw.sample_aspect_ratio.unwrap_or_default(),
            display_aspect_ratio: raw.display_aspect_ratio.unwrap_or_default(),
            pix_fmt: raw.pix_fmt.unwrap_or_default(),
            level: raw.level.unwrap_or(0),
            chroma_location: raw.chroma_location.unwrap_or_default(),
            refs: raw.refs.unwrap_or(0),
            r_frame_rate,
            avg_frame_rate,
            time_base: raw.time_base.unwrap_or_default(),
            duration_ts: raw.duration_ts.unwrap_or(0),
            duration: raw.duration.unwrap_or_default(),
            bit_rate: raw.bit_rate.unwrap_or_default(),
            disposition: raw.disposition.into(),
            side_data: raw.side_data_list.into_iter().map(SideData::from).collect(),
            tags: raw.tags.map(stream_tags),
            frame_rate,
        }
    }
}

impl From<FfprobeDisposition> for Disposition {
    fn from(raw: FfprobeDisposition) -> Self {
        Self {
            default: raw.default != 0,
            dub: raw.dub != 0,
            original: raw.original != 0,
            comment: raw.comment != 0,
            lyrics: raw.lyrics != 0,
            karaoke: raw.karaoke != 0,
            forced: raw.forced != 0,
            hearing_impaired: raw.hearing_impaired != 0,
            visual_impaired: raw.visual_impaired != 0,
            clean_effects: raw.clean_effects != 0,
        }
    }
}

impl From<FfprobeSideData> for SideData {
    fn from(raw: FfprobeSideData) -> Self {
        Self {
            side_data_type: raw.side_data_type,
            display_matrix: raw.displaymatrix,
            rotation: raw.rotation,
            max_content: raw.max_content,
            max_average: raw.max_average,
            red_x: raw.red_x,
            red_y: raw.red_y,
            green_x: raw.green_x,
            green_y: raw.green_y,
            blue_x: raw.blue_x,
            blue_y: raw.blue_y,
            white_point_x: raw.white_point_x,
            white_point_y: raw.white_point_y,
            min_luminance: raw.min_luminance,
            max_luminance: raw.max_luminance,
        }
    }
}

fn stream_tags(mut tags: BTreeMap<String, Value>) -> StreamTags {
    let mut take = |key: &str| tags.remove(key).and_then(value_to_string);
    StreamTags {
        creation_time: take("creation_time").and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        }),
        language: take("language"),
        handler_name: take("handler_name"),
        vendor_id: take("vendor_id"),
        encoder: take("encoder"),
    }
}

/// Seconds as a decimal string; negative, non-finite or garbage yields zero.
fn parse_seconds(s: Option<&str>) -> Duration {
    s.and_then(|s| s.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(Duration::ZERO)
}

fn parse_u64(s: Option<&str>) -> u64 {
    s.and_then(|s| s.trim().parse::<u64>().ok()).unwrap_or(0)
}
