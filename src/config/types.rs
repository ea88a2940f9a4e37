use serde::{Deserialize, Serialize};

pub use ffpilot_av::ToolsConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Protocols ffprobe/ffmpeg may open (`-protocol_whitelist`); empty means
    /// ffmpeg's own defaults.
    #[serde(default)]
    pub protocol_whitelist: Vec<String>,

    /// Progress snapshots buffered before the encoder's stderr reader waits
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,

    /// Maximum time a probe may take, in seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            protocol_whitelist: Vec::new(),
            progress_buffer: default_progress_buffer(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_progress_buffer() -> usize {
    ffpilot_av::transcode::DEFAULT_PROGRESS_BUFFER
}

fn default_probe_timeout_secs() -> u64 {
    ffpilot_av::transcode::DEFAULT_PROBE_TIMEOUT.as_secs()
}
