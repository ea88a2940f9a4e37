mod types;

pub use types::*;

use anyhow::{Context, Result};
use ffpilot_av::{Toolchain, Transcoder};
use std::path::Path;
use std::time::Duration;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./ffpilot.toml",
        "~/.config/ffpilot/config.toml",
        "/etc/ffpilot/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

impl Config {
    /// Resolve the configured binaries.
    pub fn toolchain(&self) -> Toolchain {
        Toolchain::discover(&self.tools)
    }

    /// An unconfigured transcoder with this configuration applied.
    pub fn transcoder(&self) -> Transcoder {
        Transcoder::new(self.toolchain())
            .with_protocol_whitelist(self.transcode.protocol_whitelist.iter().cloned())
            .with_progress_buffer(self.transcode.progress_buffer)
            .with_probe_timeout(Duration::from_secs(self.transcode.probe_timeout_secs))
    }
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.transcode.progress_buffer == 0 {
        anyhow::bail!("transcode.progress_buffer cannot be 0");
    }

    if config.transcode.probe_timeout_secs == 0 {
        anyhow::bail!("transcode.probe_timeout_secs cannot be 0");
    }

    for (name, path) in [
        ("ffmpeg", &config.tools.ffmpeg_path),
        ("ffprobe", &config.tools.ffprobe_path),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, path);
            }
        }
    }

    if config
        .transcode
        .protocol_whitelist
        .iter()
        .any(|p| p.trim().is_empty() || p.contains(','))
    {
        anyhow::bail!("transcode.protocol_whitelist entries must be single protocol names");
    }

    Ok(())
}
