//! Encoder/prober binary resolution.
//!
//! [`Toolchain`] holds the resolved locations of `ffmpeg` and `ffprobe`. An
//! empty path means the binary has not been resolved yet; sessions call
//! [`Toolchain::ensure_resolved`] before first use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

/// User-supplied overrides for binary locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Explicit path to the `ffmpeg` executable.
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit path to the `ffprobe` executable.
    pub ffprobe_path: Option<PathBuf>,
}

/// Availability information for a binary, returned by [`Toolchain::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// First line of `-version` output, if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Resolved encoder and prober paths.
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    config: ToolsConfig,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Toolchain {
    /// Resolve both binaries.
    ///
    /// A configured path is used when it exists; otherwise `PATH` is searched
    /// with [`which::which`]. Binaries that cannot be found are left empty.
    pub fn discover(config: &ToolsConfig) -> Self {
        Self {
            ffmpeg: resolve(FFMPEG, config.ffmpeg_path.as_deref()).unwrap_or_default(),
            ffprobe: resolve(FFPROBE, config.ffprobe_path.as_deref()).unwrap_or_default(),
            config: config.clone(),
        }
    }

    /// Build a toolchain from explicit paths without touching the filesystem.
    pub fn from_paths(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        let ffmpeg = ffmpeg.into();
        let ffprobe = ffprobe.into();
        Self {
            config: ToolsConfig {
                ffmpeg_path: Some(ffmpeg.clone()),
                ffprobe_path: Some(ffprobe.clone()),
            },
            ffmpeg,
            ffprobe,
        }
    }

    /// Path to the encoder. Empty when unresolved.
    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Path to the prober. Empty when unresolved.
    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe
    }

    /// Whether both paths are non-empty.
    pub fn is_resolved(&self) -> bool {
        !self.ffmpeg.as_os_str().is_empty() && !self.ffprobe.as_os_str().is_empty()
    }

    /// Retry discovery for any unresolved binary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the binary that still could not
    /// be found.
    pub fn ensure_resolved(&mut self) -> Result<()> {
        if self.ffmpeg.as_os_str().is_empty() {
            self.ffmpeg = resolve(FFMPEG, self.config.ffmpeg_path.as_deref())
                .ok_or_else(|| missing(FFMPEG))?;
            tracing::debug!(path = %self.ffmpeg.display(), "resolved ffmpeg");
        }
        if self.ffprobe.as_os_str().is_empty() {
            self.ffprobe = resolve(FFPROBE, self.config.ffprobe_path.as_deref())
                .ok_or_else(|| missing(FFPROBE))?;
            tracing::debug!(path = %self.ffprobe.display(), "resolved ffprobe");
        }
        Ok(())
    }

    /// Report availability and version of both binaries.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        [(FFMPEG, &self.ffmpeg), (FFPROBE, &self.ffprobe)]
            .into_iter()
            .map(|(name, path)| {
                if path.as_os_str().is_empty() {
                    ToolInfo {
                        name: name.to_string(),
                        available: false,
                        version: None,
                        path: None,
                    }
                } else {
                    ToolInfo {
                        name: name.to_string(),
                        available: true,
                        version: detect_version(path),
                        path: Some(path.clone()),
                    }
                }
            })
            .collect()
    }
}

fn resolve(name: &str, custom: Option<&Path>) -> Option<PathBuf> {
    match custom {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => {
            tracing::warn!(tool = name, path = %p.display(), "configured path does not exist, searching PATH");
            which::which(name).ok()
        }
        None => which::which(name).ok(),
    }
}

fn missing(name: &str) -> Error {
    Error::configuration(format!("{name} not found; is it installed and in PATH?"))
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
