//! Shared test harness for integration tests.
//!
//! Provides [`FakeTools`], a temporary directory holding shell-script
//! stand-ins for `ffmpeg` and `ffprobe`, so sessions can be driven end to end
//! without the real binaries installed.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ffpilot_av::{Toolchain, Transcoder};
use tempfile::TempDir;

/// ffprobe output for a ten second clip with one video and one audio stream.
pub const PROBE_JSON: &str = r#"{
    "streams": [
        {
            "index": 0,
            "codec_name": "h264",
            "codec_type": "video",
            "width": 1280,
            "height": 720,
            "r_frame_rate": "25/1",
            "avg_frame_rate": "25/1",
            "disposition": {"default": 1}
        },
        {
            "index": 1,
            "codec_name": "aac",
            "codec_type": "audio",
            "sample_rate": "48000",
            "channels": 2,
            "tags": {"language": "eng"}
        }
    ],
    "format": {
        "filename": "clip.mp4",
        "nb_streams": 2,
        "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
        "format_long_name": "QuickTime / MOV",
        "duration": "10.000000",
        "size": "1048576",
        "bit_rate": "838860"
    }
}"#;

/// Script body for an ffprobe that always succeeds with [`PROBE_JSON`].
pub fn probe_ok_script() -> String {
    format!("cat <<'EOF'\n{PROBE_JSON}\nEOF\n")
}

/// Temporary directory with fake `ffmpeg` and `ffprobe` executables.
pub struct FakeTools {
    pub dir: TempDir,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FakeTools {
    /// Create both scripts from their shell bodies.
    pub fn new(ffmpeg_body: &str, ffprobe_body: &str) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let ffmpeg = write_script(dir.path(), "ffmpeg", ffmpeg_body);
        let ffprobe = write_script(dir.path(), "ffprobe", ffprobe_body);
        Self {
            dir,
            ffmpeg,
            ffprobe,
        }
    }

    /// A fake ffmpeg paired with the succeeding ffprobe.
    pub fn with_ffmpeg(ffmpeg_body: &str) -> Self {
        Self::new(ffmpeg_body, &probe_ok_script())
    }

    pub fn toolchain(&self) -> Toolchain {
        Toolchain::from_paths(&self.ffmpeg, &self.ffprobe)
    }

    pub fn transcoder(&self) -> Transcoder {
        Transcoder::new(self.toolchain())
    }

    /// Create an input file that passes the existence check.
    pub fn input_file(&self, name: &str) -> String {
        let path = self.dir.path().join(name);
        fs::write(&path, b"not really media").expect("failed to write input file");
        path.to_string_lossy().into_owned()
    }

    /// A path inside the temp dir for an output file.
    pub fn output_file(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }

    /// A config file pointing at the fake binaries.
    pub fn config_file(&self) -> PathBuf {
        let path = self.dir.path().join("ffpilot.toml");
        let content = format!(
            "[tools]\nffmpeg_path = {:?}\nffprobe_path = {:?}\n\n[transcode]\nprotocol_whitelist = [\"file\", \"pipe\"]\n",
            self.ffmpeg.to_string_lossy(),
            self.ffprobe.to_string_lossy(),
        );
        fs::write(&path, content).expect("failed to write config");
        path
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("failed to chmod script");
    path
}
