//! Probe integration tests
//!
//! Runs the prober against scripted ffprobe stand-ins: decoded output,
//! failing runs, malformed output and timeouts.

#![cfg(unix)]

mod common;

use assert_matches::assert_matches;
use common::FakeTools;
use ffpilot_av::{probe, CodecKind, Error, FfprobeProber};
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn probe_decodes_descriptor() {
    let tools = FakeTools::with_ffmpeg("exit 0");
    let descriptor = probe::probe(&tools.toolchain(), "clip.mp4", &[])
        .await
        .unwrap();

    assert_eq!(descriptor.duration(), Duration::from_secs(10));
    assert_eq!(descriptor.format.size, 1_048_576);
    assert_eq!(descriptor.format.bit_rate, 838_860);
    assert_eq!(descriptor.format.nb_streams, 2);
    assert_eq!(descriptor.primary_kind(), CodecKind::Video);

    let video = descriptor.first_video().unwrap();
    assert_eq!((video.width, video.height), (1280, 720));
    assert_eq!(video.frame_rate, 25.0);
    assert!(video.disposition.default);

    let audio = descriptor.first_audio().unwrap();
    assert_eq!(audio.codec_name, "aac");
    assert_eq!(
        audio.tags.as_ref().and_then(|t| t.language.as_deref()),
        Some("eng")
    );
}

#[tokio::test]
#[serial]
async fn whitelist_is_passed_to_ffprobe() {
    // Echo the arguments back through the error path.
    let tools = FakeTools::new("exit 0", r#"printf '%s ' "$@" >&2; exit 1"#);
    let whitelist = vec!["file".to_string(), "http".to_string()];

    let err = FfprobeProber::new(&tools.ffprobe)
        .probe("clip.mp4", &whitelist)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        Error::ProbeExecution { stderr, .. }
            if stderr.starts_with("-protocol_whitelist file,http -i clip.mp4 -print_format json")
    );
}

#[tokio::test]
#[serial]
async fn failing_probe_keeps_both_streams() {
    let tools = FakeTools::new(
        "exit 0",
        r#"
echo '{}'
echo "missing.mp4: No such file or directory" >&2
exit 1
"#,
    );

    let err = FfprobeProber::new(&tools.ffprobe)
        .probe("missing.mp4", &[])
        .await
        .unwrap_err();
    let message = err.to_string();
    assert_matches!(
        &err,
        Error::ProbeExecution { stdout, stderr, os_error: None, .. }
            if stdout.contains("{}") && stderr.contains("No such file or directory")
    );
    assert!(message.contains("missing.mp4"));
    assert!(message.contains("No such file or directory"));
}

#[tokio::test]
#[serial]
async fn malformed_output_is_decode_error() {
    let tools = FakeTools::new("exit 0", "echo 'this is not json'");

    let err = FfprobeProber::new(&tools.ffprobe)
        .probe("clip.mp4", &[])
        .await
        .unwrap_err();
    assert_matches!(err, Error::ProbeDecode { input, .. } if input == "clip.mp4");
}

#[tokio::test]
#[serial]
async fn hung_probe_times_out() {
    let tools = FakeTools::new("exit 0", "sleep 30");

    let err = FfprobeProber::new(&tools.ffprobe)
        .with_timeout(Duration::from_millis(200))
        .probe("clip.mp4", &[])
        .await
        .unwrap_err();
    assert_matches!(
        err,
        Error::ProbeExecution { os_error: Some(e), .. } if e.kind() == std::io::ErrorKind::TimedOut
    );
}

#[tokio::test]
#[serial]
async fn missing_prober_is_execution_error() {
    let err = FfprobeProber::new("/nonexistent/bin/ffprobe")
        .probe("clip.mp4", &[])
        .await
        .unwrap_err();
    assert_matches!(err, Error::ProbeExecution { os_error: Some(_), .. });
}
