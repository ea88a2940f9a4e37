//! Benchmarks for ffmpeg diagnostic and ffprobe output parsing
//!
//! Covers the per-line work done while a transcode runs and the one-off
//! probe decode done before it starts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ffpilot_av::probe::parse_probe_output;
use ffpilot_av::transcode::{parse_progress_line, LineSplitter};
use ffpilot_av::parse_duration;
use std::time::Duration;

const STATUS_LINE: &str =
    "frame= 1200 fps= 60 q=28.0 size=   10240kB time=00:00:40.00 bitrate=2097.2kbits/s speed=2.01x";

const LOG_LINE: &str = "[libx264 @ 0x55d5c1a3e2c0] using cpu capabilities: MMX2 SSE2Fast SSSE3 SSE4.2 AVX FMA3 BMI2 AVX2";

const FFPROBE_SIMPLE: &str = r#"{
    "format": {
        "filename": "/media/clip.mp4",
        "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
        "duration": "120.000000",
        "size": "52428800",
        "bit_rate": "3495253"
    },
    "streams": [
        {
            "index": 0,
            "codec_type": "video",
            "codec_name": "h264",
            "width": 1920,
            "height": 1080,
            "r_frame_rate": "30/1",
            "avg_frame_rate": "30000/1001",
            "disposition": {"default": 1, "forced": 0}
        },
        {
            "index": 1,
            "codec_type": "audio",
            "codec_name": "aac",
            "disposition": {"default": 1, "forced": 0},
            "tags": {"language": "eng"}
        }
    ]
}"#;

/// A stderr capture: banner lines followed by `\r`-rewritten status lines.
fn stderr_capture(status_lines: usize) -> Vec<u8> {
    let mut out = String::new();
    for _ in 0..20 {
        out.push_str(LOG_LINE);
        out.push('\n');
    }
    for _ in 0..status_lines {
        out.push_str(STATUS_LINE);
        out.push('\r');
    }
    out.into_bytes()
}

fn bench_line_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_parsing");
    let total = Duration::from_secs(120);

    group.bench_function("status_line", |b| {
        b.iter(|| parse_progress_line(black_box(STATUS_LINE), total));
    });

    group.bench_function("log_line", |b| {
        b.iter(|| parse_progress_line(black_box(LOG_LINE), total));
    });

    group.bench_function("parse_duration", |b| {
        b.iter(|| parse_duration(black_box("01:23:45.67")));
    });

    group.finish();
}

fn bench_stream_splitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_splitting");

    for lines in [100usize, 1000] {
        let capture = stderr_capture(lines);
        group.throughput(Throughput::Bytes(capture.len() as u64));
        group.bench_with_input(BenchmarkId::new("split_and_parse", lines), &capture, |b, data| {
            b.iter(|| {
                let mut splitter = LineSplitter::new();
                let mut parsed = 0usize;
                for chunk in data.chunks(8 * 1024) {
                    splitter.push(black_box(chunk));
                    while let Some(line) = splitter.next_line() {
                        if parse_progress_line(&line, Duration::from_secs(120)).is_some() {
                            parsed += 1;
                        }
                    }
                }
                parsed
            });
        });
    }

    group.finish();
}

fn bench_probe_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("probe_decode");

    group.throughput(Throughput::Bytes(FFPROBE_SIMPLE.len() as u64));
    group.bench_with_input(
        BenchmarkId::new("ffprobe", "simple"),
        &FFPROBE_SIMPLE,
        |b, json| {
            b.iter(|| parse_probe_output("clip.mp4", black_box(json)));
        },
    );

    group.finish();
}

criterion_group!(
    benches,
    bench_line_parsing,
    bench_stream_splitting,
    bench_probe_decode
);
criterion_main!(benches);
