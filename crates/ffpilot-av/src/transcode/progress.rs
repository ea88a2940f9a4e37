//! Progress parsing for ffmpeg's diagnostic (stderr) stream.
//!
//! ffmpeg rewrites its status line in place with `\r`, interleaved with
//! ordinary `\n`-terminated log lines. [`LineSplitter`] cuts the byte stream
//! into lines, [`parse_progress_line`] turns status lines into [`Progress`]
//! snapshots, and everything else lands in a bounded [`DiagnosticLog`] that
//! process errors carry.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::duration::parse_duration;

/// Longest line kept in memory before it is flushed unterminated.
const MAX_LINE_LEN: usize = 64 * 1024;

/// Number of non-progress lines retained for error reports.
const DIAGNOSTIC_TAIL_LINES: usize = 64;

const READ_CHUNK: usize = 8 * 1024;

fn eq_whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"=\s+").expect("whitespace regex should compile"))
}

/// One status update from the encoder.
///
/// All fields except `percent` are kept verbatim as the encoder printed them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    /// Completion in percent; `None` when the total duration is unknown.
    pub percent: Option<f64>,
    /// `frame=` value.
    pub frames_processed: String,
    /// `time=` value, `HH:MM:SS.ff`.
    pub current_time: String,
    /// `bitrate=` value, with unit.
    pub current_bitrate: String,
    /// `speed=` value, with unit.
    pub speed: String,
}

/// Whether `line` is an encoder status line.
pub fn is_progress_line(line: &str) -> bool {
    line.contains("frame=") && line.contains("time=") && line.contains("bitrate=")
}

/// Parse a status line, computing `percent` against `total`.
///
/// Returns `None` for anything that is not a status line. Unknown keys and
/// odd tokens inside a status line are ignored.
pub fn parse_progress_line(line: &str, total: Duration) -> Option<Progress> {
    if !is_progress_line(line) {
        return None;
    }

    let collapsed = eq_whitespace_regex().replace_all(line, "=");
    let mut progress = Progress::default();
    for token in collapsed.split_whitespace() {
        let mut parts = token.split('=');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let slot = match key {
            "frame" => &mut progress.frames_processed,
            "time" => &mut progress.current_time,
            "bitrate" => &mut progress.current_bitrate,
            "speed" => &mut progress.speed,
            _ => continue,
        };
        *slot = value.to_string();
    }

    if !total.is_zero() {
        progress.percent = Some(parse_duration(&progress.current_time) * 100.0 / total.as_secs_f64());
    }
    Some(progress)
}

/// Incremental splitter for `\r`, `\n` and `\r\n` terminated text.
///
/// The earliest terminator in the buffer ends the line, so `\r\n` yields one
/// line followed by an empty one.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, if any.
    pub fn next_line(&mut self) -> Option<String> {
        match self.buf.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(pos) => {
                let line = String::from_utf8_lossy(&self.buf[..pos]).into_owned();
                self.buf.drain(..=pos);
                Some(line)
            }
            None if self.buf.len() >= MAX_LINE_LEN => self.finish(),
            None => None,
        }
    }

    /// Flush whatever is buffered as a final, unterminated line.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}

/// Bounded tail of non-progress diagnostic lines, shared with the supervisor.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() == DIAGNOSTIC_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// The retained lines joined with `\n`.
    pub fn snapshot(&self) -> String {
        let lines = self.lines.lock();
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

/// Progress snapshots of one transcode, ending when the encoder exits.
///
/// Backed by a bounded channel: if the stream is not polled the reader stops
/// pulling from the encoder's stderr, which eventually stalls the encoder.
/// Dropping the stream releases the reader, which keeps draining stderr
/// without publishing.
#[derive(Debug)]
pub struct ProgressStream {
    inner: ReceiverStream<Progress>,
}

impl ProgressStream {
    fn from_receiver(rx: mpsc::Receiver<Progress>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// A stream that yields a single empty snapshot and ends.
    ///
    /// Used when stderr is not wired so callers can always drain to the end.
    pub fn sentinel() -> Self {
        let (tx, rx) = mpsc::channel(1);
        // Capacity 1 with a fresh receiver: cannot fail.
        let _ = tx.try_send(Progress::default());
        Self::from_receiver(rx)
    }

    /// A stream that has already ended.
    pub fn closed() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self::from_receiver(rx)
    }
}

impl Stream for ProgressStream {
    type Item = Progress;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Progress>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Spawn the task that reads `reader` to EOF, publishing snapshots on a
/// channel of `capacity` (at least 1) and logging the rest into `diagnostics`.
pub fn spawn_progress_reader<R>(
    reader: R,
    total: Duration,
    capacity: usize,
    diagnostics: DiagnosticLog,
) -> (ProgressStream, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(read_progress(reader, total, tx, diagnostics));
    (ProgressStream::from_receiver(rx), task)
}

async fn read_progress<R>(
    mut reader: R,
    total: Duration,
    tx: mpsc::Sender<Progress>,
    diagnostics: DiagnosticLog,
) where
    R: AsyncRead + Unpin,
{
    let mut sink = ProgressSink {
        tx: Some(tx),
        total,
        diagnostics,
    };
    let mut splitter = LineSplitter::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "error reading ffmpeg diagnostics");
                break;
            }
        };
        splitter.push(&chunk[..n]);
        while let Some(line) = splitter.next_line() {
            sink.line(line).await;
        }
    }
    if let Some(line) = splitter.finish() {
        sink.line(line).await;
    }
    tracing::trace!("diagnostic stream closed");
}

struct ProgressSink {
    tx: Option<mpsc::Sender<Progress>>,
    total: Duration,
    diagnostics: DiagnosticLog,
}

impl ProgressSink {
    async fn line(&mut self, line: String) {
        if let Some(progress) = parse_progress_line(&line, self.total) {
            if let Some(tx) = &self.tx {
                if tx.send(progress).await.is_err() {
                    tracing::debug!("progress receiver dropped; draining diagnostics only");
                    self.tx = None;
                }
            }
        } else if !line.trim().is_empty() {
            tracing::trace!(line = %line, "ffmpeg");
            self.diagnostics.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    const STATUS: &str =
        "frame=  120 fps= 30 q=28.0 size=    512kB time=00:00:04.00 bitrate= 1048.6kbits/s speed=1.2x";

    fn lines(splitter: &mut LineSplitter) -> Vec<String> {
        std::iter::from_fn(|| splitter.next_line()).collect()
    }

    #[test]
    fn parses_status_line() {
        let p = parse_progress_line(STATUS, Duration::from_secs(40)).unwrap();
        assert_eq!(p.frames_processed, "120");
        assert_eq!(p.current_time, "00:00:04.00");
        assert_eq!(p.current_bitrate, "1048.6kbits/s");
        assert_eq!(p.speed, "1.2x");
        assert!((p.percent.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn percent_against_descriptor_duration() {
        let line = "frame=100 time=00:00:10.00 bitrate=500kbits/s speed=1.0x";
        let p = parse_progress_line(line, Duration::from_secs(100)).unwrap();
        assert!((p.percent.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(p.frames_processed, "100");
        assert_eq!(p.current_bitrate, "500kbits/s");
    }

    #[test]
    fn unknown_duration_leaves_percent_unset() {
        let p = parse_progress_line(STATUS, Duration::ZERO).unwrap();
        assert_eq!(p.percent, None);
        assert_eq!(p.frames_processed, "120");
    }

    #[test]
    fn requires_all_three_markers() {
        assert!(parse_progress_line("frame=1 time=00:00:01.00 speed=1x", Duration::ZERO).is_none());
        assert!(parse_progress_line("frame=1 bitrate=1k", Duration::ZERO).is_none());
        assert!(parse_progress_line("Stream #0:0: Video: h264", Duration::ZERO).is_none());
        assert!(parse_progress_line("", Duration::ZERO).is_none());
    }

    #[test]
    fn odd_tokens_are_ignored() {
        let line = "frame=5 time=00:00:01.00 bitrate=N/A Lsize=  1kB a=b=c speed=N/A";
        let p = parse_progress_line(line, Duration::from_secs(10)).unwrap();
        assert_eq!(p.current_bitrate, "N/A");
        assert_eq!(p.speed, "N/A");
        assert!((p.percent.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn splitter_handles_mixed_endings() {
        let mut s = LineSplitter::new();
        s.push(b"one\rtwo\nthree\r\nfour");
        assert_eq!(lines(&mut s), ["one", "two", "three", ""]);
        assert_eq!(s.finish().as_deref(), Some("four"));
        assert_eq!(s.finish(), None);
    }

    #[test]
    fn splitter_keeps_partial_lines() {
        let mut s = LineSplitter::new();
        s.push(b"frame=  1 ti");
        assert!(s.next_line().is_none());
        s.push(b"me=00:00:00.04 bitrate=1k\r");
        assert_eq!(s.next_line().as_deref(), Some("frame=  1 time=00:00:00.04 bitrate=1k"));
        assert!(s.next_line().is_none());
    }

    #[test]
    fn splitter_flushes_overlong_lines() {
        let mut s = LineSplitter::new();
        s.push(&vec![b'x'; MAX_LINE_LEN + 10]);
        assert_eq!(s.next_line().map(|l| l.len()), Some(MAX_LINE_LEN + 10));
        assert!(s.next_line().is_none());
    }

    #[test]
    fn diagnostic_log_keeps_tail() {
        let log = DiagnosticLog::new();
        assert!(log.is_empty());
        for i in 0..(DIAGNOSTIC_TAIL_LINES + 5) {
            log.push(format!("line {i}"));
        }
        let text = log.snapshot();
        assert!(!text.contains("line 4\n"));
        assert!(text.starts_with("line 5\n"));
        assert!(text.ends_with(&format!("line {}", DIAGNOSTIC_TAIL_LINES + 4)));
    }

    #[tokio::test]
    async fn sentinel_yields_one_empty_snapshot() {
        let items: Vec<Progress> = ProgressStream::sentinel().collect().await;
        assert_eq!(items, vec![Progress::default()]);
        assert!(ProgressStream::closed().next().await.is_none());
    }

    #[tokio::test]
    async fn reader_publishes_and_logs() {
        let input = format!(
            "Input #0, mov\nStream mapping:\n{STATUS}\r{}\rwarning: late\n{STATUS}",
            "frame=  240 fps= 30 q=28.0 size=1024kB time=00:00:08.00 bitrate=1048.6kbits/s speed=1.2x"
        );
        let diagnostics = DiagnosticLog::new();
        let (stream, task) = spawn_progress_reader(
            std::io::Cursor::new(input.into_bytes()),
            Duration::from_secs(40),
            2,
            diagnostics.clone(),
        );

        let items: Vec<Progress> = stream.collect().await;
        task.await.unwrap();

        let frames: Vec<&str> = items.iter().map(|p| p.frames_processed.as_str()).collect();
        assert_eq!(frames, ["120", "240", "120"]);
        assert!((items[1].percent.unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(diagnostics.snapshot(), "Input #0, mov\nStream mapping:\nwarning: late");
    }

    #[tokio::test]
    async fn reader_survives_dropped_receiver() {
        let input = format!("{STATUS}\r").repeat(50) + "fatal: boom\n";
        let diagnostics = DiagnosticLog::new();
        let (stream, task) = spawn_progress_reader(
            std::io::Cursor::new(input.into_bytes()),
            Duration::ZERO,
            1,
            diagnostics.clone(),
        );
        drop(stream);
        task.await.unwrap();
        assert_eq!(diagnostics.snapshot(), "fatal: boom");
    }
}
