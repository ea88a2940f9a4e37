//! In-memory pipes standing in for file paths.
//!
//! Each pipe is a [`tokio::io::duplex`] pair. The caller keeps one half as a
//! [`PipeWriter`] or [`PipeReader`]; the session keeps the other and, once the
//! encoder is running, copies between it and the child's stdin/stdout.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::task::JoinHandle;

/// Buffer size of each in-memory pipe.
const PIPE_BUFFER: usize = 64 * 1024;

/// Write end of an input pipe; bytes written here become the encoder's input.
///
/// Shut it down (or drop it) to signal end of input. Once the transcode has
/// finished, writes fail with [`io::ErrorKind::BrokenPipe`].
#[derive(Debug)]
pub struct PipeWriter(DuplexStream);

/// Read end of an output pipe carrying the encoder's output.
///
/// Reaches end-of-stream once the transcode has finished. Must be read
/// concurrently with waiting for completion.
#[derive(Debug)]
pub struct PipeReader(DuplexStream);

/// Create an input pipe: the caller's writer and the session's read side.
pub(crate) fn input_pipe() -> (PipeWriter, DuplexStream) {
    let (caller, session) = tokio::io::duplex(PIPE_BUFFER);
    (PipeWriter(caller), session)
}

/// Create an output pipe: the caller's reader and the session's write side.
pub(crate) fn output_pipe() -> (PipeReader, DuplexStream) {
    let (caller, session) = tokio::io::duplex(PIPE_BUFFER);
    (PipeReader(caller), session)
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

/// Copy tasks between the session's pipe halves and the child.
#[derive(Debug, Default)]
pub(crate) struct PipeTasks {
    feeder: Option<JoinHandle<()>>,
    drain: Option<JoinHandle<()>>,
}

impl PipeTasks {
    /// Start copying `source` into the child's stdin.
    pub(crate) fn feed(&mut self, mut source: DuplexStream, mut stdin: ChildStdin) {
        self.feeder = Some(tokio::spawn(async move {
            match tokio::io::copy(&mut source, &mut stdin).await {
                Ok(n) => tracing::debug!(bytes = n, "input pipe reached end of stream"),
                Err(e) => tracing::debug!(error = %e, "input pipe copy stopped"),
            }
            // Dropping stdin delivers EOF to the encoder.
        }));
    }

    /// Start copying the child's stdout into `sink`.
    pub(crate) fn drain(&mut self, mut stdout: ChildStdout, mut sink: DuplexStream) {
        self.drain = Some(tokio::spawn(async move {
            match tokio::io::copy(&mut stdout, &mut sink).await {
                Ok(n) => tracing::debug!(bytes = n, "output pipe drained"),
                Err(e) => tracing::debug!(error = %e, "output pipe copy stopped"),
            }
            let _ = sink.shutdown().await;
        }));
    }

    /// Close both session-side halves. Safe to call more than once.
    ///
    /// The drain runs to completion so no output is lost; the feeder is
    /// aborted since the encoder no longer reads.
    pub(crate) async fn close(&mut self) {
        if let Some(drain) = self.drain.take() {
            let _ = drain.await;
        }
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
            let _ = feeder.await;
        }
    }
}
