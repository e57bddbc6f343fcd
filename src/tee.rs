//! Copy-while-reading decorator over an async byte source.

use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::io::{AsyncRead, ReadBuf};

/// A write to the sink failed. Carried inside the `io::Error` a failing read
/// returns, so callers can tell it apart from a failure of the source.
#[derive(Error, Debug)]
#[error("raw sink write failed: {0}")]
pub struct SinkError(#[source] pub io::Error);

impl SinkError {
    /// Whether `err` came from the sink rather than the source.
    pub fn is_sink(err: &io::Error) -> bool {
        err.get_ref().map_or(false, |inner| inner.is::<SinkError>())
    }

    /// The sink's own error if `err` came from the sink, otherwise `err`.
    pub fn unwrap_sink(err: io::Error) -> io::Error {
        if !Self::is_sink(&err) {
            return err;
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<SinkError>()) {
            Some(Ok(sink)) => sink.0,
            Some(Err(inner)) => io::Error::new(kind, inner),
            None => io::Error::from(kind),
        }
    }
}

/// Reads from `inner`, writing every byte read to `sink` before handing it on.
///
/// The sink sees exactly the bytes that were pulled from the source, in
/// order, including a trailing partial frame when the consumer stops early.
/// A failing sink fails the read with a [`SinkError`] inside the returned
/// `io::Error`.
pub struct TeeReader<R, W> {
    inner: R,
    sink: W,
}

impl<R, W> TeeReader<R, W> {
    pub fn new(inner: R, sink: W) -> Self {
        Self { inner, sink }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.inner, self.sink)
    }
}

impl<R, W> AsyncRead for TeeReader<R, W>
where
    R: AsyncRead + Unpin,
    W: Write + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let fresh = &buf.filled()[before..];
                if !fresh.is_empty() {
                    if let Err(e) = this.sink.write_all(fresh) {
                        return Poll::Ready(Err(io::Error::new(e.kind(), SinkError(e))));
                    }
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
