//! Asynchronous byte source feeding the synchronous reader
// (c) 2025 Ross Younger
//!
//! [`AsyncSource`] prefetches from an async byte stream into a reusable
//! scratch buffer. Once the incremental skip protocol proves that one whole
//! structure is buffered, a synchronous [`Reader`](super::Reader) is handed
//! to the converter over exactly those bytes and its final position is
//! committed back. Synchronous converters thus work unmodified in async
//! mode; suspension happens only while waiting for bytes.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use super::streaming::{Outcome, SkipState, StreamingReader};
use crate::error::{Error, Result};

/// An async byte pipe wrapped with prefetch buffering.
#[derive(Debug)]
pub struct AsyncSource<R> {
    inner: R,
    buf: BytesMut,
    prefetch_hint: usize,
}

impl<R: AsyncRead + Unpin> AsyncSource<R> {
    /// Wraps `inner`, prefetching up to `prefetch_hint` bytes at a time.
    ///
    /// A single structure larger than the hint is still buffered in full:
    /// the converter graph is synchronous at that boundary. The overshoot
    /// is reported through the diagnostic channel.
    #[must_use]
    pub fn new(inner: R, prefetch_hint: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(prefetch_hint.min(64 * 1024).max(64)),
            prefetch_hint,
        }
    }

    /// The bytes currently buffered
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Discards `n` buffered bytes, committing a reader's final position
    pub fn consume(&mut self, n: usize) {
        self.buf.advance(n);
    }

    /// Pulls at least one more byte from the pipe into the buffer.
    /// A pipe-level failure or a clean EOF mid-structure both surface as
    /// `EndOfStream`.
    async fn fetch_some(&mut self) -> Result<()> {
        let n = self
            .inner
            .read_buf(&mut self.buf)
            .await
            .map_err(|e| Error::new(crate::error::ErrorKind::EndOfStream, format!("read failed: {e}")))?;
        if n == 0 {
            return Err(Error::end_of_stream(self.buf.len()));
        }
        Ok(())
    }

    /// Ensures one complete structure is buffered; returns its length.
    ///
    /// Boundary detection runs the incremental skip protocol over the
    /// buffered prefix, fetching on every `NeedMore` until it completes.
    /// The cancellation signal is probed before each fetch.
    pub async fn buffer_structure(&mut self, cancel: &CancellationToken) -> Result<usize> {
        let mut state = SkipState::new();
        let mut pos = 0usize;
        loop {
            let mut sr = StreamingReader::resume(&self.buf, pos);
            match sr.try_skip(&mut state)? {
                Outcome::Complete(()) => return Ok(sr.position()),
                Outcome::NeedMore(p) => {
                    pos = p;
                    if cancel.is_cancelled() {
                        return Err(Error::cancelled());
                    }
                    if self.buf.len() >= self.prefetch_hint {
                        tracing::debug!(
                            buffered = self.buf.len(),
                            hint = self.prefetch_hint,
                            "structure exceeds the async buffer hint; buffering in full"
                        );
                    }
                    self.fetch_some().await?;
                }
            }
        }
    }

    /// True if the pipe may still hold another structure: either bytes are
    /// already buffered, or one more fetch succeeds. A clean EOF between
    /// structures returns false.
    pub async fn has_more(&mut self) -> Result<bool> {
        if !self.buf.is_empty() {
            return Ok(true);
        }
        match self.inner.read_buf(&mut self.buf).await {
            Ok(0) => Ok(false),
            Ok(_) => Ok(true),
            Err(e) => Err(Error::new(
                crate::error::ErrorKind::EndOfStream,
                format!("read failed: {e}"),
            )),
        }
    }
}
