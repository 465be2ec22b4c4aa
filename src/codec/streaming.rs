//! Incremental reading over a possibly-incomplete buffer
// (c) 2025 Ross Younger
//!
//! Every primitive here returns a three-valued outcome: a decoded value, a
//! request for more bytes, or a hard error. On [`Outcome::NeedMore`] no
//! state has changed: the caller appends bytes to the buffer (the existing
//! prefix must be kept intact), reconstructs a [`StreamingReader`] at the
//! returned position, and replays the same call. Operations are therefore
//! idempotent and restartable.
//!
//! Structure skipping is incremental: its progress lives in an explicit
//! [`SkipState`] that survives replays, so a large structure can be skipped
//! across many fetches without rescanning from the beginning.

use super::format::TokenKind;
use super::reader::Reader;
use super::timestamp::Timestamp;
use crate::error::{Error, ErrorKind, Result};

/// The result of a streaming read that did not hard-fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome<T> {
    /// The operation completed and the cursor advanced past it
    Complete(T),
    /// More bytes are required. The payload is the buffer position at
    /// which the caller should resume once bytes are available.
    NeedMore(usize),
}

impl<T> Outcome<T> {
    /// Unwraps a `Complete` outcome, for callers that know the buffer is whole
    pub fn expect_complete(self) -> Result<T> {
        match self {
            Outcome::Complete(v) => Ok(v),
            Outcome::NeedMore(pos) => Err(Error::end_of_stream(pos)),
        }
    }
}

/// Persistent progress of an incremental structure skip
#[derive(Clone, Copy, Debug)]
pub struct SkipState {
    pending: u64,
}

impl Default for SkipState {
    fn default() -> Self {
        Self { pending: 1 }
    }
}

impl SkipState {
    /// Begins the skip of one structure
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// An incremental reader over a buffer that may be missing its tail.
#[derive(Debug)]
pub struct StreamingReader<'de> {
    inner: Reader<'de>,
}

impl<'de> StreamingReader<'de> {
    /// Creates a streaming reader at the start of `buf`
    #[must_use]
    pub fn new(buf: &'de [u8]) -> Self {
        Self {
            inner: Reader::new(buf),
        }
    }

    /// Reconstructs a streaming reader over a grown buffer, resuming at
    /// the position a previous `NeedMore` reported
    #[must_use]
    pub fn resume(buf: &'de [u8], position: usize) -> Self {
        Self {
            inner: Reader::at_position(buf, position),
        }
    }

    /// Current committed position
    #[must_use]
    pub fn position(&self) -> usize {
        self.inner.position()
    }

    /// Runs one sync-reader operation transactionally: on success the
    /// cursor commits; on truncation nothing changes and `NeedMore`
    /// reports the replay position.
    fn attempt<T>(
        &mut self,
        op: impl FnOnce(&mut Reader<'de>) -> Result<T>,
    ) -> Result<Outcome<T>> {
        let start = self.inner.position();
        let mut probe = self.inner.clone();
        match op(&mut probe) {
            Ok(value) => {
                self.inner = probe;
                Ok(Outcome::Complete(value))
            }
            Err(e) if e.kind() == ErrorKind::EndOfStream => Ok(Outcome::NeedMore(start)),
            Err(e) => Err(e),
        }
    }

    /// Streaming counterpart of [`Reader::peek_kind`]
    pub fn try_peek_kind(&mut self) -> Result<Outcome<TokenKind>> {
        self.attempt(|r| r.peek_kind())
    }

    /// Streaming counterpart of [`Reader::try_read_nil`]
    pub fn try_read_nil(&mut self) -> Result<Outcome<bool>> {
        self.attempt(Reader::try_read_nil)
    }

    /// Streaming counterpart of [`Reader::read_bool`]
    pub fn try_read_bool(&mut self) -> Result<Outcome<bool>> {
        self.attempt(Reader::read_bool)
    }

    /// Streaming counterpart of [`Reader::read_u64`]
    pub fn try_read_u64(&mut self) -> Result<Outcome<u64>> {
        self.attempt(Reader::read_u64)
    }

    /// Streaming counterpart of [`Reader::read_i64`]
    pub fn try_read_i64(&mut self) -> Result<Outcome<i64>> {
        self.attempt(Reader::read_i64)
    }

    /// Streaming counterpart of [`Reader::read_f64`]
    pub fn try_read_f64(&mut self) -> Result<Outcome<f64>> {
        self.attempt(Reader::read_f64)
    }

    /// Streaming counterpart of [`Reader::read_str`]. The returned slice
    /// borrows the current buffer; replays against a grown buffer return a
    /// fresh slice.
    pub fn try_read_str(&mut self) -> Result<Outcome<&'de str>> {
        self.attempt(Reader::read_str)
    }

    /// Streaming counterpart of [`Reader::read_bin`]
    pub fn try_read_bin(&mut self) -> Result<Outcome<&'de [u8]>> {
        self.attempt(Reader::read_bin)
    }

    /// Streaming counterpart of [`Reader::read_array_header`]
    pub fn try_read_array_header(&mut self) -> Result<Outcome<usize>> {
        self.attempt(Reader::read_array_header)
    }

    /// Streaming counterpart of [`Reader::read_map_header`]
    pub fn try_read_map_header(&mut self) -> Result<Outcome<usize>> {
        self.attempt(Reader::read_map_header)
    }

    /// Streaming counterpart of [`Reader::read_timestamp`]
    pub fn try_read_timestamp(&mut self) -> Result<Outcome<Timestamp>> {
        self.attempt(Reader::read_timestamp)
    }

    /// Incrementally skips one structure.
    ///
    /// Progress is recorded in `state` and by advancing the cursor, one
    /// whole token at a time; a `NeedMore` can be replayed after more
    /// bytes arrive without revisiting already-skipped tokens.
    pub fn try_skip(&mut self, state: &mut SkipState) -> Result<Outcome<()>> {
        while state.pending > 0 {
            let outcome = self.attempt(|r| {
                let before = r.position();
                let kind = r.peek_kind()?;
                let grew = match kind {
                    TokenKind::Array => {
                        let n = r.read_array_header()?;
                        n as u64
                    }
                    TokenKind::Map => {
                        let n = r.read_map_header()?;
                        2 * n as u64
                    }
                    _ => {
                        r.skip_structure()?;
                        0
                    }
                };
                debug_assert!(r.position() > before);
                Ok(grew)
            })?;
            match outcome {
                Outcome::Complete(grew) => {
                    state.pending = state.pending - 1 + grew;
                }
                Outcome::NeedMore(pos) => return Ok(Outcome::NeedMore(pos)),
            }
        }
        Ok(Outcome::Complete(()))
    }
}

#[cfg(test)]
mod tests {
    use super::{Outcome, SkipState, StreamingReader};
    use crate::codec::Writer;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn encoded() -> Vec<u8> {
        let mut w = Writer::new();
        w.write_map_header(2).unwrap();
        w.write_str("name").unwrap();
        w.write_str("Lightning").unwrap();
        w.write_str("speed").unwrap();
        w.write_uint(45);
        w.into_vec()
    }

    #[test]
    fn complete_buffer_reads_in_one_pass() {
        let buf = encoded();
        let mut sr = StreamingReader::new(&buf);
        assert_eq!(sr.try_read_map_header().unwrap(), Outcome::Complete(2));
        assert_eq!(sr.try_read_str().unwrap(), Outcome::Complete("name"));
    }

    #[test]
    fn need_more_is_replayable_at_every_split() {
        let buf = encoded();
        // Feed the buffer one byte at a time; every primitive must either
        // complete or request more without moving the cursor.
        for split in 0..buf.len() {
            let partial = &buf[..split];
            let mut sr = StreamingReader::new(partial);
            let mut state = SkipState::new();
            match sr.try_skip(&mut state).unwrap() {
                Outcome::Complete(()) => panic!("cannot complete with {split} bytes"),
                Outcome::NeedMore(pos) => assert!(pos <= split),
            }
        }
        // And with the whole buffer the same skip completes.
        let mut sr = StreamingReader::new(&buf);
        let mut state = SkipState::new();
        assert_eq!(sr.try_skip(&mut state).unwrap(), Outcome::Complete(()));
        assert_eq!(sr.position(), buf.len());
    }

    #[test]
    fn skip_state_survives_resume() {
        let buf = encoded();
        let mut state = SkipState::new();
        let mut pos = 0;
        let mut grown = 1;
        // Grow the visible buffer a few bytes at a time, resuming each round.
        while grown <= buf.len() {
            let mut sr = StreamingReader::resume(&buf[..grown], pos);
            match sr.try_skip(&mut state).unwrap() {
                Outcome::Complete(()) => {
                    assert_eq!(sr.position(), buf.len());
                    return;
                }
                Outcome::NeedMore(p) => {
                    pos = p;
                    grown += 3;
                }
            }
        }
        let mut sr = StreamingReader::resume(&buf, pos);
        assert_eq!(sr.try_skip(&mut state).unwrap(), Outcome::Complete(()));
        assert_eq!(sr.position(), buf.len());
    }

    #[test]
    fn grammar_errors_are_not_need_more() {
        let buf = [0xc1];
        let mut sr = StreamingReader::new(&buf);
        let err = sr.try_peek_kind().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn expect_complete_maps_need_more_to_end_of_stream() {
        let out: Outcome<u8> = Outcome::NeedMore(7);
        assert_eq!(
            out.expect_complete().unwrap_err().kind(),
            ErrorKind::EndOfStream
        );
        assert_eq!(Outcome::Complete(9u8).expect_complete().unwrap(), 9);
    }
}
