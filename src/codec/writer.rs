//! Push-style MessagePack writer
// (c) 2025 Ross Younger
//!
//! The writer appends tokens to a growable buffer, always choosing the
//! shortest valid encoding for the value at hand (3 becomes a positive
//! fixint, 200 becomes a uint8, and so on). Converters receive the writer
//! by `&mut` borrow and never store it; the facade owns the buffer and
//! decides how it reaches the sink.

use bytes::{BufMut, Bytes, BytesMut};

use super::format::{marker, FIXCOLLECTION_LIMIT, FIXSTR_LIMIT, TIMESTAMP_EXT_CODE};
use super::timestamp::Timestamp;
use crate::error::{Error, Result};

/// A push-style writer over an owned, growable byte buffer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    /// Creates an empty writer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with pre-reserved capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far
    #[must_use]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// The bytes written so far
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer, returning its buffer
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Consumes the writer, returning its buffer as a plain vector
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    /// Splits off everything written so far, leaving the writer empty.
    /// The async flush path drains the buffer through this.
    pub(crate) fn take_chunk(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Writes `nil`
    pub fn write_nil(&mut self) {
        self.buf.put_u8(marker::NIL);
    }

    /// Writes a boolean
    pub fn write_bool(&mut self, value: bool) {
        self.buf
            .put_u8(if value { marker::TRUE } else { marker::FALSE });
    }

    /// Writes an unsigned integer in its shortest encoding
    pub fn write_uint(&mut self, value: u64) {
        if value <= u64::from(marker::POS_FIXINT_MAX) {
            self.buf.put_u8(value as u8);
        } else if value <= u64::from(u8::MAX) {
            self.buf.put_u8(marker::UINT8);
            self.buf.put_u8(value as u8);
        } else if value <= u64::from(u16::MAX) {
            self.buf.put_u8(marker::UINT16);
            self.buf.put_u16(value as u16);
        } else if value <= u64::from(u32::MAX) {
            self.buf.put_u8(marker::UINT32);
            self.buf.put_u32(value as u32);
        } else {
            self.buf.put_u8(marker::UINT64);
            self.buf.put_u64(value);
        }
    }

    /// Writes a signed integer in its shortest encoding.
    /// Non-negative values take the unsigned encodings.
    pub fn write_int(&mut self, value: i64) {
        if value >= 0 {
            self.write_uint(value as u64);
        } else if value >= -32 {
            self.buf.put_i8(value as i8);
        } else if value >= i64::from(i8::MIN) {
            self.buf.put_u8(marker::INT8);
            self.buf.put_i8(value as i8);
        } else if value >= i64::from(i16::MIN) {
            self.buf.put_u8(marker::INT16);
            self.buf.put_i16(value as i16);
        } else if value >= i64::from(i32::MIN) {
            self.buf.put_u8(marker::INT32);
            self.buf.put_i32(value as i32);
        } else {
            self.buf.put_u8(marker::INT64);
            self.buf.put_i64(value);
        }
    }

    /// Writes a float32
    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_u8(marker::FLOAT32);
        self.buf.put_f32(value);
    }

    /// Writes a float64
    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_u8(marker::FLOAT64);
        self.buf.put_f64(value);
    }

    /// Writes a UTF-8 string, choosing fixstr/str8/str16/str32 by length
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        match bytes.len() {
            n if n <= FIXSTR_LIMIT => {
                self.buf.put_u8(marker::FIXSTR_BASE | (n as u8));
            }
            n if n <= usize::from(u8::MAX) => {
                self.buf.put_u8(marker::STR8);
                self.buf.put_u8(n as u8);
            }
            n if n <= usize::from(u16::MAX) => {
                self.buf.put_u8(marker::STR16);
                self.buf.put_u16(n as u16);
            }
            n => {
                let n = u32::try_from(n).map_err(|_| {
                    Error::invalid_operation("string exceeds the str32 length limit")
                })?;
                self.buf.put_u8(marker::STR32);
                self.buf.put_u32(n);
            }
        }
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Writes a binary blob, choosing bin8/bin16/bin32 by length
    pub fn write_bin(&mut self, value: &[u8]) -> Result<()> {
        match value.len() {
            n if n <= usize::from(u8::MAX) => {
                self.buf.put_u8(marker::BIN8);
                self.buf.put_u8(n as u8);
            }
            n if n <= usize::from(u16::MAX) => {
                self.buf.put_u8(marker::BIN16);
                self.buf.put_u16(n as u16);
            }
            n => {
                let n = u32::try_from(n)
                    .map_err(|_| Error::invalid_operation("blob exceeds the bin32 length limit"))?;
                self.buf.put_u8(marker::BIN32);
                self.buf.put_u32(n);
            }
        }
        self.buf.put_slice(value);
        Ok(())
    }

    /// Begins an array of `len` elements. The caller must then write
    /// exactly `len` structures.
    pub fn write_array_header(&mut self, len: usize) -> Result<()> {
        match len {
            n if n <= FIXCOLLECTION_LIMIT => {
                self.buf.put_u8(marker::FIXARRAY_BASE | (n as u8));
            }
            n if n <= usize::from(u16::MAX) => {
                self.buf.put_u8(marker::ARRAY16);
                self.buf.put_u16(n as u16);
            }
            n => {
                let n = u32::try_from(n).map_err(|_| {
                    Error::invalid_operation("array exceeds the array32 length limit")
                })?;
                self.buf.put_u8(marker::ARRAY32);
                self.buf.put_u32(n);
            }
        }
        Ok(())
    }

    /// Begins a map of `len` key/value pairs. The caller must then write
    /// exactly `2 * len` structures.
    pub fn write_map_header(&mut self, len: usize) -> Result<()> {
        match len {
            n if n <= FIXCOLLECTION_LIMIT => {
                self.buf.put_u8(marker::FIXMAP_BASE | (n as u8));
            }
            n if n <= usize::from(u16::MAX) => {
                self.buf.put_u8(marker::MAP16);
                self.buf.put_u16(n as u16);
            }
            n => {
                let n = u32::try_from(n)
                    .map_err(|_| Error::invalid_operation("map exceeds the map32 length limit"))?;
                self.buf.put_u8(marker::MAP32);
                self.buf.put_u32(n);
            }
        }
        Ok(())
    }

    /// Writes an extension structure: type code, length framing and body.
    /// fixext encodings are used for the 1/2/4/8/16-byte body lengths.
    pub fn write_ext(&mut self, code: i8, body: &[u8]) -> Result<()> {
        match body.len() {
            1 => self.buf.put_u8(marker::FIXEXT1),
            2 => self.buf.put_u8(marker::FIXEXT2),
            4 => self.buf.put_u8(marker::FIXEXT4),
            8 => self.buf.put_u8(marker::FIXEXT8),
            16 => self.buf.put_u8(marker::FIXEXT16),
            n if n <= usize::from(u8::MAX) => {
                self.buf.put_u8(marker::EXT8);
                self.buf.put_u8(n as u8);
            }
            n if n <= usize::from(u16::MAX) => {
                self.buf.put_u8(marker::EXT16);
                self.buf.put_u16(n as u16);
            }
            n => {
                let n = u32::try_from(n).map_err(|_| {
                    Error::invalid_operation("extension exceeds the ext32 length limit")
                })?;
                self.buf.put_u8(marker::EXT32);
                self.buf.put_u32(n);
            }
        }
        self.buf.put_i8(code);
        self.buf.put_slice(body);
        Ok(())
    }

    /// Writes the standard timestamp extension (type -1), choosing the
    /// smallest of its three encodings that can represent `ts`
    pub fn write_timestamp(&mut self, ts: Timestamp) -> Result<()> {
        let seconds = ts.seconds();
        let nanos = ts.nanos();
        if seconds >= 0 && (seconds >> 34) == 0 {
            if nanos == 0 && u64::try_from(seconds).is_ok_and(|s| s <= u64::from(u32::MAX)) {
                self.write_ext(TIMESTAMP_EXT_CODE, &(seconds as u32).to_be_bytes())
            } else {
                let packed = (u64::from(nanos) << 34) | (seconds as u64);
                self.write_ext(TIMESTAMP_EXT_CODE, &packed.to_be_bytes())
            }
        } else {
            let mut body = [0u8; 12];
            body[..4].copy_from_slice(&nanos.to_be_bytes());
            body[4..].copy_from_slice(&seconds.to_be_bytes());
            self.write_ext(TIMESTAMP_EXT_CODE, &body)
        }
    }

    /// Appends pre-encoded bytes verbatim.
    ///
    /// The bytes must form whole MessagePack structures; this is the fast
    /// path for pre-formatted property names and retained unused data.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn written(f: impl FnOnce(&mut Writer)) -> Vec<u8> {
        let mut w = Writer::new();
        f(&mut w);
        w.into_vec()
    }

    #[rstest]
    #[case(0, &[0x00])]
    #[case(3, &[0x03])]
    #[case(127, &[0x7f])]
    #[case(128, &[0xcc, 0x80])]
    #[case(200, &[0xcc, 0xc8])]
    #[case(255, &[0xcc, 0xff])]
    #[case(256, &[0xcd, 0x01, 0x00])]
    #[case(65535, &[0xcd, 0xff, 0xff])]
    #[case(65536, &[0xce, 0x00, 0x01, 0x00, 0x00])]
    #[case(u64::from(u32::MAX), &[0xce, 0xff, 0xff, 0xff, 0xff])]
    #[case(u64::from(u32::MAX) + 1, &[0xcf, 0, 0, 0, 1, 0, 0, 0, 0])]
    fn uint_boundaries(#[case] value: u64, #[case] expect: &[u8]) {
        assert_eq!(written(|w| w.write_uint(value)), expect);
    }

    #[rstest]
    #[case(-1, &[0xff])]
    #[case(-32, &[0xe0])]
    #[case(-33, &[0xd0, 0xdf])]
    #[case(-128, &[0xd0, 0x80])]
    #[case(-129, &[0xd1, 0xff, 0x7f])]
    #[case(-32768, &[0xd1, 0x80, 0x00])]
    #[case(-32769, &[0xd2, 0xff, 0xff, 0x7f, 0xff])]
    #[case(i64::from(i32::MIN), &[0xd2, 0x80, 0, 0, 0])]
    #[case(i64::from(i32::MIN) - 1, &[0xd3, 0xff, 0xff, 0xff, 0xff, 0x7f, 0xff, 0xff, 0xff])]
    #[case(42, &[0x2a])]
    fn int_boundaries(#[case] value: i64, #[case] expect: &[u8]) {
        assert_eq!(written(|w| w.write_int(value)), expect);
    }

    #[test]
    fn strings_choose_length_class() {
        let out = written(|w| w.write_str("hi").unwrap());
        assert_eq!(out, [0xa2, b'h', b'i']);

        let thirty_two = "x".repeat(32);
        let out = written(|w| w.write_str(&thirty_two).unwrap());
        assert_eq!(out[..2], [0xd9, 32]);

        let long = "y".repeat(256);
        let out = written(|w| w.write_str(&long).unwrap());
        assert_eq!(out[..3], [0xda, 0x01, 0x00]);
    }

    #[test]
    fn collection_headers() {
        assert_eq!(written(|w| w.write_array_header(2).unwrap()), [0x92]);
        assert_eq!(
            written(|w| w.write_array_header(16).unwrap()),
            [0xdc, 0x00, 0x10]
        );
        assert_eq!(written(|w| w.write_map_header(0).unwrap()), [0x80]);
        assert_eq!(
            written(|w| w.write_map_header(70000).unwrap()),
            [0xdf, 0x00, 0x01, 0x11, 0x70]
        );
    }

    #[test]
    fn ext_length_classes() {
        assert_eq!(written(|w| w.write_ext(5, &[9]).unwrap()), [0xd4, 5, 9]);
        assert_eq!(
            written(|w| w.write_ext(5, &[1, 2, 3]).unwrap()),
            [0xc7, 3, 5, 1, 2, 3]
        );
        let out = written(|w| w.write_ext(5, &[0; 16]).unwrap());
        assert_eq!(out[..2], [0xd8, 5]);
    }

    #[test]
    fn floats() {
        assert_eq!(
            written(|w| w.write_f32(1.0)),
            [0xca, 0x3f, 0x80, 0x00, 0x00]
        );
        assert_eq!(written(|w| w.write_f64(1.0))[..3], [0xcb, 0x3f, 0xf0]);
    }

    #[test]
    fn take_chunk_drains() {
        let mut w = Writer::new();
        w.write_uint(1);
        let chunk = w.take_chunk();
        assert_eq!(chunk.as_ref(), [0x01]);
        assert_eq!(w.position(), 0);
    }
}
