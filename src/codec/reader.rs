//! Pull-style MessagePack reader over a contiguous buffer
// (c) 2025 Ross Younger
//!
//! Every read consumes exactly one structure (or, for the header variants,
//! exactly one length header). Integer reads are magnitude-checked against
//! the requested target and fail with `Overflow` rather than truncate;
//! float64 reads widen a float32 token. Cloning the reader yields a cheap
//! *peek reader* sharing the buffer, which may be discarded without
//! committing any position change.

use super::format::{marker, TokenKind, TIMESTAMP_EXT_CODE};
use super::timestamp::{self, Timestamp};
use crate::error::{Error, Result};

/// A pull-style reader with random access over a byte buffer.
#[derive(Clone, Debug)]
pub struct Reader<'de> {
    buf: &'de [u8],
    pos: usize,
}

/// An integer token's value, preserving signedness
#[derive(Clone, Copy, Debug)]
pub(crate) enum IntValue {
    /// Non-negative, from any unsigned encoding or non-negative signed one
    Unsigned(u64),
    /// Strictly negative
    Signed(i64),
}

impl<'de> Reader<'de> {
    /// Creates a reader over `buf`, positioned at its start
    #[must_use]
    pub fn new(buf: &'de [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Creates a reader over `buf` positioned at `pos`, which must lie on
    /// a structure boundary. Used to resume incremental reads.
    #[must_use]
    pub(crate) fn at_position(buf: &'de [u8], pos: usize) -> Self {
        debug_assert!(pos <= buf.len());
        Self { buf, pos }
    }

    /// Current byte offset into the buffer
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes remaining
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True if at least one more byte is available
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.pos < self.buf.len()
    }

    /// The raw bytes between two previously observed positions.
    /// Used to retain unrecognized structures verbatim.
    pub(crate) fn slice_between(&self, start: usize, end: usize) -> &'de [u8] {
        &self.buf[start..end]
    }

    fn peek_u8(&self) -> Result<u8> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::end_of_stream(self.pos))
    }

    fn take_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'de [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::end_of_stream(self.buf.len()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(
            self.take(2)?.try_into().unwrap_or_default(),
        ))
    }

    fn take_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(
            self.take(4)?.try_into().unwrap_or_default(),
        ))
    }

    fn take_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(
            self.take(8)?.try_into().unwrap_or_default(),
        ))
    }

    /// Classifies the next token without advancing
    pub fn peek_kind(&self) -> Result<TokenKind> {
        let byte = self.peek_u8()?;
        TokenKind::classify(byte)
            .ok_or_else(|| Error::malformed(self.pos, "0xc1 never appears in well-formed data"))
    }

    /// If the next token is `nil`, consumes it and returns true; otherwise
    /// leaves the reader untouched and returns false
    pub fn try_read_nil(&mut self) -> Result<bool> {
        if self.peek_u8()? == marker::NIL {
            self.pos += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Reads a boolean token
    pub fn read_bool(&mut self) -> Result<bool> {
        let start = self.pos;
        match self.take_u8()? {
            marker::TRUE => Ok(true),
            marker::FALSE => Ok(false),
            _ => Err(Error::malformed(start, "expected a boolean")),
        }
    }

    /// Reads any integer token, preserving its signedness
    pub(crate) fn read_int_token(&mut self) -> Result<IntValue> {
        let start = self.pos;
        let byte = self.take_u8()?;
        Ok(match byte {
            0x00..=marker::POS_FIXINT_MAX => IntValue::Unsigned(u64::from(byte)),
            marker::NEG_FIXINT_BASE..=0xff => IntValue::Signed(i64::from(byte as i8)),
            marker::UINT8 => IntValue::Unsigned(u64::from(self.take_u8()?)),
            marker::UINT16 => IntValue::Unsigned(u64::from(self.take_u16()?)),
            marker::UINT32 => IntValue::Unsigned(u64::from(self.take_u32()?)),
            marker::UINT64 => IntValue::Unsigned(self.take_u64()?),
            marker::INT8 => Self::classify_signed(i64::from(self.take_u8()? as i8)),
            marker::INT16 => Self::classify_signed(i64::from(self.take_u16()? as i16)),
            marker::INT32 => Self::classify_signed(i64::from(self.take_u32()? as i32)),
            marker::INT64 => Self::classify_signed(self.take_u64()? as i64),
            _ => return Err(Error::malformed(start, "expected an integer")),
        })
    }

    fn classify_signed(v: i64) -> IntValue {
        if v >= 0 {
            IntValue::Unsigned(v as u64)
        } else {
            IntValue::Signed(v)
        }
    }

    /// Reads an unsigned 64-bit integer with range check
    pub fn read_u64(&mut self) -> Result<u64> {
        let start = self.pos;
        match self.read_int_token()? {
            IntValue::Unsigned(v) => Ok(v),
            IntValue::Signed(v) => Err(Error::overflow(
                start,
                format!("value {v} does not fit in an unsigned integer"),
            )),
        }
    }

    /// Reads a signed 64-bit integer with range check
    pub fn read_i64(&mut self) -> Result<i64> {
        let start = self.pos;
        match self.read_int_token()? {
            IntValue::Unsigned(v) => i64::try_from(v)
                .map_err(|_| Error::overflow(start, format!("value {v} does not fit in i64"))),
            IntValue::Signed(v) => Ok(v),
        }
    }

    /// Reads a float64; a float32 token is widened
    pub fn read_f64(&mut self) -> Result<f64> {
        let start = self.pos;
        match self.take_u8()? {
            marker::FLOAT64 => Ok(f64::from_bits(self.take_u64()?)),
            marker::FLOAT32 => Ok(f64::from(f32::from_bits(self.take_u32()?))),
            _ => Err(Error::malformed(start, "expected a float")),
        }
    }

    /// Reads a float32 token
    pub fn read_f32(&mut self) -> Result<f32> {
        let start = self.pos;
        match self.take_u8()? {
            marker::FLOAT32 => Ok(f32::from_bits(self.take_u32()?)),
            _ => Err(Error::malformed(start, "expected a float32")),
        }
    }

    /// Reads a string token as UTF-8 bytes
    pub fn read_str_bytes(&mut self) -> Result<&'de [u8]> {
        let start = self.pos;
        let len = match self.take_u8()? {
            b @ marker::FIXSTR_BASE..=marker::FIXSTR_MAX => {
                usize::from(b & !marker::FIXSTR_BASE)
            }
            marker::STR8 => usize::from(self.take_u8()?),
            marker::STR16 => usize::from(self.take_u16()?),
            marker::STR32 => self.take_u32()? as usize,
            _ => return Err(Error::malformed(start, "expected a string")),
        };
        self.take(len)
    }

    /// Reads a string token, validating UTF-8
    pub fn read_str(&mut self) -> Result<&'de str> {
        let start = self.pos;
        let bytes = self.read_str_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| Error::malformed(start, "string is not valid UTF-8"))
    }

    /// Reads a binary token
    pub fn read_bin(&mut self) -> Result<&'de [u8]> {
        let start = self.pos;
        let len = match self.take_u8()? {
            marker::BIN8 => usize::from(self.take_u8()?),
            marker::BIN16 => usize::from(self.take_u16()?),
            marker::BIN32 => self.take_u32()? as usize,
            _ => return Err(Error::malformed(start, "expected binary")),
        };
        self.take(len)
    }

    /// Reads an array header, returning the element count
    pub fn read_array_header(&mut self) -> Result<usize> {
        let start = self.pos;
        match self.take_u8()? {
            b @ marker::FIXARRAY_BASE..=marker::FIXARRAY_MAX => {
                Ok(usize::from(b & !marker::FIXARRAY_BASE))
            }
            marker::ARRAY16 => Ok(usize::from(self.take_u16()?)),
            marker::ARRAY32 => Ok(self.take_u32()? as usize),
            _ => Err(Error::malformed(start, "expected an array")),
        }
    }

    /// Reads a map header, returning the pair count
    pub fn read_map_header(&mut self) -> Result<usize> {
        let start = self.pos;
        match self.take_u8()? {
            b @ marker::FIXMAP_BASE..=marker::FIXMAP_MAX => {
                Ok(usize::from(b & !marker::FIXMAP_BASE))
            }
            marker::MAP16 => Ok(usize::from(self.take_u16()?)),
            marker::MAP32 => Ok(self.take_u32()? as usize),
            _ => Err(Error::malformed(start, "expected a map")),
        }
    }

    /// Reads an extension header, returning the type code and body length
    pub fn read_ext_header(&mut self) -> Result<(i8, usize)> {
        let start = self.pos;
        let len = match self.take_u8()? {
            marker::FIXEXT1 => 1,
            marker::FIXEXT2 => 2,
            marker::FIXEXT4 => 4,
            marker::FIXEXT8 => 8,
            marker::FIXEXT16 => 16,
            marker::EXT8 => usize::from(self.take_u8()?),
            marker::EXT16 => usize::from(self.take_u16()?),
            marker::EXT32 => self.take_u32()? as usize,
            _ => return Err(Error::malformed(start, "expected an extension")),
        };
        let code = self.take_u8()? as i8;
        Ok((code, len))
    }

    /// Reads a whole extension structure: type code plus body
    pub fn read_ext(&mut self) -> Result<(i8, &'de [u8])> {
        let (code, len) = self.read_ext_header()?;
        Ok((code, self.take(len)?))
    }

    /// Reads the standard timestamp extension in any of its three encodings
    pub fn read_timestamp(&mut self) -> Result<Timestamp> {
        let start = self.pos;
        let (code, body) = self.read_ext()?;
        if code != TIMESTAMP_EXT_CODE {
            return Err(Error::malformed(
                start,
                format!("expected a timestamp extension, found type {code}"),
            ));
        }
        timestamp::decode_body(body, start)
    }

    /// Skips exactly one structure, recursively consuming nested arrays
    /// and maps. Iterative, so adversarially deep input cannot overflow
    /// the stack.
    pub fn skip_structure(&mut self) -> Result<()> {
        let mut pending: u64 = 1;
        while pending > 0 {
            pending -= 1;
            let start = self.pos;
            let byte = self.take_u8()?;
            match byte {
                0x00..=marker::POS_FIXINT_MAX
                | marker::NEG_FIXINT_BASE..=0xff
                | marker::NIL
                | marker::FALSE
                | marker::TRUE => {}
                b @ marker::FIXSTR_BASE..=marker::FIXSTR_MAX => {
                    let _ = self.take(usize::from(b & !marker::FIXSTR_BASE))?;
                }
                b @ marker::FIXARRAY_BASE..=marker::FIXARRAY_MAX => {
                    pending += u64::from(b & !marker::FIXARRAY_BASE);
                }
                b @ marker::FIXMAP_BASE..=marker::FIXMAP_MAX => {
                    pending += 2 * u64::from(b & !marker::FIXMAP_BASE);
                }
                marker::UINT8 | marker::INT8 => {
                    let _ = self.take(1)?;
                }
                marker::UINT16 | marker::INT16 => {
                    let _ = self.take(2)?;
                }
                marker::UINT32 | marker::INT32 | marker::FLOAT32 => {
                    let _ = self.take(4)?;
                }
                marker::UINT64 | marker::INT64 | marker::FLOAT64 => {
                    let _ = self.take(8)?;
                }
                marker::STR8 | marker::BIN8 => {
                    let n = usize::from(self.take_u8()?);
                    let _ = self.take(n)?;
                }
                marker::STR16 | marker::BIN16 => {
                    let n = usize::from(self.take_u16()?);
                    let _ = self.take(n)?;
                }
                marker::STR32 | marker::BIN32 => {
                    let n = self.take_u32()? as usize;
                    let _ = self.take(n)?;
                }
                marker::ARRAY16 => pending += u64::from(self.take_u16()?),
                marker::ARRAY32 => pending += u64::from(self.take_u32()?),
                marker::MAP16 => pending += 2 * u64::from(self.take_u16()?),
                marker::MAP32 => pending += 2 * u64::from(self.take_u32()?),
                marker::FIXEXT1 => {
                    let _ = self.take(2)?;
                }
                marker::FIXEXT2 => {
                    let _ = self.take(3)?;
                }
                marker::FIXEXT4 => {
                    let _ = self.take(5)?;
                }
                marker::FIXEXT8 => {
                    let _ = self.take(9)?;
                }
                marker::FIXEXT16 => {
                    let _ = self.take(17)?;
                }
                marker::EXT8 => {
                    let n = usize::from(self.take_u8()?);
                    let _ = self.take(n + 1)?;
                }
                marker::EXT16 => {
                    let n = usize::from(self.take_u16()?);
                    let _ = self.take(n + 1)?;
                }
                marker::EXT32 => {
                    let n = self.take_u32()? as usize;
                    let _ = self.take(n + 1)?;
                }
                marker::NEVER_USED => {
                    return Err(Error::malformed(
                        start,
                        "0xc1 never appears in well-formed data",
                    ))
                }
            }
        }
        Ok(())
    }

    /// Skips one structure and returns its raw bytes
    pub fn read_raw_structure(&mut self) -> Result<&'de [u8]> {
        let start = self.pos;
        self.skip_structure()?;
        Ok(self.slice_between(start, self.pos))
    }
}

macro_rules! checked_int_read {
    ($($(#[$doc:meta])* $name:ident => $ty:ty),+ $(,)?) => {
        impl Reader<'_> {
            $(
                $(#[$doc])*
                pub fn $name(&mut self) -> Result<$ty> {
                    let start = self.pos;
                    let value = match self.read_int_token()? {
                        IntValue::Unsigned(v) => <$ty>::try_from(v).ok(),
                        IntValue::Signed(v) => <$ty>::try_from(v).ok(),
                    };
                    value.ok_or_else(|| {
                        Error::overflow(
                            start,
                            format!("integer does not fit in {}", stringify!($ty)),
                        )
                    })
                }
            )+
        }
    };
}

checked_int_read! {
    /// Reads an integer token that must fit in `u8`
    read_u8 => u8,
    /// Reads an integer token that must fit in `u16`
    read_u16 => u16,
    /// Reads an integer token that must fit in `u32`
    read_u32 => u32,
    /// Reads an integer token that must fit in `i8`
    read_i8 => i8,
    /// Reads an integer token that must fit in `i16`
    read_i16 => i16,
    /// Reads an integer token that must fit in `i32`
    read_i32 => i32,
}

#[cfg(test)]
mod tests {
    use super::Reader;
    use crate::codec::Writer;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn fixint_reads_at_any_width() {
        // 0x03 decodes as 3 whatever the requested width
        let buf = [0x03];
        assert_eq!(Reader::new(&buf).read_i64().unwrap(), 3);
        assert_eq!(Reader::new(&buf).read_u16().unwrap(), 3);
        assert_eq!(Reader::new(&buf).read_u8().unwrap(), 3);
    }

    #[test]
    fn uint16_overflows_u8() {
        // uint16 256
        let buf = [0xcd, 0x01, 0x00];
        let err = Reader::new(&buf).read_u8().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);
        assert_eq!(Reader::new(&buf).read_u16().unwrap(), 256);
    }

    #[test]
    fn negative_rejected_by_unsigned() {
        let buf = [0xff]; // -1
        assert_eq!(
            Reader::new(&buf).read_u64().unwrap_err().kind(),
            ErrorKind::Overflow
        );
        assert_eq!(Reader::new(&buf).read_i8().unwrap(), -1);
    }

    #[test]
    fn u64_max_round_trips_but_not_into_i64() {
        let mut w = Writer::new();
        w.write_uint(u64::MAX);
        let buf = w.into_vec();
        assert_eq!(Reader::new(&buf).read_u64().unwrap(), u64::MAX);
        assert_eq!(
            Reader::new(&buf).read_i64().unwrap_err().kind(),
            ErrorKind::Overflow
        );
    }

    #[test]
    fn float32_widens_into_f64_read() {
        let mut w = Writer::new();
        w.write_f32(1.5);
        let buf = w.into_vec();
        assert_eq!(Reader::new(&buf).read_f64().unwrap(), 1.5);
    }

    #[test]
    fn try_read_nil_does_not_advance_on_mismatch() {
        let buf = [0x01];
        let mut r = Reader::new(&buf);
        assert!(!r.try_read_nil().unwrap());
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_u8().unwrap(), 1);

        let buf = [0xc0];
        let mut r = Reader::new(&buf);
        assert!(r.try_read_nil().unwrap());
        assert_eq!(r.position(), 1);
    }

    #[test]
    fn strings_and_binary() {
        let mut w = Writer::new();
        w.write_str("caf\u{e9}").unwrap();
        w.write_bin(&[1, 2, 3]).unwrap();
        let buf = w.into_vec();
        let mut r = Reader::new(&buf);
        assert_eq!(r.read_str().unwrap(), "caf\u{e9}");
        assert_eq!(r.read_bin().unwrap(), [1, 2, 3]);
        assert!(!r.has_next());
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let buf = [0xa2, 0xff, 0xfe];
        assert_eq!(
            Reader::new(&buf).read_str().unwrap_err().kind(),
            ErrorKind::Malformed
        );
    }

    #[test]
    fn truncation_is_end_of_stream() {
        let buf = [0xcd, 0x01]; // uint16 missing a byte
        assert_eq!(
            Reader::new(&buf).read_u16().unwrap_err().kind(),
            ErrorKind::EndOfStream
        );
        assert_eq!(
            Reader::new(&[]).peek_kind().unwrap_err().kind(),
            ErrorKind::EndOfStream
        );
    }

    #[test]
    fn peek_reader_does_not_commit() {
        let buf = [0x92, 0x01, 0x02]; // [1, 2]
        let mut r = Reader::new(&buf);
        let mut peek = r.clone();
        assert_eq!(peek.read_array_header().unwrap(), 2);
        assert_eq!(peek.read_u8().unwrap(), 1);
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_array_header().unwrap(), 2);
    }

    /// skip must advance to exactly the same position a read would
    #[rstest]
    #[case::uint(&[0xcc, 0xc8])]
    #[case::nil(&[0xc0])]
    #[case::str(&[0xa3, b'a', b'b', b'c'])]
    #[case::array(&[0x92, 0x01, 0x92, 0x02, 0x03])]
    #[case::map(&[0x81, 0xa1, b'k', 0x91, 0x2a])]
    #[case::ext(&[0xd5, 0x07, 0xaa, 0xbb])]
    #[case::bin(&[0xc4, 0x02, 0x00, 0x01])]
    fn skip_is_read(#[case] buf: &[u8]) {
        let mut r = Reader::new(buf);
        r.skip_structure().unwrap();
        assert_eq!(r.position(), buf.len());
    }

    #[test]
    fn skip_rejects_truncated_nesting() {
        let buf = [0x92, 0x01]; // [1, <missing>]
        assert_eq!(
            Reader::new(&buf).skip_structure().unwrap_err().kind(),
            ErrorKind::EndOfStream
        );
    }

    #[test]
    fn raw_structure_retains_bytes() {
        let buf = [0x81, 0xa1, b'k', 0x2a, 0x01];
        let mut r = Reader::new(&buf);
        assert_eq!(r.read_raw_structure().unwrap(), &buf[..4]);
        assert_eq!(r.read_u8().unwrap(), 1);
    }
}
