//! Leaf converters for the primitive scalars
// (c) 2025 Ross Younger

use bytes::Bytes;

use crate::codec::{Reader, Timestamp, Writer};
use crate::context::Context;
use crate::convert::Converter;
use crate::error::{Error, Result};
use crate::shape::Binary;

macro_rules! unsigned_converter {
    ($($name:ident => $ty:ty ; $read:ident),+ $(,)?) => {
        $(
            pub(crate) struct $name;
            impl Converter<$ty> for $name {
                fn write(&self, writer: &mut Writer, value: &$ty, _cx: &mut Context) -> Result<()> {
                    writer.write_uint(u64::from(*value));
                    Ok(())
                }
                fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<$ty> {
                    reader.$read()
                }
            }
        )+
    };
}

macro_rules! signed_converter {
    ($($name:ident => $ty:ty ; $read:ident),+ $(,)?) => {
        $(
            pub(crate) struct $name;
            impl Converter<$ty> for $name {
                fn write(&self, writer: &mut Writer, value: &$ty, _cx: &mut Context) -> Result<()> {
                    writer.write_int(i64::from(*value));
                    Ok(())
                }
                fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<$ty> {
                    reader.$read()
                }
            }
        )+
    };
}

unsigned_converter! {
    U8Converter => u8 ; read_u8,
    U16Converter => u16 ; read_u16,
    U32Converter => u32 ; read_u32,
    U64Converter => u64 ; read_u64,
}

signed_converter! {
    I8Converter => i8 ; read_i8,
    I16Converter => i16 ; read_i16,
    I32Converter => i32 ; read_i32,
    I64Converter => i64 ; read_i64,
}

pub(crate) struct BoolConverter;
impl Converter<bool> for BoolConverter {
    fn write(&self, writer: &mut Writer, value: &bool, _cx: &mut Context) -> Result<()> {
        writer.write_bool(*value);
        Ok(())
    }
    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<bool> {
        reader.read_bool()
    }
}

/// Characters travel as their code point. BMP values fit the uint16
/// encodings; supplementary-plane characters take uint32.
pub(crate) struct CharConverter;
impl Converter<char> for CharConverter {
    fn write(&self, writer: &mut Writer, value: &char, _cx: &mut Context) -> Result<()> {
        writer.write_uint(u64::from(u32::from(*value)));
        Ok(())
    }
    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<char> {
        let start = reader.position();
        let code = reader.read_u32()?;
        char::from_u32(code)
            .ok_or_else(|| Error::overflow(start, format!("{code:#x} is not a valid character")))
    }
}

pub(crate) struct F32Converter;
impl Converter<f32> for F32Converter {
    fn write(&self, writer: &mut Writer, value: &f32, _cx: &mut Context) -> Result<()> {
        writer.write_f32(*value);
        Ok(())
    }
    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<f32> {
        reader.read_f32()
    }
}

pub(crate) struct F64Converter;
impl Converter<f64> for F64Converter {
    fn write(&self, writer: &mut Writer, value: &f64, _cx: &mut Context) -> Result<()> {
        writer.write_f64(*value);
        Ok(())
    }
    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<f64> {
        reader.read_f64()
    }
}

pub(crate) struct TimestampConverter;
impl Converter<Timestamp> for TimestampConverter {
    fn write(&self, writer: &mut Writer, value: &Timestamp, _cx: &mut Context) -> Result<()> {
        writer.write_timestamp(*value)
    }
    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<Timestamp> {
        reader.read_timestamp()
    }
}

/// Binary blobs use the bin family and prefer the async write path so
/// large payloads flush incrementally.
pub(crate) struct BytesConverter;
impl Converter<Bytes> for BytesConverter {
    fn write(&self, writer: &mut Writer, value: &Bytes, _cx: &mut Context) -> Result<()> {
        writer.write_bin(value)
    }
    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(reader.read_bin()?))
    }
    fn prefers_async(&self) -> bool {
        true
    }
}

pub(crate) struct BinaryConverter;
impl Converter<Binary> for BinaryConverter {
    fn write(&self, writer: &mut Writer, value: &Binary, _cx: &mut Context) -> Result<()> {
        writer.write_bin(&value.0)
    }
    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<Binary> {
        Ok(Binary(reader.read_bin()?.to_vec()))
    }
    fn prefers_async(&self) -> bool {
        true
    }
}
