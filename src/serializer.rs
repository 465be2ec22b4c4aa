//! The serializer facade
// (c) 2025 Ross Younger
//!
//! [`MessagePackSerializer`] is the entry point: it owns the configuration
//! and the converter/comparer caches, creates a fresh [`Context`] per
//! top-level call, and hosts the sync and async serialize/deserialize
//! paths. One facade is cheap to share across threads; its caches warm up
//! once per type and are reused for its lifetime.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::codec::{AsyncSource, Reader, Writer};
use crate::config::SerializerConfig;
use crate::context::Context;
use crate::convert::ConverterRegistry;
use crate::equality::EqualityRegistry;
use crate::error::{Error, ErrorKind, Result};
use crate::shape::Shaped;

/// A configured MessagePack serializer/deserializer over type shapes.
#[derive(Debug)]
pub struct MessagePackSerializer {
    converters: ConverterRegistry,
    equality: EqualityRegistry,
}

impl Default for MessagePackSerializer {
    fn default() -> Self {
        // The default configuration always validates.
        Self {
            converters: ConverterRegistry::new(SerializerConfig::default()),
            equality: EqualityRegistry::new(),
        }
    }
}

impl MessagePackSerializer {
    /// Creates a serializer, validating the configuration
    pub fn new(config: SerializerConfig) -> Result<Self> {
        config.extension_codes.validate()?;
        Ok(Self {
            converters: ConverterRegistry::new(config),
            equality: EqualityRegistry::new(),
        })
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &SerializerConfig {
        self.converters.config()
    }

    /// A context for one call, seeded from the configuration's starting
    /// state and depth limit
    #[must_use]
    pub fn context(&self) -> Context {
        Context::for_call(self.config(), CancellationToken::new())
    }

    /// A context carrying the caller's cancellation signal
    #[must_use]
    pub fn context_with_cancellation(&self, cancel: CancellationToken) -> Context {
        Context::for_call(self.config(), cancel)
    }

    /// Serializes one value to a byte vector
    pub fn serialize<T: Shaped>(&self, value: &T) -> Result<Vec<u8>> {
        self.serialize_with_context(value, &mut self.context())
    }

    /// Serializes with an explicit context (cancellation, user state)
    pub fn serialize_with_context<T: Shaped>(
        &self,
        value: &T,
        cx: &mut Context,
    ) -> Result<Vec<u8>> {
        let converter = self.converters.converter_for::<T>()?;
        let mut writer = Writer::new();
        cx.check_cancelled()?;
        converter
            .write(&mut writer, value, cx)
            .map_err(|e| e.within(std::any::type_name::<T>()))?;
        Ok(writer.into_vec())
    }

    /// Serializes into a caller-owned writer, e.g. to concatenate several
    /// structures into one buffer
    pub fn serialize_into<T: Shaped>(
        &self,
        writer: &mut Writer,
        value: &T,
        cx: &mut Context,
    ) -> Result<()> {
        let converter = self.converters.converter_for::<T>()?;
        cx.check_cancelled()?;
        converter
            .write(writer, value, cx)
            .map_err(|e| e.within(std::any::type_name::<T>()))
    }

    /// Deserializes one value from a buffer holding exactly one structure.
    /// Trailing bytes are a grammar violation; use [`read_from`](Self::read_from)
    /// to consume structures from a longer buffer.
    pub fn deserialize<T: Shaped>(&self, bytes: &[u8]) -> Result<T> {
        let mut cx = self.context();
        self.deserialize_with_context(bytes, &mut cx)
    }

    /// Deserializes with an explicit context
    pub fn deserialize_with_context<T: Shaped>(
        &self,
        bytes: &[u8],
        cx: &mut Context,
    ) -> Result<T> {
        let mut reader = Reader::new(bytes);
        let value = self.read_from(&mut reader, cx)?;
        if reader.has_next() {
            return Err(Error::malformed(
                reader.position(),
                "trailing bytes after the structure",
            ));
        }
        Ok(value)
    }

    /// Reads one structure from a caller-owned reader, leaving the reader
    /// positioned after it
    pub fn read_from<T: Shaped>(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<T> {
        let converter = self.converters.converter_for::<T>()?;
        cx.check_cancelled()?;
        converter
            .read(reader, cx)
            .map_err(|e| e.within(std::any::type_name::<T>()))
    }

    /// Serializes asynchronously.
    ///
    /// When the converter graph reports an async preference (large binary
    /// payloads on the root path), output is flushed in chunks of at most
    /// `max-async-buffer` bytes with cancellation probed between chunks;
    /// otherwise the whole encoding is buffered and written in one shot.
    pub async fn serialize_to<T, W>(&self, sink: &mut W, value: &T, cx: &mut Context) -> Result<()>
    where
        T: Shaped,
        W: AsyncWrite + Unpin + Send,
    {
        let converter = self.converters.converter_for::<T>()?;
        let mut writer = Writer::new();
        cx.check_cancelled()?;
        converter
            .write(&mut writer, value, cx)
            .map_err(|e| e.within(std::any::type_name::<T>()))?;
        let bytes = writer.into_bytes();

        let chunked = converter.prefers_async()
            && bytes.len() > self.config().max_async_buffer
            && self.config().max_async_buffer > 0;
        if chunked {
            for chunk in bytes.chunks(self.config().max_async_buffer) {
                cx.check_cancelled()?;
                sink.write_all(chunk).await.map_err(write_failed)?;
            }
        } else {
            cx.check_cancelled()?;
            sink.write_all(&bytes).await.map_err(write_failed)?;
        }
        sink.flush().await.map_err(write_failed)?;
        Ok(())
    }

    /// Deserializes asynchronously: prefetches until one whole structure
    /// is buffered (suspending only while waiting for bytes), then runs
    /// the synchronous converter over it
    pub async fn deserialize_from<T, R>(&self, source: &mut R, cx: &mut Context) -> Result<T>
    where
        T: Shaped,
        R: AsyncRead + Unpin + Send,
    {
        let converter = self.converters.converter_for::<T>()?;
        let mut src = AsyncSource::new(source, self.config().max_async_buffer);
        let len = src.buffer_structure(cx.cancellation()).await?;
        let mut reader = Reader::new(&src.buffered()[..len]);
        let value = converter
            .read(&mut reader, cx)
            .map_err(|e| e.within(std::any::type_name::<T>()))?;
        src.consume(reader.position());
        Ok(value)
    }

    /// Deep structural equality under the comparer graph
    pub fn deep_equal<T: Shaped>(&self, left: &T, right: &T) -> Result<bool> {
        Ok(self.equality.comparer_for::<T>()?.equals(left, right))
    }

    /// Collision-resistant structural hash; equal values hash equal
    pub fn deep_hash<T: Shaped>(&self, value: &T) -> Result<u64> {
        Ok(self.equality.comparer_for::<T>()?.hash(value))
    }

    /// The comparer registry, for callers that want to hold a comparer
    /// directly
    #[must_use]
    pub fn equality(&self) -> &EqualityRegistry {
        &self.equality
    }

    /// Targeted deserialization: decodes just the named property of a
    /// `T`-shaped buffer, without materializing the rest of the object.
    /// Returns `None` if the property is not present. `name` is the wire
    /// name (after any naming policy).
    pub fn read_property<T: Shaped, P: Shaped>(
        &self,
        bytes: &[u8],
        name: &str,
    ) -> Result<Option<P>> {
        let object = self.converters.converter_for::<T>()?;
        let mut cx = self.context();
        let mut reader = Reader::new(bytes);
        if !object.skip_to_property(&mut reader, name, &mut cx)? {
            return Ok(None);
        }
        let property = self.converters.converter_for::<P>()?;
        Ok(Some(property.read(&mut reader, &mut cx)?))
    }

    /// Targeted deserialization by key index; see
    /// [`read_property`](Self::read_property)
    pub fn read_indexed<T: Shaped, P: Shaped>(&self, bytes: &[u8], key: u32) -> Result<Option<P>> {
        let object = self.converters.converter_for::<T>()?;
        let mut cx = self.context();
        let mut reader = Reader::new(bytes);
        if !object.skip_to_index(&mut reader, key, &mut cx)? {
            return Ok(None);
        }
        let property = self.converters.converter_for::<P>()?;
        Ok(Some(property.read(&mut reader, &mut cx)?))
    }
}

/// The error taxonomy has no I/O kind; a failing sink ends the exchange,
/// which callers observe as a truncated stream
fn write_failed(e: std::io::Error) -> Error {
    Error::new(ErrorKind::EndOfStream, format!("write failed: {e}"))
}

static_assertions::assert_impl_all!(MessagePackSerializer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::MessagePackSerializer;
    use crate::config::SerializerConfig;
    use crate::error::{ErrorKind, Result};
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_roundtrip() -> Result<()> {
        let mp = MessagePackSerializer::default();
        let bytes = mp.serialize(&42u32)?;
        assert_eq!(bytes, [0x2a]);
        assert_eq!(mp.deserialize::<u32>(&bytes)?, 42);
        Ok(())
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mp = MessagePackSerializer::default();
        let err = mp.deserialize::<u32>(&[0x01, 0x02]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn invalid_extension_codes_rejected() {
        let config = SerializerConfig::default().with_extension_codes(
            crate::config::ExtensionCodes {
                reference_id: 5,
                back_reference: 5,
            },
        );
        assert!(MessagePackSerializer::new(config).is_err());
    }

    #[tokio::test]
    async fn async_roundtrip() -> Result<()> {
        let mp = MessagePackSerializer::default();
        let mut buf = Vec::new();
        let mut cx = mp.context();
        mp.serialize_to(&mut buf, &vec![1u32, 2, 3], &mut cx).await?;
        assert_eq!(buf, mp.serialize(&vec![1u32, 2, 3])?);

        let mut cursor = std::io::Cursor::new(buf);
        let mut cx = mp.context();
        let decoded: Vec<u32> = mp.deserialize_from(&mut cursor, &mut cx).await?;
        assert_eq!(decoded, vec![1, 2, 3]);
        Ok(())
    }
}
