//! Converters: the nodes of the serialization graph
// (c) 2025 Ross Younger
//!
//! A [`Converter`] reads or writes *exactly one* MessagePack structure for
//! one value type. Converters are stateless; per-call scratch lives in the
//! [`Context`] threaded through every call, and the reader/writer arrive
//! by `&mut` borrow and are never stored.
//!
//! The [registry](registry::ConverterRegistry) caches one converter per
//! `(type, configuration)` and synthesizes missing ones by walking the
//! type's [shape](crate::shape::Shape), breaking recursion with delayed
//! one-shot cells.

pub(crate) mod collections;
pub(crate) mod enums;
pub(crate) mod object;
pub(crate) mod references;
pub(crate) mod registry;
pub(crate) mod scalars;
pub(crate) mod strings;
pub(crate) mod union;

use crate::codec::{Reader, Writer};
use crate::context::Context;
use crate::error::{Error, Result};

pub use registry::ConverterRegistry;
pub use strings::PreformattedString;

/// Reads and writes exactly one MessagePack structure for values of type `T`.
///
/// Implement this to override serialization for a type via
/// [`SerializerConfig::with_converter`](crate::SerializerConfig::with_converter).
pub trait Converter<T>: Send + Sync {
    /// Writes `value` as one structure
    fn write(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()>;

    /// Reads one structure into a value
    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<T>;

    /// True if this converter (or any child) moves enough bytes that the
    /// async facade should flush incrementally rather than buffer the
    /// whole payload
    fn prefers_async(&self) -> bool {
        false
    }

    /// Targeted deserialization fast path: positions `reader` at the value
    /// of the named property without materializing the object. Returns
    /// false if the property is not present. Only object converters
    /// support this.
    fn skip_to_property(
        &self,
        reader: &mut Reader<'_>,
        name: &str,
        cx: &mut Context,
    ) -> Result<bool> {
        let _ = (reader, name, cx);
        Err(Error::invalid_operation(
            "targeted property access is not supported by this converter",
        ))
    }

    /// Targeted deserialization fast path by key index; see
    /// [`skip_to_property`](Self::skip_to_property)
    fn skip_to_index(&self, reader: &mut Reader<'_>, key: u32, cx: &mut Context) -> Result<bool> {
        let _ = (reader, key, cx);
        Err(Error::invalid_operation(
            "targeted index access is not supported by this converter",
        ))
    }
}

/// Adapter for surrogate shapes: marshals to the surrogate type, delegates
/// to its converter, and unmarshals back
pub(crate) struct SurrogateConverter<T, S: 'static> {
    pub(crate) inner: std::sync::Arc<dyn Converter<S>>,
    pub(crate) to_surrogate: fn(&T) -> S,
    pub(crate) from_surrogate: fn(S) -> T,
}

impl<T: Send + Sync, S: 'static> Converter<T> for SurrogateConverter<T, S> {
    fn write(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()> {
        let surrogate = (self.to_surrogate)(value);
        self.inner.write(writer, &surrogate, cx)
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<T> {
        let surrogate = self.inner.read(reader, cx)?;
        Ok((self.from_surrogate)(surrogate))
    }

    fn prefers_async(&self) -> bool {
        self.inner.prefers_async()
    }
}
