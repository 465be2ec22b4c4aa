//! Converters for optionals, sequences, keyed maps and grids
// (c) 2025 Ross Younger

use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::{Reader, Writer};
use crate::config::MultiDimFormat;
use crate::context::Context;
use crate::convert::Converter;
use crate::error::{Error, Result};
use crate::shape::Grid;

/// `Option<E>`: nil for absent, the element structure otherwise.
/// Not a nesting step; the option occupies the same structure slot as its
/// element.
pub(crate) struct OptionalConverter<E: 'static> {
    pub(crate) inner: Arc<dyn Converter<E>>,
}

impl<E: Send + Sync> Converter<Option<E>> for OptionalConverter<E> {
    fn write(&self, writer: &mut Writer, value: &Option<E>, cx: &mut Context) -> Result<()> {
        match value {
            None => {
                writer.write_nil();
                Ok(())
            }
            Some(inner) => self.inner.write(writer, inner, cx),
        }
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<Option<E>> {
        if reader.try_read_nil()? {
            Ok(None)
        } else {
            Ok(Some(self.inner.read(reader, cx)?))
        }
    }

    fn prefers_async(&self) -> bool {
        self.inner.prefers_async()
    }
}

/// Boxed values are transparent on the wire
pub(crate) struct BoxConverter<E: 'static> {
    pub(crate) inner: Arc<dyn Converter<E>>,
}

impl<E: Send + Sync> Converter<Box<E>> for BoxConverter<E> {
    fn write(&self, writer: &mut Writer, value: &Box<E>, cx: &mut Context) -> Result<()> {
        self.inner.write(writer, &**value, cx)
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<Box<E>> {
        Ok(Box::new(self.inner.read(reader, cx)?))
    }

    fn prefers_async(&self) -> bool {
        self.inner.prefers_async()
    }
}

/// `Vec<E>` as a length-headed array
pub(crate) struct SequenceConverter<E: 'static> {
    pub(crate) inner: Arc<dyn Converter<E>>,
}

impl<E: Send + Sync> Converter<Vec<E>> for SequenceConverter<E> {
    fn write(&self, writer: &mut Writer, value: &Vec<E>, cx: &mut Context) -> Result<()> {
        cx.enter()?;
        let result = (|| {
            writer.write_array_header(value.len())?;
            for element in value {
                self.inner.write(writer, element, cx)?;
            }
            Ok(())
        })();
        cx.leave();
        result
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<Vec<E>> {
        cx.enter()?;
        let result = (|| {
            let count = reader.read_array_header()?;
            // Cap the pre-allocation: a hostile header must not reserve
            // gigabytes before any element has been proven to exist.
            let mut out = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                out.push(self.inner.read(reader, cx)?);
            }
            Ok(out)
        })();
        cx.leave();
        result
    }

    fn prefers_async(&self) -> bool {
        self.inner.prefers_async()
    }
}

/// `[E; N]`: written as an array of exactly `N`; on read, shorter input is
/// malformed and extra elements are consumed and discarded so the schema
/// can grow
pub(crate) struct FixedArrayConverter<E: 'static, const N: usize> {
    pub(crate) inner: Arc<dyn Converter<E>>,
}

impl<E: Send + Sync, const N: usize> Converter<[E; N]> for FixedArrayConverter<E, N> {
    fn write(&self, writer: &mut Writer, value: &[E; N], cx: &mut Context) -> Result<()> {
        cx.enter()?;
        let result = (|| {
            writer.write_array_header(N)?;
            for element in value {
                self.inner.write(writer, element, cx)?;
            }
            Ok(())
        })();
        cx.leave();
        result
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<[E; N]> {
        cx.enter()?;
        let result = (|| {
            let start = reader.position();
            let count = reader.read_array_header()?;
            if count < N {
                return Err(Error::malformed(
                    start,
                    format!("expected at least {N} elements, found {count}"),
                ));
            }
            let mut out = Vec::with_capacity(N);
            for _ in 0..N {
                out.push(self.inner.read(reader, cx)?);
            }
            for _ in N..count {
                reader.skip_structure()?;
            }
            out.try_into()
                .map_err(|_| Error::invalid_operation("fixed array length mismatch"))
        })();
        cx.leave();
        result
    }

    fn prefers_async(&self) -> bool {
        self.inner.prefers_async()
    }
}

/// Map-like collections the keyed-map converter can populate and walk
pub(crate) trait MapCollection<K, V>: Send + Sync + 'static {
    fn empty() -> Self;
    fn insert_pair(&mut self, key: K, value: V);
    fn pair_count(&self) -> usize;
    fn pairs<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a K, &'a V)> + 'a>
    where
        K: 'a,
        V: 'a;
    fn lookup(&self, key: &K) -> Option<&V>;
}

impl<K, V> MapCollection<K, V> for std::collections::HashMap<K, V>
where
    K: Eq + std::hash::Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn empty() -> Self {
        Self::new()
    }
    fn insert_pair(&mut self, key: K, value: V) {
        let _ = self.insert(key, value);
    }
    fn pair_count(&self) -> usize {
        self.len()
    }
    fn pairs<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a K, &'a V)> + 'a>
    where
        K: 'a,
        V: 'a,
    {
        Box::new(self.iter())
    }
    fn lookup(&self, key: &K) -> Option<&V> {
        self.get(key)
    }
}

impl<K, V> MapCollection<K, V> for std::collections::BTreeMap<K, V>
where
    K: Ord + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn empty() -> Self {
        Self::new()
    }
    fn insert_pair(&mut self, key: K, value: V) {
        let _ = self.insert(key, value);
    }
    fn pair_count(&self) -> usize {
        self.len()
    }
    fn pairs<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a K, &'a V)> + 'a>
    where
        K: 'a,
        V: 'a,
    {
        Box::new(self.iter())
    }
    fn lookup(&self, key: &K) -> Option<&V> {
        self.get(key)
    }
}

/// Keyed maps: a map header then key/value pairs in iteration order
pub(crate) struct MapConverter<K: 'static, V: 'static, M> {
    pub(crate) key: Arc<dyn Converter<K>>,
    pub(crate) value: Arc<dyn Converter<V>>,
    pub(crate) _collection: PhantomData<fn() -> M>,
}

impl<K, V, M> Converter<M> for MapConverter<K, V, M>
where
    K: Send + Sync,
    V: Send + Sync,
    M: MapCollection<K, V>,
{
    fn write(&self, writer: &mut Writer, value: &M, cx: &mut Context) -> Result<()> {
        cx.enter()?;
        let result = (|| {
            writer.write_map_header(value.pair_count())?;
            for (k, v) in value.pairs() {
                self.key.write(writer, k, cx)?;
                self.value.write(writer, v, cx)?;
            }
            Ok(())
        })();
        cx.leave();
        result
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<M> {
        cx.enter()?;
        let result = (|| {
            let count = reader.read_map_header()?;
            let mut out = M::empty();
            for _ in 0..count {
                let k = self.key.read(reader, cx)?;
                let v = self.value.read(reader, cx)?;
                out.insert_pair(k, v);
            }
            Ok(out)
        })();
        cx.leave();
        result
    }

    fn prefers_async(&self) -> bool {
        self.key.prefers_async() || self.value.prefers_async()
    }
}

/// Rectangular two-dimensional arrays ([`Grid`]); the wire format is
/// chosen by configuration
pub(crate) struct MultiDimConverter<E: 'static> {
    pub(crate) inner: Arc<dyn Converter<E>>,
    pub(crate) format: MultiDimFormat,
}

impl<E: Send + Sync> MultiDimConverter<E> {
    fn row_length(value: &Grid<E>) -> Result<usize> {
        let cols = value.0.first().map_or(0, Vec::len);
        if value.0.iter().any(|row| row.len() != cols) {
            return Err(Error::invalid_operation(
                "grid rows must all have the same length",
            ));
        }
        Ok(cols)
    }
}

impl<E: Send + Sync> Converter<Grid<E>> for MultiDimConverter<E> {
    fn write(&self, writer: &mut Writer, value: &Grid<E>, cx: &mut Context) -> Result<()> {
        cx.enter()?;
        let result = (|| match self.format {
            MultiDimFormat::Nested => {
                writer.write_array_header(value.0.len())?;
                for row in &value.0 {
                    writer.write_array_header(row.len())?;
                    for element in row {
                        self.inner.write(writer, element, cx)?;
                    }
                }
                Ok(())
            }
            MultiDimFormat::Flattened => {
                let rows = value.0.len();
                let cols = Self::row_length(value)?;
                writer.write_array_header(1 + rows * cols)?;
                writer.write_array_header(2)?;
                writer.write_uint(rows as u64);
                writer.write_uint(cols as u64);
                for row in &value.0 {
                    for element in row {
                        self.inner.write(writer, element, cx)?;
                    }
                }
                Ok(())
            }
        })();
        cx.leave();
        result
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<Grid<E>> {
        cx.enter()?;
        let result = (|| match self.format {
            MultiDimFormat::Nested => {
                let rows = reader.read_array_header()?;
                let mut out = Vec::with_capacity(rows.min(4096));
                for _ in 0..rows {
                    let cols = reader.read_array_header()?;
                    let mut row = Vec::with_capacity(cols.min(4096));
                    for _ in 0..cols {
                        row.push(self.inner.read(reader, cx)?);
                    }
                    out.push(row);
                }
                Ok(Grid(out))
            }
            MultiDimFormat::Flattened => {
                let start = reader.position();
                let total = reader.read_array_header()?;
                let dims = reader.read_array_header()?;
                if dims != 2 {
                    return Err(Error::malformed(start, "grid header must hold 2 dimensions"));
                }
                let rows = reader.read_u64()? as usize;
                let cols = reader.read_u64()? as usize;
                if rows.checked_mul(cols).and_then(|n| n.checked_add(1)) != Some(total) {
                    return Err(Error::malformed(
                        start,
                        "grid dimensions disagree with the element count",
                    ));
                }
                let mut out = Vec::with_capacity(rows.min(4096));
                for _ in 0..rows {
                    let mut row = Vec::with_capacity(cols.min(4096));
                    for _ in 0..cols {
                        row.push(self.inner.read(reader, cx)?);
                    }
                    out.push(row);
                }
                Ok(Grid(out))
            }
        })();
        cx.leave();
        result
    }

    fn prefers_async(&self) -> bool {
        self.inner.prefers_async()
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::{Reader, Writer};
    use crate::config::{MultiDimFormat, SerializerConfig};
    use crate::context::Context;
    use crate::convert::ConverterRegistry;
    use crate::error::{ErrorKind, Result};
    use crate::shape::Grid;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, HashMap};

    fn roundtrip<T: crate::shape::Shaped>(registry: &ConverterRegistry, value: &T) -> Result<T> {
        let conv = registry.converter_for::<T>()?;
        let mut w = Writer::new();
        conv.write(&mut w, value, &mut Context::new(64))?;
        let bytes = w.into_vec();
        let mut r = Reader::new(&bytes);
        let decoded = conv.read(&mut r, &mut Context::new(64))?;
        assert_eq!(r.remaining(), 0);
        Ok(decoded)
    }

    #[test]
    fn options_are_nil_or_value() -> Result<()> {
        let registry = ConverterRegistry::new(SerializerConfig::default());
        assert_eq!(roundtrip(&registry, &Some(5u32))?, Some(5));
        assert_eq!(roundtrip(&registry, &None::<u32>)?, None);

        let conv = registry.converter_for::<Option<u32>>()?;
        let mut w = Writer::new();
        conv.write(&mut w, &None, &mut Context::new(64))?;
        assert_eq!(w.into_vec(), [0xc0]);
        Ok(())
    }

    #[test]
    fn maps_roundtrip() -> Result<()> {
        let registry = ConverterRegistry::new(SerializerConfig::default());
        let mut hash = HashMap::new();
        let _ = hash.insert("a".to_string(), 1u32);
        let _ = hash.insert("b".to_string(), 2);
        assert_eq!(roundtrip(&registry, &hash)?, hash);

        let mut tree = BTreeMap::new();
        let _ = tree.insert(3u64, vec![true, false]);
        let _ = tree.insert(9, vec![]);
        assert_eq!(roundtrip(&registry, &tree)?, tree);
        Ok(())
    }

    #[test]
    fn fixed_arrays_tolerate_longer_input_but_not_shorter() -> Result<()> {
        let registry = ConverterRegistry::new(SerializerConfig::default());
        let conv = registry.converter_for::<[u8; 2]>()?;

        // [1, 2, 3] into [u8; 2]: the extra element is discarded
        let decoded = conv.read(&mut Reader::new(&[0x93, 1, 2, 3]), &mut Context::new(8))?;
        assert_eq!(decoded, [1, 2]);

        // [1] into [u8; 2]: malformed
        let err = conv
            .read(&mut Reader::new(&[0x91, 1]), &mut Context::new(8))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        Ok(())
    }

    #[test]
    fn nested_grids_roundtrip() -> Result<()> {
        let registry = ConverterRegistry::new(SerializerConfig::default());
        let grid = Grid(vec![vec![1u8, 2], vec![3, 4], vec![5, 6]]);
        assert_eq!(roundtrip(&registry, &grid)?, grid);
        Ok(())
    }

    #[test]
    fn flattened_grids_must_be_rectangular() -> Result<()> {
        let registry = ConverterRegistry::new(
            SerializerConfig::default().with_multi_dim_format(MultiDimFormat::Flattened),
        );
        let conv = registry.converter_for::<Grid<u8>>()?;
        let ragged = Grid(vec![vec![1u8, 2], vec![3]]);
        let err = conv
            .write(&mut Writer::new(), &ragged, &mut Context::new(8))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);

        let square = Grid(vec![vec![1u8, 2], vec![3, 4]]);
        assert_eq!(roundtrip(&registry, &square)?, square);
        Ok(())
    }

    #[test]
    fn collection_nesting_counts_against_the_depth_budget() -> Result<()> {
        let registry = ConverterRegistry::new(SerializerConfig::default());
        let conv = registry.converter_for::<Vec<Vec<Vec<u8>>>>()?;
        let value = vec![vec![vec![1u8]]];
        let mut w = Writer::new();
        let err = conv
            .write(&mut w, &value, &mut Context::new(2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DepthExceeded);
        Ok(())
    }
}
