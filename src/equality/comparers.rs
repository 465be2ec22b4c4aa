//! The structural comparers for every shape variant
// (c) 2025 Ross Younger
//!
//! Hash streams are domain-separated with a per-variant tag so that, for
//! example, an empty sequence and an empty map cannot collide by
//! construction. Composites combine the digests of their children; maps
//! fold pair digests with XOR so their hash is order-independent.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;

use crate::codec::Timestamp;
use crate::convert::collections::MapCollection;
use crate::equality::registry::EqGeneration;
use crate::equality::siphash::SipHasher24;
use crate::equality::StructuralEq;
use crate::error::Result;
use crate::shape::object::ObjectShape;
use crate::shape::union::UnionShape;
use crate::shape::{Binary, Grid, Shaped};

/// Domain-separation tags, one per hashed variant
mod tags {
    pub(super) const BOOL: u64 = 0x01;
    pub(super) const INT: u64 = 0x02;
    pub(super) const FLOAT: u64 = 0x03;
    pub(super) const CHAR: u64 = 0x04;
    pub(super) const STRING: u64 = 0x05;
    pub(super) const BYTES: u64 = 0x06;
    pub(super) const TIMESTAMP: u64 = 0x07;
    pub(super) const NONE: u64 = 0x08;
    pub(super) const SOME: u64 = 0x09;
    pub(super) const SEQ: u64 = 0x0a;
    pub(super) const MAP: u64 = 0x0b;
    pub(super) const PAIR: u64 = 0x0c;
    pub(super) const OBJECT: u64 = 0x0d;
    pub(super) const UNION: u64 = 0x0e;
    pub(super) const ENUM: u64 = 0x0f;
}

fn digest(tag: u64, feed: impl FnOnce(&mut SipHasher24)) -> u64 {
    let mut h = SipHasher24::with_process_key();
    h.update_u64(tag);
    feed(&mut h);
    h.digest()
}

macro_rules! int_eq {
    ($($name:ident => $ty:ty),+ $(,)?) => {
        $(
            pub(crate) struct $name;
            impl StructuralEq<$ty> for $name {
                fn equals(&self, left: &$ty, right: &$ty) -> bool {
                    left == right
                }
                #[allow(clippy::cast_sign_loss, clippy::cast_lossless)]
                fn hash(&self, value: &$ty) -> u64 {
                    digest(tags::INT, |h| h.update_u64(*value as u64))
                }
            }
        )+
    };
}

int_eq! {
    U8Eq => u8, U16Eq => u16, U32Eq => u32, U64Eq => u64,
    I8Eq => i8, I16Eq => i16, I32Eq => i32, I64Eq => i64,
}

pub(crate) struct BoolEq;
impl StructuralEq<bool> for BoolEq {
    fn equals(&self, left: &bool, right: &bool) -> bool {
        left == right
    }
    fn hash(&self, value: &bool) -> u64 {
        digest(tags::BOOL, |h| h.update_u64(u64::from(*value)))
    }
}

pub(crate) struct CharEq;
impl StructuralEq<char> for CharEq {
    fn equals(&self, left: &char, right: &char) -> bool {
        left == right
    }
    fn hash(&self, value: &char) -> u64 {
        digest(tags::CHAR, |h| h.update_u64(u64::from(u32::from(*value))))
    }
}

/// Canonical bits for float hashing: all NaNs collapse to one pattern and
/// -0 collapses to +0, so hash-equality follows value-equality
fn canonical_float_bits(value: f64) -> u64 {
    if value.is_nan() {
        0x7ff8_0000_0000_0000
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

pub(crate) struct F64Eq;
impl StructuralEq<f64> for F64Eq {
    fn equals(&self, left: &f64, right: &f64) -> bool {
        left == right || (left.is_nan() && right.is_nan())
    }
    fn hash(&self, value: &f64) -> u64 {
        digest(tags::FLOAT, |h| h.update_u64(canonical_float_bits(*value)))
    }
}

pub(crate) struct F32Eq;
impl StructuralEq<f32> for F32Eq {
    fn equals(&self, left: &f32, right: &f32) -> bool {
        left == right || (left.is_nan() && right.is_nan())
    }
    fn hash(&self, value: &f32) -> u64 {
        digest(tags::FLOAT, |h| {
            h.update_u64(canonical_float_bits(f64::from(*value)));
        })
    }
}

pub(crate) struct StringEq;
impl StructuralEq<String> for StringEq {
    fn equals(&self, left: &String, right: &String) -> bool {
        left == right
    }
    fn hash(&self, value: &String) -> u64 {
        digest(tags::STRING, |h| h.update(value.as_bytes()))
    }
}

pub(crate) struct StrEq;
impl StructuralEq<Arc<str>> for StrEq {
    fn equals(&self, left: &Arc<str>, right: &Arc<str>) -> bool {
        left == right
    }
    fn hash(&self, value: &Arc<str>) -> u64 {
        digest(tags::STRING, |h| h.update(value.as_bytes()))
    }
}

pub(crate) struct BytesEq;
impl StructuralEq<Bytes> for BytesEq {
    fn equals(&self, left: &Bytes, right: &Bytes) -> bool {
        left == right
    }
    fn hash(&self, value: &Bytes) -> u64 {
        digest(tags::BYTES, |h| h.update(value))
    }
}

pub(crate) struct BinaryEq;
impl StructuralEq<Binary> for BinaryEq {
    fn equals(&self, left: &Binary, right: &Binary) -> bool {
        left == right
    }
    fn hash(&self, value: &Binary) -> u64 {
        digest(tags::BYTES, |h| h.update(&value.0))
    }
}

pub(crate) struct TimestampEq;
impl StructuralEq<Timestamp> for TimestampEq {
    fn equals(&self, left: &Timestamp, right: &Timestamp) -> bool {
        left == right
    }
    #[allow(clippy::cast_sign_loss)]
    fn hash(&self, value: &Timestamp) -> u64 {
        digest(tags::TIMESTAMP, |h| {
            h.update_u64(value.seconds() as u64);
            h.update_u64(u64::from(value.nanos()));
        })
    }
}

pub(crate) struct OptionEq<E: 'static> {
    pub(crate) inner: Arc<dyn StructuralEq<E>>,
}
impl<E> StructuralEq<Option<E>> for OptionEq<E> {
    fn equals(&self, left: &Option<E>, right: &Option<E>) -> bool {
        match (left, right) {
            (None, None) => true,
            (Some(l), Some(r)) => self.inner.equals(l, r),
            _ => false,
        }
    }
    fn hash(&self, value: &Option<E>) -> u64 {
        match value {
            None => digest(tags::NONE, |_| {}),
            Some(inner) => digest(tags::SOME, |h| h.update_u64(self.inner.hash(inner))),
        }
    }
}

pub(crate) struct BoxEq<E: 'static> {
    pub(crate) inner: Arc<dyn StructuralEq<E>>,
}
impl<E> StructuralEq<Box<E>> for BoxEq<E> {
    fn equals(&self, left: &Box<E>, right: &Box<E>) -> bool {
        self.inner.equals(&**left, &**right)
    }
    fn hash(&self, value: &Box<E>) -> u64 {
        self.inner.hash(&**value)
    }
}

pub(crate) struct SharedEq<E: 'static> {
    pub(crate) inner: Arc<dyn StructuralEq<E>>,
}
impl<E> StructuralEq<Arc<E>> for SharedEq<E> {
    fn equals(&self, left: &Arc<E>, right: &Arc<E>) -> bool {
        Arc::ptr_eq(left, right) || self.inner.equals(&**left, &**right)
    }
    fn hash(&self, value: &Arc<E>) -> u64 {
        self.inner.hash(&**value)
    }
}

pub(crate) struct SeqEq<E: 'static> {
    pub(crate) inner: Arc<dyn StructuralEq<E>>,
}
impl<E> StructuralEq<Vec<E>> for SeqEq<E> {
    fn equals(&self, left: &Vec<E>, right: &Vec<E>) -> bool {
        left.len() == right.len()
            && left
                .iter()
                .zip(right)
                .all(|(l, r)| self.inner.equals(l, r))
    }
    fn hash(&self, value: &Vec<E>) -> u64 {
        digest(tags::SEQ, |h| {
            h.update_u64(value.len() as u64);
            for element in value {
                h.update_u64(self.inner.hash(element));
            }
        })
    }
}

pub(crate) struct FixedArrayEq<E: 'static, const N: usize> {
    pub(crate) inner: Arc<dyn StructuralEq<E>>,
}
impl<E, const N: usize> StructuralEq<[E; N]> for FixedArrayEq<E, N> {
    fn equals(&self, left: &[E; N], right: &[E; N]) -> bool {
        left.iter()
            .zip(right)
            .all(|(l, r)| self.inner.equals(l, r))
    }
    fn hash(&self, value: &[E; N]) -> u64 {
        digest(tags::SEQ, |h| {
            h.update_u64(N as u64);
            for element in value {
                h.update_u64(self.inner.hash(element));
            }
        })
    }
}

pub(crate) struct GridEq<E: 'static> {
    pub(crate) inner: Arc<dyn StructuralEq<E>>,
}
impl<E> StructuralEq<Grid<E>> for GridEq<E> {
    fn equals(&self, left: &Grid<E>, right: &Grid<E>) -> bool {
        left.0.len() == right.0.len()
            && left.0.iter().zip(&right.0).all(|(l, r)| {
                l.len() == r.len() && l.iter().zip(r).all(|(a, b)| self.inner.equals(a, b))
            })
    }
    fn hash(&self, value: &Grid<E>) -> u64 {
        digest(tags::SEQ, |h| {
            h.update_u64(value.0.len() as u64);
            for row in &value.0 {
                let row_hash = digest(tags::SEQ, |rh| {
                    rh.update_u64(row.len() as u64);
                    for element in row {
                        rh.update_u64(self.inner.hash(element));
                    }
                });
                h.update_u64(row_hash);
            }
        })
    }
}

/// Maps compare as unordered key/value multisets and hash by XOR-folding
/// per-pair digests, so iteration order never matters
pub(crate) struct MapEq<K: 'static, V: 'static, M> {
    pub(crate) key: Arc<dyn StructuralEq<K>>,
    pub(crate) value: Arc<dyn StructuralEq<V>>,
    pub(crate) _collection: PhantomData<fn() -> M>,
}
impl<K, V, M: MapCollection<K, V>> StructuralEq<M> for MapEq<K, V, M> {
    fn equals(&self, left: &M, right: &M) -> bool {
        left.pair_count() == right.pair_count()
            && left
                .pairs()
                .all(|(k, v)| right.lookup(k).is_some_and(|rv| self.value.equals(v, rv)))
    }
    fn hash(&self, value: &M) -> u64 {
        let mut folded = 0u64;
        for (k, v) in value.pairs() {
            folded ^= digest(tags::PAIR, |h| {
                h.update_u64(self.key.hash(k));
                h.update_u64(self.value.hash(v));
            });
        }
        digest(tags::MAP, |h| {
            h.update_u64(value.pair_count() as u64);
            h.update_u64(folded);
        })
    }
}

pub(crate) struct EnumEq<T: 'static> {
    pub(crate) to_ordinal: fn(&T) -> i64,
}
impl<T> StructuralEq<T> for EnumEq<T> {
    fn equals(&self, left: &T, right: &T) -> bool {
        (self.to_ordinal)(left) == (self.to_ordinal)(right)
    }
    #[allow(clippy::cast_sign_loss)]
    fn hash(&self, value: &T) -> u64 {
        digest(tags::ENUM, |h| h.update_u64((self.to_ordinal)(value) as u64))
    }
}

pub(crate) struct SurrogateEq<T, S: 'static> {
    pub(crate) inner: Arc<dyn StructuralEq<S>>,
    pub(crate) to_surrogate: fn(&T) -> S,
}
impl<T: Send + Sync, S> StructuralEq<T> for SurrogateEq<T, S> {
    fn equals(&self, left: &T, right: &T) -> bool {
        self.inner
            .equals(&(self.to_surrogate)(left), &(self.to_surrogate)(right))
    }
    fn hash(&self, value: &T) -> u64 {
        self.inner.hash(&(self.to_surrogate)(value))
    }
}

/// One property's contribution to its object's comparer
pub(crate) trait PropertyEq<T>: Send + Sync {
    fn equals(&self, left: &T, right: &T) -> bool;
    fn hash(&self, value: &T) -> u64;
}

pub(crate) struct PropertyEqImpl<T: 'static, P: 'static> {
    pub(crate) get: fn(&T) -> &P,
    pub(crate) inner: Arc<dyn StructuralEq<P>>,
}
impl<T: Send + Sync, P> PropertyEq<T> for PropertyEqImpl<T, P> {
    fn equals(&self, left: &T, right: &T) -> bool {
        self.inner.equals((self.get)(left), (self.get)(right))
    }
    fn hash(&self, value: &T) -> u64 {
        self.inner.hash((self.get)(value))
    }
}

pub(crate) struct ObjectEq<T: 'static> {
    properties: Vec<Arc<dyn PropertyEq<T>>>,
}
impl<T> StructuralEq<T> for ObjectEq<T> {
    fn equals(&self, left: &T, right: &T) -> bool {
        self.properties.iter().all(|p| p.equals(left, right))
    }
    fn hash(&self, value: &T) -> u64 {
        digest(tags::OBJECT, |h| {
            for property in &self.properties {
                h.update_u64(property.hash(value));
            }
        })
    }
}

/// Builds an object comparer over the serializable properties
pub(crate) fn build_object_eq<T: Shaped>(
    shape: &Arc<ObjectShape<T>>,
    gen: &mut EqGeneration<'_>,
) -> Result<Arc<dyn StructuralEq<T>>> {
    let mut properties = Vec::new();
    for property in shape.properties.iter().filter(|p| !p.ignored) {
        properties.push(property.facet.bind_equality(gen)?);
    }
    Ok(Arc::new(ObjectEq { properties }))
}

/// One case's contribution to its union's comparer
pub(crate) trait CaseEq<T>: Send + Sync {
    fn matches(&self, value: &T) -> bool;
    fn equals(&self, left: &T, right: &T) -> bool;
    fn hash(&self, value: &T) -> u64;
}

pub(crate) struct CaseEqImpl<T: 'static, C: 'static> {
    pub(crate) project: fn(&T) -> Option<&C>,
    pub(crate) inner: Arc<dyn StructuralEq<C>>,
}
impl<T: Send + Sync, C> CaseEq<T> for CaseEqImpl<T, C> {
    fn matches(&self, value: &T) -> bool {
        (self.project)(value).is_some()
    }
    fn equals(&self, left: &T, right: &T) -> bool {
        match ((self.project)(left), (self.project)(right)) {
            (Some(l), Some(r)) => self.inner.equals(l, r),
            _ => false,
        }
    }
    fn hash(&self, value: &T) -> u64 {
        (self.project)(value).map_or(0, |c| self.inner.hash(c))
    }
}

pub(crate) struct UnionEq<T: 'static> {
    cases: Vec<(u32, Arc<dyn CaseEq<T>>)>,
    fallback: Option<Arc<dyn CaseEq<T>>>,
}

impl<T> UnionEq<T> {
    /// Which case a value belongs to: `Some(position)` or `None` for the
    /// fallback
    fn case_of(&self, value: &T) -> Option<usize> {
        self.cases.iter().position(|(_, case)| case.matches(value))
    }
}

impl<T> StructuralEq<T> for UnionEq<T> {
    fn equals(&self, left: &T, right: &T) -> bool {
        match (self.case_of(left), self.case_of(right)) {
            (Some(l), Some(r)) => l == r && self.cases[l].1.equals(left, right),
            (None, None) => self
                .fallback
                .as_ref()
                .is_some_and(|f| f.equals(left, right)),
            _ => false,
        }
    }
    fn hash(&self, value: &T) -> u64 {
        let (index, case_hash) = match self.case_of(value) {
            Some(position) => {
                let (index, case) = &self.cases[position];
                (u64::from(*index), case.hash(value))
            }
            None => (
                u64::MAX,
                self.fallback.as_ref().map_or(0, |f| f.hash(value)),
            ),
        };
        digest(tags::UNION, |h| {
            h.update_u64(index);
            h.update_u64(case_hash);
        })
    }
}

/// Builds a union comparer with cases in declaration order
pub(crate) fn build_union_eq<T: Shaped>(
    shape: &Arc<UnionShape<T>>,
    gen: &mut EqGeneration<'_>,
) -> Result<Arc<dyn StructuralEq<T>>> {
    let mut cases = Vec::with_capacity(shape.cases.len());
    for case in &shape.cases {
        cases.push((case.index, case.facet.bind_equality(gen)?));
    }
    let fallback = shape
        .fallback
        .as_ref()
        .map(|facet| facet.bind_equality(gen))
        .transpose()?;
    Ok(Arc::new(UnionEq { cases, fallback }))
}

#[cfg(test)]
mod tests {
    use crate::equality::EqualityRegistry;
    use crate::error::Result;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn zero_signs_agree() -> Result<()> {
        let registry = EqualityRegistry::new();
        let cmp = registry.comparer_for::<f64>()?;
        assert!(cmp.equals(&0.0, &-0.0));
        assert_eq!(cmp.hash(&0.0), cmp.hash(&-0.0));
        Ok(())
    }

    #[test]
    fn nan_bit_patterns_agree() -> Result<()> {
        let registry = EqualityRegistry::new();
        let cmp = registry.comparer_for::<f64>()?;
        let quiet = f64::NAN;
        let weird = f64::from_bits(0x7ff8_dead_beef_0001);
        assert!(weird.is_nan());
        assert!(cmp.equals(&quiet, &weird));
        assert_eq!(cmp.hash(&quiet), cmp.hash(&weird));
        Ok(())
    }

    #[test]
    fn map_hash_is_order_independent() -> Result<()> {
        let registry = EqualityRegistry::new();
        let cmp = registry.comparer_for::<HashMap<String, u32>>()?;
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for (k, v) in [("one", 1u32), ("two", 2), ("three", 3)] {
            let _ = a.insert(k.to_string(), v);
        }
        for (k, v) in [("three", 3u32), ("one", 1), ("two", 2)] {
            let _ = b.insert(k.to_string(), v);
        }
        assert!(cmp.equals(&a, &b));
        assert_eq!(cmp.hash(&a), cmp.hash(&b));
        Ok(())
    }

    #[test]
    fn sequences_are_order_sensitive() -> Result<()> {
        let registry = EqualityRegistry::new();
        let cmp = registry.comparer_for::<Vec<u8>>()?;
        assert!(!cmp.equals(&vec![1, 2], &vec![2, 1]));
        assert_ne!(cmp.hash(&vec![1, 2]), cmp.hash(&vec![2, 1]));
        Ok(())
    }

    #[test]
    fn empty_map_and_empty_seq_hash_differently() -> Result<()> {
        let registry = EqualityRegistry::new();
        let seq = registry.comparer_for::<Vec<u32>>()?;
        let map = registry.comparer_for::<HashMap<u32, u32>>()?;
        assert_ne!(seq.hash(&vec![]), map.hash(&HashMap::new()));
        Ok(())
    }
}
