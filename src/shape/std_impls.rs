//! Shapes for the standard scalars and collections
// (c) 2025 Ross Younger

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;

use crate::codec::Timestamp;
use crate::convert::collections::{
    BoxConverter, FixedArrayConverter, MapConverter, MultiDimConverter, OptionalConverter,
    SequenceConverter,
};
use crate::convert::references::SharedConverter;
use crate::convert::registry::Generation;
use crate::convert::scalars::{
    BinaryConverter, BoolConverter, BytesConverter, CharConverter, F32Converter, F64Converter,
    I16Converter, I32Converter, I64Converter, I8Converter, TimestampConverter, U16Converter,
    U32Converter, U64Converter, U8Converter,
};
use crate::convert::strings::{ArcStrConverter, StringConverter};
use crate::convert::Converter;
use crate::equality::comparers::{
    BinaryEq, BoolEq, BoxEq, BytesEq, CharEq, F32Eq, F64Eq, FixedArrayEq, GridEq, I16Eq, I32Eq,
    I64Eq, I8Eq, MapEq, OptionEq, SeqEq, SharedEq, StrEq, StringEq, TimestampEq, U16Eq, U32Eq,
    U64Eq, U8Eq,
};
use crate::equality::registry::EqGeneration;
use crate::equality::StructuralEq;
use crate::error::Result;
use crate::shape::{Facet, ScalarKind, Shape, ShapeKind, Shaped};

/// A byte blob that serializes as the MessagePack `bin` family (a bare
/// `Vec<u8>` would be an array of integers)
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, derive_more::From)]
pub struct Binary(pub Vec<u8>);

impl AsRef<[u8]> for Binary {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A rectangular two-dimensional array. Its wire format follows the
/// `multi-dimensional-array-format` configuration option.
#[derive(Clone, Debug, Default, Eq, PartialEq, derive_more::From)]
pub struct Grid<E>(pub Vec<Vec<E>>);

macro_rules! scalar_shaped {
    ($($ty:ty => $kind:ident, $conv:ident, $eq:ident);+ $(;)?) => {
        $(
            impl Shaped for $ty {
                fn shape() -> Shape<Self> {
                    Shape::scalar(
                        ScalarKind::$kind,
                        |_| Arc::new($conv) as Arc<dyn Converter<$ty>>,
                        || Arc::new($eq) as Arc<dyn StructuralEq<$ty>>,
                    )
                }
            }
        )+
    };
}

scalar_shaped! {
    bool => Bool, BoolConverter, BoolEq;
    char => Char, CharConverter, CharEq;
    u8 => Unsigned, U8Converter, U8Eq;
    u16 => Unsigned, U16Converter, U16Eq;
    u32 => Unsigned, U32Converter, U32Eq;
    u64 => Unsigned, U64Converter, U64Eq;
    i8 => Signed, I8Converter, I8Eq;
    i16 => Signed, I16Converter, I16Eq;
    i32 => Signed, I32Converter, I32Eq;
    i64 => Signed, I64Converter, I64Eq;
    f32 => Float, F32Converter, F32Eq;
    f64 => Float, F64Converter, F64Eq;
    String => String, StringConverter, StringEq;
    Bytes => Bytes, BytesConverter, BytesEq;
    Binary => Bytes, BinaryConverter, BinaryEq;
    Timestamp => Timestamp, TimestampConverter, TimestampEq;
}

impl Shaped for Arc<str> {
    fn shape() -> Shape<Self> {
        Shape::scalar(
            ScalarKind::String,
            |config| {
                Arc::new(ArcStrConverter {
                    intern: config.intern_strings,
                }) as Arc<dyn Converter<Arc<str>>>
            },
            || Arc::new(StrEq) as Arc<dyn StructuralEq<Arc<str>>>,
        )
    }
}

struct OptionFacet<E>(PhantomData<fn() -> E>);

impl<E: Shaped> Facet<Option<E>> for OptionFacet<E> {
    fn build_converter(
        &self,
        gen: &mut Generation<'_>,
    ) -> Result<Arc<dyn Converter<Option<E>>>> {
        Ok(Arc::new(OptionalConverter {
            inner: gen.converter_for::<E>()?,
        }))
    }
    fn build_equality(
        &self,
        gen: &mut EqGeneration<'_>,
    ) -> Result<Arc<dyn StructuralEq<Option<E>>>> {
        Ok(Arc::new(OptionEq {
            inner: gen.comparer_for::<E>()?,
        }))
    }
}

impl<E: Shaped> Shaped for Option<E> {
    fn shape() -> Shape<Self> {
        Shape {
            kind: ShapeKind::Optional(Arc::new(OptionFacet::<E>(PhantomData))),
        }
    }
}

struct BoxFacet<E>(PhantomData<fn() -> E>);

impl<E: Shaped> Facet<Box<E>> for BoxFacet<E> {
    fn build_converter(&self, gen: &mut Generation<'_>) -> Result<Arc<dyn Converter<Box<E>>>> {
        Ok(Arc::new(BoxConverter {
            inner: gen.converter_for::<E>()?,
        }))
    }
    fn build_equality(
        &self,
        gen: &mut EqGeneration<'_>,
    ) -> Result<Arc<dyn StructuralEq<Box<E>>>> {
        Ok(Arc::new(BoxEq {
            inner: gen.comparer_for::<E>()?,
        }))
    }
}

/// Boxes are wire-transparent; the indirection exists so recursive shapes
/// can tie their knot.
impl<E: Shaped> Shaped for Box<E> {
    fn shape() -> Shape<Self> {
        Shape {
            kind: ShapeKind::Surrogate(Arc::new(BoxFacet::<E>(PhantomData))),
        }
    }
}

struct SeqFacet<E>(PhantomData<fn() -> E>);

impl<E: Shaped> Facet<Vec<E>> for SeqFacet<E> {
    fn build_converter(&self, gen: &mut Generation<'_>) -> Result<Arc<dyn Converter<Vec<E>>>> {
        Ok(Arc::new(SequenceConverter {
            inner: gen.converter_for::<E>()?,
        }))
    }
    fn build_equality(
        &self,
        gen: &mut EqGeneration<'_>,
    ) -> Result<Arc<dyn StructuralEq<Vec<E>>>> {
        Ok(Arc::new(SeqEq {
            inner: gen.comparer_for::<E>()?,
        }))
    }
}

impl<E: Shaped> Shaped for Vec<E> {
    fn shape() -> Shape<Self> {
        Shape {
            kind: ShapeKind::Sequence(Arc::new(SeqFacet::<E>(PhantomData))),
        }
    }
}

struct FixedArrayFacet<E, const N: usize>(PhantomData<fn() -> E>);

impl<E: Shaped, const N: usize> Facet<[E; N]> for FixedArrayFacet<E, N> {
    fn build_converter(&self, gen: &mut Generation<'_>) -> Result<Arc<dyn Converter<[E; N]>>> {
        Ok(Arc::new(FixedArrayConverter::<E, N> {
            inner: gen.converter_for::<E>()?,
        }))
    }
    fn build_equality(
        &self,
        gen: &mut EqGeneration<'_>,
    ) -> Result<Arc<dyn StructuralEq<[E; N]>>> {
        Ok(Arc::new(FixedArrayEq::<E, N> {
            inner: gen.comparer_for::<E>()?,
        }))
    }
}

impl<E: Shaped, const N: usize> Shaped for [E; N] {
    fn shape() -> Shape<Self> {
        Shape {
            kind: ShapeKind::Sequence(Arc::new(FixedArrayFacet::<E, N>(PhantomData))),
        }
    }
}

struct MapFacet<K, V, M>(PhantomData<fn() -> (K, V, M)>);

macro_rules! map_shaped {
    ($map:ident, $($bound:tt)+) => {
        impl<K, V> Facet<$map<K, V>> for MapFacet<K, V, $map<K, V>>
        where
            K: Shaped + $($bound)+,
            V: Shaped,
        {
            fn build_converter(
                &self,
                gen: &mut Generation<'_>,
            ) -> Result<Arc<dyn Converter<$map<K, V>>>> {
                Ok(Arc::new(MapConverter {
                    key: gen.converter_for::<K>()?,
                    value: gen.converter_for::<V>()?,
                    _collection: PhantomData,
                }))
            }
            fn build_equality(
                &self,
                gen: &mut EqGeneration<'_>,
            ) -> Result<Arc<dyn StructuralEq<$map<K, V>>>> {
                Ok(Arc::new(MapEq {
                    key: gen.comparer_for::<K>()?,
                    value: gen.comparer_for::<V>()?,
                    _collection: PhantomData::<fn() -> $map<K, V>>,
                }))
            }
        }

        impl<K, V> Shaped for $map<K, V>
        where
            K: Shaped + $($bound)+,
            V: Shaped,
        {
            fn shape() -> Shape<Self> {
                Shape {
                    kind: ShapeKind::Map(Arc::new(MapFacet::<K, V, $map<K, V>>(PhantomData))),
                }
            }
        }
    };
}

map_shaped!(HashMap, Eq + Hash);
map_shaped!(BTreeMap, Ord);

struct SharedFacet<E>(PhantomData<fn() -> E>);

impl<E: Shaped> Facet<Arc<E>> for SharedFacet<E> {
    fn build_converter(&self, gen: &mut Generation<'_>) -> Result<Arc<dyn Converter<Arc<E>>>> {
        let config = gen.config();
        let preserve = config.preserve_references;
        let codes = config.extension_codes;
        Ok(Arc::new(SharedConverter {
            inner: gen.converter_for::<E>()?,
            preserve,
            codes,
        }))
    }
    fn build_equality(
        &self,
        gen: &mut EqGeneration<'_>,
    ) -> Result<Arc<dyn StructuralEq<Arc<E>>>> {
        Ok(Arc::new(SharedEq {
            inner: gen.comparer_for::<E>()?,
        }))
    }
}

/// Shared references participate in reference preservation when the
/// configuration enables it
impl<E: Shaped> Shaped for Arc<E> {
    fn shape() -> Shape<Self> {
        Shape {
            kind: ShapeKind::Reference(Arc::new(SharedFacet::<E>(PhantomData))),
        }
    }
}

struct GridFacet<E>(PhantomData<fn() -> E>);

impl<E: Shaped> Facet<Grid<E>> for GridFacet<E> {
    fn build_converter(&self, gen: &mut Generation<'_>) -> Result<Arc<dyn Converter<Grid<E>>>> {
        let format = gen.config().multi_dim_format;
        Ok(Arc::new(MultiDimConverter {
            inner: gen.converter_for::<E>()?,
            format,
        }))
    }
    fn build_equality(
        &self,
        gen: &mut EqGeneration<'_>,
    ) -> Result<Arc<dyn StructuralEq<Grid<E>>>> {
        Ok(Arc::new(GridEq {
            inner: gen.comparer_for::<E>()?,
        }))
    }
}

impl<E: Shaped> Shaped for Grid<E> {
    fn shape() -> Shape<Self> {
        Shape {
            kind: ShapeKind::MultiDim(Arc::new(GridFacet::<E>(PhantomData))),
        }
    }
}
