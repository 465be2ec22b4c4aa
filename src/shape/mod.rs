//! Type shapes: the abstract descriptions that drive serialization
// (c) 2025 Ross Younger
//!
//! A [`Shape`] describes a user type well enough for the converter graph
//! builder and the structural-equality builder to walk it: scalar, enum,
//! optional, sequence, keyed map, object with named properties, union,
//! surrogate, shared reference, or multi-dimensional array.
//!
//! Types advertise their shape through the [`Shaped`] trait. Impls for the
//! standard scalars and collections ship in this crate; user aggregates
//! build an [`ObjectShape`](object::ObjectShape) or
//! [`UnionShape`](union::UnionShape) with the fluent constructors. The
//! core only consumes the data structure; a code generator or any other
//! provider can produce `Shaped` impls without the core knowing.
//!
//! Element types of erased variants (the `E` in `Option<E>` or `Vec<E>`)
//! are hidden behind per-variant facet objects so that the registry can
//! store converters keyed by [`TypeId`](std::any::TypeId) alone.

pub(crate) mod object;
pub(crate) mod std_impls;
pub(crate) mod union;

use std::sync::Arc;

use crate::config::{DefaultCategory, SerializerConfig};
use crate::convert::registry::Generation;
use crate::convert::Converter;
use crate::equality::registry::EqGeneration;
use crate::equality::StructuralEq;
use crate::error::Result;

pub use object::{ObjectShape, Property, PropertyDef, SlotValues, UnusedData};
pub use std_impls::{Binary, Grid};
pub use union::UnionShape;

/// A type that can describe itself as a [`Shape`].
///
/// This is the plug-in point for shape providers: anything able to produce
/// a `Shaped` impl (hand-written, generated, or derived elsewhere) can be
/// serialized by this crate.
pub trait Shaped: Sized + Send + Sync + 'static {
    /// This type's shape. Called once per converter registry; the result
    /// is walked and then discarded, so it need not be cached.
    fn shape() -> Shape<Self>;
}

/// An abstract description of one type, sufficient to build its converter
/// and its structural comparer.
pub struct Shape<T: 'static> {
    pub(crate) kind: ShapeKind<T>,
}

impl<T: 'static> Clone for Shape<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
        }
    }
}

impl<T: 'static> std::fmt::Debug for Shape<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Shape::{}", self.kind.variant_name())
    }
}

/// The closed set of shape variants
pub(crate) enum ShapeKind<T: 'static> {
    /// A primitive with a dedicated leaf converter
    Scalar(ScalarShape<T>),
    /// An enum over an underlying integer
    Enum(Arc<EnumShape<T>>),
    /// An optional/nullable wrapper around some element type
    Optional(Arc<dyn Facet<T>>),
    /// A uniform sequence of some element type
    Sequence(Arc<dyn Facet<T>>),
    /// A keyed map
    Map(Arc<dyn Facet<T>>),
    /// An object with named properties
    Object(Arc<object::ObjectShape<T>>),
    /// A discriminated union
    Union(Arc<union::UnionShape<T>>),
    /// A type round-tripped through a surrogate type
    Surrogate(Arc<dyn Facet<T>>),
    /// A shared reference, eligible for reference preservation
    Reference(Arc<dyn Facet<T>>),
    /// A rectangular multi-dimensional array
    MultiDim(Arc<dyn Facet<T>>),
}

impl<T: 'static> Clone for ShapeKind<T> {
    fn clone(&self) -> Self {
        match self {
            ShapeKind::Scalar(s) => ShapeKind::Scalar(*s),
            ShapeKind::Enum(e) => ShapeKind::Enum(Arc::clone(e)),
            ShapeKind::Optional(f) => ShapeKind::Optional(Arc::clone(f)),
            ShapeKind::Sequence(f) => ShapeKind::Sequence(Arc::clone(f)),
            ShapeKind::Map(f) => ShapeKind::Map(Arc::clone(f)),
            ShapeKind::Object(o) => ShapeKind::Object(Arc::clone(o)),
            ShapeKind::Union(u) => ShapeKind::Union(Arc::clone(u)),
            ShapeKind::Surrogate(f) => ShapeKind::Surrogate(Arc::clone(f)),
            ShapeKind::Reference(f) => ShapeKind::Reference(Arc::clone(f)),
            ShapeKind::MultiDim(f) => ShapeKind::MultiDim(Arc::clone(f)),
        }
    }
}

impl<T: 'static> ShapeKind<T> {
    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            ShapeKind::Scalar(_) => "Scalar",
            ShapeKind::Enum(_) => "Enum",
            ShapeKind::Optional(_) => "Optional",
            ShapeKind::Sequence(_) => "Sequence",
            ShapeKind::Map(_) => "Map",
            ShapeKind::Object(_) => "Object",
            ShapeKind::Union(_) => "Union",
            ShapeKind::Surrogate(_) => "Surrogate",
            ShapeKind::Reference(_) => "Reference",
            ShapeKind::MultiDim(_) => "MultiDim",
        }
    }
}

/// Erased build capability for shape variants whose element types are
/// hidden. Each impl closes over the concrete element type and re-enters
/// the appropriate generation for its children.
pub(crate) trait Facet<T>: Send + Sync {
    fn build_converter(&self, gen: &mut Generation<'_>) -> Result<Arc<dyn Converter<T>>>;
    fn build_equality(&self, gen: &mut EqGeneration<'_>) -> Result<Arc<dyn StructuralEq<T>>>;
}

/// Which primitive a scalar shape is; drives the default-category
/// classification and diagnostics
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ScalarKind {
    Bool,
    Char,
    Unsigned,
    Signed,
    Float,
    String,
    Bytes,
    Timestamp,
}

/// A scalar shape: a pair of leaf factories plus a kind tag.
///
/// Factories are plain function pointers so the shape stays `Copy`
/// regardless of `T`.
pub(crate) struct ScalarShape<T: 'static> {
    pub(crate) kind: ScalarKind,
    pub(crate) make_converter: fn(&SerializerConfig) -> Arc<dyn Converter<T>>,
    pub(crate) make_equality: fn() -> Arc<dyn StructuralEq<T>>,
}

impl<T: 'static> Clone for ScalarShape<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: 'static> Copy for ScalarShape<T> {}

/// An enum shape: ordinal conversions plus the declared name table, in
/// declaration order.
pub struct EnumShape<T: 'static> {
    pub(crate) type_name: &'static str,
    pub(crate) to_ordinal: fn(&T) -> i64,
    pub(crate) from_ordinal: fn(i64) -> Option<T>,
    pub(crate) entries: Vec<(i64, &'static str)>,
}

impl<T: Send + Sync + 'static> EnumShape<T> {
    /// Starts an enum shape from its ordinal conversions
    #[must_use]
    pub fn new(
        type_name: &'static str,
        to_ordinal: fn(&T) -> i64,
        from_ordinal: fn(i64) -> Option<T>,
    ) -> Self {
        Self {
            type_name,
            to_ordinal,
            from_ordinal,
            entries: Vec::new(),
        }
    }

    /// Declares one named member. Order matters: when names collide
    /// case-insensitively, the first declared wins on read.
    #[must_use]
    pub fn with_entry(mut self, ordinal: i64, name: &'static str) -> Self {
        self.entries.push((ordinal, name));
        self
    }

    /// Finishes the shape
    #[must_use]
    pub fn into_shape(self) -> Shape<T> {
        Shape {
            kind: ShapeKind::Enum(Arc::new(self)),
        }
    }
}

impl<T: 'static> Shape<T> {
    pub(crate) fn scalar(
        kind: ScalarKind,
        make_converter: fn(&SerializerConfig) -> Arc<dyn Converter<T>>,
        make_equality: fn() -> Arc<dyn StructuralEq<T>>,
    ) -> Self {
        Self {
            kind: ShapeKind::Scalar(ScalarShape {
                kind,
                make_converter,
                make_equality,
            }),
        }
    }

    /// Classifies this shape for the per-kind default-suppression masks
    pub(crate) fn default_category(&self) -> DefaultCategory {
        match &self.kind {
            ShapeKind::Scalar(s) => match s.kind {
                ScalarKind::String => DefaultCategory::String,
                ScalarKind::Bytes => DefaultCategory::Collection,
                _ => DefaultCategory::Value,
            },
            ShapeKind::Enum(_) => DefaultCategory::Value,
            ShapeKind::Optional(_) | ShapeKind::Reference(_) => DefaultCategory::Reference,
            ShapeKind::Sequence(_) | ShapeKind::Map(_) | ShapeKind::MultiDim(_) => {
                DefaultCategory::Collection
            }
            ShapeKind::Object(_) | ShapeKind::Union(_) | ShapeKind::Surrogate(_) => {
                DefaultCategory::Other
            }
        }
    }
}

/// Surrogate construction: serialize `T` by converting to `S`, delegating
/// to `S`'s converter, and converting back on read.
impl<T: Send + Sync + 'static> Shape<T> {
    /// Builds a surrogate shape from a bidirectional mapping
    #[must_use]
    pub fn surrogate<S: Shaped>(to_surrogate: fn(&T) -> S, from_surrogate: fn(S) -> T) -> Self {
        struct SurrogateFacet<T, S> {
            to_surrogate: fn(&T) -> S,
            from_surrogate: fn(S) -> T,
        }
        impl<T: Send + Sync + 'static, S: Shaped> Facet<T> for SurrogateFacet<T, S> {
            fn build_converter(&self, gen: &mut Generation<'_>) -> Result<Arc<dyn Converter<T>>> {
                let inner = gen.converter_for::<S>()?;
                Ok(Arc::new(crate::convert::SurrogateConverter {
                    inner,
                    to_surrogate: self.to_surrogate,
                    from_surrogate: self.from_surrogate,
                }))
            }
            fn build_equality(
                &self,
                gen: &mut EqGeneration<'_>,
            ) -> Result<Arc<dyn StructuralEq<T>>> {
                let inner = gen.comparer_for::<S>()?;
                Ok(Arc::new(crate::equality::comparers::SurrogateEq {
                    inner,
                    to_surrogate: self.to_surrogate,
                }))
            }
        }
        Self {
            kind: ShapeKind::Surrogate(Arc::new(SurrogateFacet {
                to_surrogate,
                from_surrogate,
            })),
        }
    }
}
