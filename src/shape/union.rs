//! Union shapes: discriminated polymorphism over a closed case list
// (c) 2025 Ross Younger
//!
//! A [`UnionShape`] maps a Rust enum (or any sum-like type) onto the
//! two-element `[discriminator, payload]` wire framing. Each case pairs an
//! ordered case index (and optional string alias) with projection and
//! injection functions between the union type and the case's payload
//! type. An optional fallback case carries values of the base type itself
//! under a nil discriminator.

use std::sync::Arc;

use crate::convert::registry::Generation;
use crate::convert::union::BoundCase;
use crate::equality::comparers::CaseEq;
use crate::equality::registry::EqGeneration;
use crate::error::Result;
use crate::shape::{Shape, ShapeKind, Shaped};

/// Erased per-case build capability
pub(crate) trait UnionCaseFacet<T>: Send + Sync {
    fn bind(&self, gen: &mut Generation<'_>) -> Result<Arc<dyn BoundCase<T>>>;
    fn bind_equality(&self, gen: &mut EqGeneration<'_>) -> Result<Arc<dyn CaseEq<T>>>;
}

/// Typed projection/injection pair for a case with payload type `C`
pub(crate) struct TypedCase<T, C> {
    pub(crate) project: fn(&T) -> Option<&C>,
    pub(crate) inject: fn(C) -> T,
}

/// One registered case of a union
pub(crate) struct UnionCase<T: 'static> {
    pub(crate) index: u32,
    pub(crate) alias: Option<&'static str>,
    pub(crate) facet: Arc<dyn UnionCaseFacet<T>>,
}

/// The shape of a discriminated union
pub struct UnionShape<T: 'static> {
    pub(crate) type_name: &'static str,
    pub(crate) cases: Vec<UnionCase<T>>,
    pub(crate) fallback: Option<Arc<dyn UnionCaseFacet<T>>>,
}

impl<T: Send + Sync + 'static> UnionShape<T> {
    /// Starts a union shape
    #[must_use]
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            cases: Vec::new(),
            fallback: None,
        }
    }

    /// Registers a case under an integer discriminator.
    ///
    /// Cases are matched for serialization in registration order, so
    /// register more specific cases first.
    #[must_use]
    pub fn with_case<C: Shaped>(
        mut self,
        index: u32,
        project: fn(&T) -> Option<&C>,
        inject: fn(C) -> T,
    ) -> Self {
        self.cases.push(UnionCase {
            index,
            alias: None,
            facet: Arc::new(TypedCase { project, inject }),
        });
        self
    }

    /// Registers a case that serializes its discriminator as a string
    /// alias instead of the case index. The index remains registered, so
    /// readers accept either form.
    #[must_use]
    pub fn with_aliased_case<C: Shaped>(
        mut self,
        index: u32,
        alias: &'static str,
        project: fn(&T) -> Option<&C>,
        inject: fn(C) -> T,
    ) -> Self {
        self.cases.push(UnionCase {
            index,
            alias: Some(alias),
            facet: Arc::new(TypedCase { project, inject }),
        });
        self
    }

    /// Registers the fallback carrying values of the base type itself,
    /// framed with a nil discriminator
    #[must_use]
    pub fn with_fallback<C: Shaped>(
        mut self,
        project: fn(&T) -> Option<&C>,
        inject: fn(C) -> T,
    ) -> Self {
        self.fallback = Some(Arc::new(TypedCase { project, inject }));
        self
    }

    /// Finishes the shape
    #[must_use]
    pub fn into_shape(self) -> Shape<T> {
        Shape {
            kind: ShapeKind::Union(Arc::new(self)),
        }
    }
}
