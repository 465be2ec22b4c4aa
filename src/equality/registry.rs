//! Comparer registry: the same caching and delayed-value machinery as the
//! converter registry, producing structural comparers instead
// (c) 2025 Ross Younger

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::equality::comparers;
use crate::equality::StructuralEq;
use crate::error::{Error, Result};
use crate::shape::{Shape, ShapeKind, Shaped};

type Erased = Arc<dyn Any + Send + Sync>;

/// Caches one comparer per type. Comparers do not depend on serializer
/// configuration, so the cache is keyed by type identity alone.
#[derive(Default)]
pub struct EqualityRegistry {
    cache: RwLock<HashMap<TypeId, Erased>>,
}

impl std::fmt::Debug for EqualityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let population = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("EqualityRegistry")
            .field("cached", &population)
            .finish()
    }
}

impl EqualityRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the comparer for `T`, building the reachable graph on
    /// first request
    pub fn comparer_for<T: Shaped>(&self) -> Result<Arc<dyn StructuralEq<T>>> {
        if let Some(hit) = self.lookup::<T>() {
            return Ok(hit);
        }
        let mut generation = EqGeneration {
            registry: self,
            in_progress: HashMap::new(),
            completed: Vec::new(),
        };
        let built = generation.comparer_for::<T>()?;
        let completed = generation.completed;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        for (id, erased) in completed {
            let _ = cache.entry(id).or_insert(erased);
        }
        Ok(built)
    }

    fn lookup<T: Shaped>(&self) -> Option<Arc<dyn StructuralEq<T>>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&TypeId::of::<T>())
            .and_then(|erased| erased.downcast_ref::<Arc<dyn StructuralEq<T>>>())
            .cloned()
    }
}

/// A comparer placeholder forwarding through a one-shot cell.
///
/// The cell is always settled before any value flows through the graph;
/// an unsettled placeholder can only be reached by misusing the build
/// internals, so it degrades to inequality rather than panicking.
pub(crate) struct DelayedEq<T> {
    cell: OnceLock<Arc<dyn StructuralEq<T>>>,
}

impl<T: Send + Sync + 'static> StructuralEq<T> for DelayedEq<T> {
    fn equals(&self, left: &T, right: &T) -> bool {
        self.cell
            .get()
            .is_some_and(|inner| inner.equals(left, right))
    }
    fn hash(&self, value: &T) -> u64 {
        self.cell.get().map_or(0, |inner| inner.hash(value))
    }
}

/// One comparer build frame, mirroring the converter generation
pub(crate) struct EqGeneration<'r> {
    registry: &'r EqualityRegistry,
    in_progress: HashMap<TypeId, Erased>,
    completed: Vec<(TypeId, Erased)>,
}

impl EqGeneration<'_> {
    /// Returns the comparer for a child shape: cached, delayed, or built
    pub(crate) fn comparer_for<T: Shaped>(&mut self) -> Result<Arc<dyn StructuralEq<T>>> {
        let id = TypeId::of::<T>();
        if let Some(hit) = self.registry.lookup::<T>() {
            return Ok(hit);
        }
        if let Some(placeholder) = self.in_progress.get(&id) {
            let delayed = Arc::clone(placeholder)
                .downcast::<DelayedEq<T>>()
                .map_err(|_| Error::invalid_operation("comparer cache type confusion"))?;
            return Ok(delayed as Arc<dyn StructuralEq<T>>);
        }

        let delayed = Arc::new(DelayedEq::<T> {
            cell: OnceLock::new(),
        });
        let _ = self.in_progress.insert(id, Arc::clone(&delayed) as Erased);
        let shape = T::shape();
        let result = self.build(&shape);
        let _ = self.in_progress.remove(&id);
        let built = result?;
        let _ = delayed.cell.set(Arc::clone(&built));
        self.completed
            .push((id, Arc::new(Arc::clone(&built)) as Erased));
        Ok(built)
    }

    /// The parallel visitor: one arm per shape variant
    fn build<T: Shaped>(&mut self, shape: &Shape<T>) -> Result<Arc<dyn StructuralEq<T>>> {
        match &shape.kind {
            ShapeKind::Scalar(scalar) => Ok((scalar.make_equality)()),
            ShapeKind::Enum(shape) => Ok(Arc::new(comparers::EnumEq {
                to_ordinal: shape.to_ordinal,
            })),
            ShapeKind::Optional(facet)
            | ShapeKind::Sequence(facet)
            | ShapeKind::Map(facet)
            | ShapeKind::Surrogate(facet)
            | ShapeKind::Reference(facet)
            | ShapeKind::MultiDim(facet) => facet.build_equality(self),
            ShapeKind::Object(shape) => comparers::build_object_eq(shape, self),
            ShapeKind::Union(shape) => comparers::build_union_eq(shape, self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EqualityRegistry;
    use crate::error::Result;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn comparers_are_cached() -> Result<()> {
        let registry = EqualityRegistry::new();
        let a = registry.comparer_for::<Vec<u32>>()?;
        let b = registry.comparer_for::<Vec<u32>>()?;
        assert!(Arc::ptr_eq(&a, &b));
        Ok(())
    }

    #[test]
    fn hashes_are_stable_within_a_process() -> Result<()> {
        let registry = EqualityRegistry::new();
        let cmp = registry.comparer_for::<String>()?;
        let v = "stable".to_string();
        assert_eq!(cmp.hash(&v), cmp.hash(&v));
        Ok(())
    }
}
