//! Converter registry and graph builder
// (c) 2025 Ross Younger
//!
//! The registry is a concurrent map from `(type identity, configuration
//! fingerprint)` to a built converter. Reads are taken under a shared
//! lock; a miss triggers a build *generation* which walks the type's shape
//! and recursively requests converters for child shapes.
//!
//! Recursive types are handled with the delayed-value pattern: when a
//! build re-enters a type that is still under construction, it receives a
//! placeholder converter forwarding through a one-shot cell. The cell is
//! settled when the outer build returns, after which every placeholder
//! built during that frame dispatches directly.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::config::SerializerConfig;
use crate::context::Context;
use crate::convert::{enums, object, union, Converter};
use crate::error::{Error, Result};
use crate::shape::{Shape, ShapeKind, Shaped};

type CacheKey = (TypeId, u64);
type Erased = Arc<dyn Any + Send + Sync>;

/// Caches one converter per `(type, configuration)` pair for the lifetime
/// of the registry. Cheap to share; lock-free on the hot read path apart
/// from the shared lock acquisition.
pub struct ConverterRegistry {
    config: SerializerConfig,
    fingerprint: u64,
    cache: RwLock<HashMap<CacheKey, Erased>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let population = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("ConverterRegistry")
            .field("config", &self.config)
            .field("fingerprint", &self.fingerprint)
            .field("cached", &population)
            .finish()
    }
}

impl ConverterRegistry {
    /// Creates a registry for one configuration
    #[must_use]
    pub fn new(config: SerializerConfig) -> Self {
        let fingerprint = config.fingerprint();
        Self {
            config,
            fingerprint,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The configuration this registry builds for
    #[must_use]
    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Returns the converter for `T`, building (and caching) the whole
    /// reachable graph on first request
    pub fn converter_for<T: Shaped>(&self) -> Result<Arc<dyn Converter<T>>> {
        if let Some(hit) = self.lookup::<T>() {
            return Ok(hit);
        }
        let mut generation = Generation {
            registry: self,
            in_progress: HashMap::new(),
            completed: Vec::new(),
        };
        let built = generation.converter_for::<T>()?;
        let completed = generation.completed;

        // Builds for the same type may race; first insertion wins and the
        // runner-up's graph is dropped. Converters are stateless so either
        // graph is equally valid.
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        for (id, erased) in completed {
            let _ = cache.entry((id, self.fingerprint)).or_insert(erased);
        }
        Ok(built)
    }

    fn lookup<T: Shaped>(&self) -> Option<Arc<dyn Converter<T>>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&(TypeId::of::<T>(), self.fingerprint))
            .and_then(|erased| erased.downcast_ref::<Arc<dyn Converter<T>>>())
            .cloned()
    }
}

/// A converter placeholder forwarding through a one-shot cell, inserted
/// wherever a build re-enters a type still under construction.
pub(crate) struct DelayedConverter<T> {
    cell: OnceLock<Arc<dyn Converter<T>>>,
}

impl<T> DelayedConverter<T> {
    fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    fn settle(&self, converter: Arc<dyn Converter<T>>) {
        // A second settle can only happen on a misbehaving re-entrant
        // build; the first value stands.
        let _ = self.cell.set(converter);
    }

    fn resolved(&self) -> Result<&Arc<dyn Converter<T>>> {
        self.cell.get().ok_or_else(|| {
            Error::invalid_operation("converter used before its graph finished building")
        })
    }
}

impl<T: Send + Sync + 'static> Converter<T> for DelayedConverter<T> {
    fn write(
        &self,
        writer: &mut crate::codec::Writer,
        value: &T,
        cx: &mut Context,
    ) -> Result<()> {
        self.resolved()?.write(writer, value, cx)
    }

    fn read(&self, reader: &mut crate::codec::Reader<'_>, cx: &mut Context) -> Result<T> {
        self.resolved()?.read(reader, cx)
    }

    fn prefers_async(&self) -> bool {
        // Queried during facade setup, potentially before settlement on
        // recursive graphs; a placeholder conservatively reports false.
        self.cell
            .get()
            .is_some_and(|c| c.prefers_async())
    }
}

/// One build frame: gives the shape visitor access to the registry cache,
/// tracks types under construction, and collects finished converters for
/// insertion when the frame completes.
pub(crate) struct Generation<'r> {
    registry: &'r ConverterRegistry,
    in_progress: HashMap<TypeId, Erased>,
    completed: Vec<(TypeId, Erased)>,
}

impl Generation<'_> {
    /// The configuration being built for
    pub(crate) fn config(&self) -> &SerializerConfig {
        &self.registry.config
    }

    /// Returns the converter for a child shape: cached, delayed (if `T` is
    /// the root of a reentrant build), or freshly built.
    pub(crate) fn converter_for<T: Shaped>(&mut self) -> Result<Arc<dyn Converter<T>>> {
        let id = TypeId::of::<T>();
        if let Some(hit) = self.registry.lookup::<T>() {
            return Ok(hit);
        }
        if let Some(placeholder) = self.in_progress.get(&id) {
            let delayed = Arc::clone(placeholder)
                .downcast::<DelayedConverter<T>>()
                .map_err(|_| Error::invalid_operation("converter cache type confusion"))?;
            return Ok(delayed as Arc<dyn Converter<T>>);
        }
        if let Some(overridden) = self.registry.config.converter_override::<T>() {
            self.completed
                .push((id, Arc::new(Arc::clone(&overridden)) as Erased));
            return Ok(overridden);
        }

        let delayed = Arc::new(DelayedConverter::<T>::new());
        let _ = self
            .in_progress
            .insert(id, Arc::clone(&delayed) as Erased);
        let shape = T::shape();
        let result = self.build(&shape);
        let _ = self.in_progress.remove(&id);
        let built = result?;
        delayed.settle(Arc::clone(&built));
        tracing::debug!(type_name = std::any::type_name::<T>(), "built converter");
        self.completed
            .push((id, Arc::new(Arc::clone(&built)) as Erased));
        Ok(built)
    }

    /// The builder visitor: one arm per shape variant
    fn build<T: Shaped>(&mut self, shape: &Shape<T>) -> Result<Arc<dyn Converter<T>>> {
        match &shape.kind {
            ShapeKind::Scalar(scalar) => Ok((scalar.make_converter)(self.config())),
            ShapeKind::Enum(shape) => enums::build(Arc::clone(shape), self),
            ShapeKind::Optional(facet)
            | ShapeKind::Sequence(facet)
            | ShapeKind::Map(facet)
            | ShapeKind::Surrogate(facet)
            | ShapeKind::Reference(facet)
            | ShapeKind::MultiDim(facet) => facet.build_converter(self),
            ShapeKind::Object(shape) => object::build(shape, self),
            ShapeKind::Union(shape) => union::build(shape, self),
        }
    }

}
