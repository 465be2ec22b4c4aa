//! Object shapes: named properties, constructors, unused-data retention
// (c) 2025 Ross Younger
//!
//! An [`ObjectShape`] declares a user aggregate: its properties (each with
//! declared name, optional explicit wire name, optional key index,
//! required/ignore flags, default and accessors) and how instances are
//! constructed — either a default constructor plus setters, or a
//! parameter-accumulating constructor fed from a [`SlotValues`] buffer.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;

use crate::convert::object::BoundProperty;
use crate::convert::registry::Generation;
use crate::equality::comparers::PropertyEq;
use crate::equality::registry::EqGeneration;
use crate::error::{Error, Result};
use crate::shape::{Shape, ShapeKind, Shaped};

/// Raw bytes of map entries a deserializer did not recognize, preserved
/// so that re-serialization reproduces them.
///
/// Entries are whole framed MessagePack structures: `(key, value)` pairs
/// exactly as they appeared on the wire.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UnusedData {
    pub(crate) entries: Vec<(Bytes, Bytes)>,
}

impl UnusedData {
    /// True if nothing was retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of retained key/value pairs
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The retained pairs, as raw framed bytes
    pub fn entries(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    pub(crate) fn push(&mut self, key: Bytes, value: Bytes) {
        self.entries.push((key, value));
    }
}

/// Accessors for the designated private property holding an object's
/// [`UnusedData`] packet
pub(crate) struct UnusedDataSlot<T> {
    pub(crate) get: fn(&T) -> &UnusedData,
    pub(crate) set: fn(&mut T, UnusedData),
}

/// Indexed buffer of decoded property values, accumulated before a
/// parameterized constructor runs.
#[derive(Default)]
pub struct SlotValues {
    slots: Vec<Option<Box<dyn Any + Send>>>,
}

impl std::fmt::Debug for SlotValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filled: Vec<usize> = (0..self.slots.len()).filter(|&i| self.is_filled(i)).collect();
        f.debug_struct("SlotValues")
            .field("len", &self.slots.len())
            .field("filled", &filled)
            .finish()
    }
}

impl SlotValues {
    pub(crate) fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self { slots }
    }

    pub(crate) fn put<P: Any + Send>(&mut self, index: usize, value: P) {
        self.slots[index] = Some(Box::new(value));
    }

    pub(crate) fn is_filled(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Option::is_some)
    }

    /// Removes and downcasts the value accumulated at `index`.
    /// Constructor closures call this once per parameter.
    pub fn take<P: Any>(&mut self, index: usize) -> Result<P> {
        let boxed = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| {
                Error::invalid_operation(format!("constructor slot {index} was not filled"))
            })?;
        boxed.downcast::<P>().map(|b| *b).map_err(|_| {
            Error::invalid_operation(format!("constructor slot {index} holds a different type"))
        })
    }
}

/// How instances of an object type are produced during deserialization
pub(crate) enum Ctor<T> {
    /// Default-construct, then assign each decoded property via its setter
    Default(fn() -> T),
    /// Accumulate decoded properties into slots, then construct in one call
    Args(Arc<dyn Fn(&mut SlotValues) -> Result<T> + Send + Sync>),
}

/// Erased per-property build capability. The typed impl closes over the
/// property's value type and produces the bound forms the object
/// converter and comparer work with.
pub(crate) trait PropertyFacet<T>: Send + Sync {
    fn bind(
        &self,
        meta: &Property<T>,
        gen: &mut Generation<'_>,
    ) -> Result<Arc<dyn BoundProperty<T>>>;
    fn bind_equality(&self, gen: &mut EqGeneration<'_>) -> Result<Arc<dyn PropertyEq<T>>>;
}

/// One property of an [`ObjectShape`]
pub struct Property<T: 'static> {
    pub(crate) declared_name: &'static str,
    pub(crate) explicit_name: Option<&'static str>,
    pub(crate) key: Option<u32>,
    pub(crate) required: bool,
    pub(crate) ignored: bool,
    pub(crate) facet: Arc<dyn PropertyFacet<T>>,
}

impl<T> Property<T> {
    /// The name as declared in source
    #[must_use]
    pub fn declared_name(&self) -> &'static str {
        self.declared_name
    }
}

/// Typed accessor bundle for a property of value type `P` on object `T`.
/// Erased behind [`PropertyFacet`] once the property is finished.
pub(crate) struct TypedProperty<T, P> {
    pub(crate) get: fn(&T) -> &P,
    pub(crate) set: Option<fn(&mut T, P)>,
    pub(crate) default: Option<fn() -> P>,
    pub(crate) is_default: Option<fn(&P) -> bool>,
}

/// Fluent builder for one property. Finish by passing it to
/// [`ObjectShape::with_property`].
pub struct PropertyDef<T: 'static, P: 'static> {
    declared_name: &'static str,
    explicit_name: Option<&'static str>,
    key: Option<u32>,
    required: bool,
    ignored: bool,
    typed: TypedProperty<T, P>,
    _marker: PhantomData<fn() -> P>,
}

impl<T: Send + Sync + 'static, P: Shaped> PropertyDef<T, P> {
    /// Starts a property from its declared name and getter
    #[must_use]
    pub fn new(declared_name: &'static str, get: fn(&T) -> &P) -> Self {
        Self {
            declared_name,
            explicit_name: None,
            key: None,
            required: false,
            ignored: false,
            typed: TypedProperty {
                get,
                set: None,
                default: None,
                is_default: None,
            },
            _marker: PhantomData,
        }
    }

    /// Provides the setter used by the default-constructor deserialization
    /// path. Without one, the object must use a parameterized constructor.
    #[must_use]
    pub fn with_setter(mut self, set: fn(&mut T, P)) -> Self {
        self.typed.set = Some(set);
        self
    }

    /// Sets an explicit serialization name, bypassing the naming policy
    #[must_use]
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.explicit_name = Some(name);
        self
    }

    /// Assigns a key index, enabling the compact array form when every
    /// property of the object carries one
    #[must_use]
    pub fn with_key(mut self, key: u32) -> Self {
        self.key = Some(key);
        self
    }

    /// Marks the property required: absent on deserialize fails with
    /// `MissingRequired`
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Excludes the property from serialization entirely
    #[must_use]
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Provides an explicit default, used to fill the constructor slot
    /// when the property is absent from the input
    #[must_use]
    pub fn with_default(mut self, default: fn() -> P) -> Self {
        self.typed.default = Some(default);
        self
    }

    /// Enables default-value detection for the serialize-default-values
    /// policy, using `P`'s own `Default`/`PartialEq`
    #[must_use]
    pub fn suppressible(mut self) -> Self
    where
        P: Default + PartialEq,
    {
        self.typed.is_default = Some(|p| *p == P::default());
        self
    }

    fn into_property(self) -> Property<T> {
        Property {
            declared_name: self.declared_name,
            explicit_name: self.explicit_name,
            key: self.key,
            required: self.required,
            ignored: self.ignored,
            facet: Arc::new(self.typed),
        }
    }
}

/// The shape of a user aggregate with named properties
pub struct ObjectShape<T: 'static> {
    pub(crate) type_name: &'static str,
    pub(crate) properties: Vec<Property<T>>,
    pub(crate) ctor: Option<Ctor<T>>,
    pub(crate) unused_data: Option<UnusedDataSlot<T>>,
}

impl<T: Send + Sync + 'static> ObjectShape<T> {
    /// Starts an object shape
    #[must_use]
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            properties: Vec::new(),
            ctor: None,
            unused_data: None,
        }
    }

    /// Declares the type default-constructible; decoded properties are
    /// applied through their setters
    #[must_use]
    pub fn with_default_ctor(mut self, new: fn() -> T) -> Self {
        self.ctor = Some(Ctor::Default(new));
        self
    }

    /// Declares a parameterized constructor. The closure draws each
    /// parameter from the [`SlotValues`] buffer by property index
    /// (declaration order).
    #[must_use]
    pub fn with_ctor(
        mut self,
        construct: impl Fn(&mut SlotValues) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        self.ctor = Some(Ctor::Args(Arc::new(construct)));
        self
    }

    /// Adds a property
    #[must_use]
    pub fn with_property<P: Shaped>(mut self, def: PropertyDef<T, P>) -> Self {
        self.properties.push(def.into_property());
        self
    }

    /// Designates the private property that retains unrecognized map
    /// entries across a deserialize/re-serialize round trip
    #[must_use]
    pub fn with_unused_data(
        mut self,
        get: fn(&T) -> &UnusedData,
        set: fn(&mut T, UnusedData),
    ) -> Self {
        self.unused_data = Some(UnusedDataSlot { get, set });
        self
    }

    /// Finishes the shape
    #[must_use]
    pub fn into_shape(self) -> Shape<T> {
        Shape {
            kind: ShapeKind::Object(Arc::new(self)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SlotValues;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn slots_fill_and_drain() {
        let mut slots = SlotValues::new(2);
        assert!(!slots.is_filled(0));
        slots.put(0, "hello".to_string());
        slots.put(1, 42u32);
        assert!(slots.is_filled(0));
        assert_eq!(slots.take::<String>(0).unwrap(), "hello");
        assert_eq!(slots.take::<u32>(1).unwrap(), 42);
        // second take of the same slot fails
        assert_eq!(
            slots.take::<u32>(1).unwrap_err().kind(),
            ErrorKind::InvalidOperation
        );
    }

    #[test]
    fn wrong_type_take_is_detected() {
        let mut slots = SlotValues::new(1);
        slots.put(0, 1u8);
        assert_eq!(
            slots.take::<u16>(0).unwrap_err().kind(),
            ErrorKind::InvalidOperation
        );
    }
}
