//! The object converter: map and array forms, unused-data retention,
//! and the double-assignment guard
// (c) 2025 Ross Younger
//!
//! Serialization emits either a name-keyed map (the default) or, when
//! every property carries an explicit key index, whichever of the compact
//! array form and the index-keyed map form is estimated shorter.
//! Deserialization auto-detects the form by peeking the first token.
//!
//! Incoming keys take a zero-allocation fast path: the UTF-8 bytes are
//! matched against the pre-formatted property names by byte equality.
//! A key resolving to a property that is already filled fails with
//! `DoublePropertyAssignment`. Unknown keys are skipped, or retained
//! byte-for-byte when the type opts in to unused-data retention.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::codec::{Reader, TokenKind, Writer};
use crate::config::{DefaultCategory, DefaultValuesPolicy};
use crate::context::Context;
use crate::convert::registry::Generation;
use crate::convert::strings::PreformattedString;
use crate::convert::Converter;
use crate::error::{Error, Result};
use crate::shape::object::{Ctor, ObjectShape, Property, PropertyFacet, TypedProperty};
use crate::shape::{ShapeKind, Shaped, SlotValues, UnusedData};

/// A property bound into a converter graph: child converter resolved,
/// wire name pre-formatted, accessors erased.
pub(crate) trait BoundProperty<T>: Send + Sync {
    fn declared_name(&self) -> &'static str;
    fn wire_name(&self) -> &PreformattedString;
    fn key(&self) -> Option<u32>;
    fn required(&self) -> bool;
    fn accepts_nil(&self) -> bool;
    fn category(&self) -> DefaultCategory;
    fn write_value(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()>;
    fn is_default(&self, value: &T) -> bool;
    fn read_into(
        &self,
        reader: &mut Reader<'_>,
        slots: &mut SlotValues,
        index: usize,
        cx: &mut Context,
    ) -> Result<()>;
    fn apply_slot(&self, target: &mut T, slots: &mut SlotValues, index: usize) -> Result<()>;
    fn fill_default(&self, slots: &mut SlotValues, index: usize) -> bool;
    fn has_setter(&self) -> bool;
    fn prefers_async(&self) -> bool;
}

struct BoundPropertyImpl<T: 'static, P: 'static> {
    declared_name: &'static str,
    wire_name: PreformattedString,
    key: Option<u32>,
    required: bool,
    accepts_nil: bool,
    category: DefaultCategory,
    get: fn(&T) -> &P,
    set: Option<fn(&mut T, P)>,
    default: Option<fn() -> P>,
    is_default: Option<fn(&P) -> bool>,
    child: Arc<dyn Converter<P>>,
}

impl<T: Send + Sync, P: Send + Sync + 'static> BoundProperty<T> for BoundPropertyImpl<T, P> {
    fn declared_name(&self) -> &'static str {
        self.declared_name
    }
    fn wire_name(&self) -> &PreformattedString {
        &self.wire_name
    }
    fn key(&self) -> Option<u32> {
        self.key
    }
    fn required(&self) -> bool {
        self.required
    }
    fn accepts_nil(&self) -> bool {
        self.accepts_nil
    }
    fn category(&self) -> DefaultCategory {
        self.category
    }

    fn write_value(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()> {
        self.child
            .write(writer, (self.get)(value), cx)
            .map_err(|e| e.within(self.declared_name))
    }

    fn is_default(&self, value: &T) -> bool {
        self.is_default.is_some_and(|f| f((self.get)(value)))
    }

    fn read_into(
        &self,
        reader: &mut Reader<'_>,
        slots: &mut SlotValues,
        index: usize,
        cx: &mut Context,
    ) -> Result<()> {
        let decoded = self
            .child
            .read(reader, cx)
            .map_err(|e| e.within(self.declared_name))?;
        slots.put(index, decoded);
        Ok(())
    }

    fn apply_slot(&self, target: &mut T, slots: &mut SlotValues, index: usize) -> Result<()> {
        let set = self.set.ok_or_else(|| {
            Error::invalid_operation(format!(
                "property '{}' has no setter; use a parameterized constructor",
                self.declared_name
            ))
        })?;
        set(target, slots.take::<P>(index)?);
        Ok(())
    }

    fn fill_default(&self, slots: &mut SlotValues, index: usize) -> bool {
        match self.default {
            Some(default) => {
                slots.put(index, default());
                true
            }
            None => false,
        }
    }

    fn has_setter(&self) -> bool {
        self.set.is_some()
    }

    fn prefers_async(&self) -> bool {
        self.child.prefers_async()
    }
}

impl<T: Send + Sync + 'static, P: Shaped> PropertyFacet<T> for TypedProperty<T, P> {
    fn bind(
        &self,
        meta: &Property<T>,
        gen: &mut Generation<'_>,
    ) -> Result<Arc<dyn BoundProperty<T>>> {
        let child = gen.converter_for::<P>()?;
        let shape = P::shape();
        let wire_name = match meta.explicit_name {
            Some(explicit) => explicit.to_string(),
            None => gen.config().naming_policy.apply(meta.declared_name),
        };
        Ok(Arc::new(BoundPropertyImpl {
            declared_name: meta.declared_name,
            wire_name: PreformattedString::new(&wire_name),
            key: meta.key,
            required: meta.required,
            accepts_nil: matches!(shape.kind, ShapeKind::Optional(_)),
            category: shape.default_category(),
            get: self.get,
            set: self.set,
            default: self.default,
            is_default: self.is_default,
            child,
        }))
    }

    fn bind_equality(
        &self,
        gen: &mut crate::equality::registry::EqGeneration<'_>,
    ) -> Result<Arc<dyn crate::equality::comparers::PropertyEq<T>>> {
        let inner = gen.comparer_for::<P>()?;
        Ok(Arc::new(crate::equality::comparers::PropertyEqImpl {
            get: self.get,
            inner,
        }))
    }
}

/// Builds the object converter for a shape under one configuration
pub(crate) fn build<T: Shaped>(
    shape: &Arc<ObjectShape<T>>,
    gen: &mut Generation<'_>,
) -> Result<Arc<dyn Converter<T>>> {
    if shape.ctor.is_none() {
        return Err(Error::unsupported_type(shape.type_name));
    }

    let mut bound = Vec::with_capacity(shape.properties.len());
    let mut serializable = Vec::new();
    let mut by_name: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut by_key: HashMap<u32, usize> = HashMap::new();
    for (index, property) in shape.properties.iter().enumerate() {
        let b = property.facet.bind(property, gen)?;
        if !property.ignored {
            serializable.push(index);
            if by_name
                .insert(b.wire_name().utf8().to_vec(), index)
                .is_some()
            {
                return Err(Error::invalid_operation(format!(
                    "duplicate property name '{}' on {}",
                    b.wire_name().text(),
                    shape.type_name
                )));
            }
            if let Some(key) = b.key() {
                if by_key.insert(key, index).is_some() {
                    return Err(Error::invalid_operation(format!(
                        "duplicate property key {key} on {}",
                        shape.type_name
                    )));
                }
            }
        }
        bound.push(b);
    }

    if matches!(shape.ctor, Some(Ctor::Default(_))) {
        for &i in &serializable {
            if !bound[i].has_setter() {
                return Err(Error::invalid_operation(format!(
                    "property '{}' on {} has no setter; declare a parameterized constructor",
                    bound[i].declared_name(),
                    shape.type_name
                )));
            }
        }
    }

    let array_form =
        !serializable.is_empty() && serializable.iter().all(|&i| bound[i].key().is_some());
    let retain_unused = gen.config().retain_unused_data && shape.unused_data.is_some();
    let prefers_async = bound.iter().any(|b| b.prefers_async());

    Ok(Arc::new(ObjectConverter {
        shape: Arc::clone(shape),
        bound,
        serializable,
        by_name,
        by_key,
        array_form,
        retain_unused,
        policy: gen.config().default_values,
        prefers_async,
    }))
}

pub(crate) struct ObjectConverter<T: 'static> {
    shape: Arc<ObjectShape<T>>,
    /// Every property, in declaration order (slot index = position)
    bound: Vec<Arc<dyn BoundProperty<T>>>,
    /// Indices of the non-ignored properties
    serializable: Vec<usize>,
    by_name: HashMap<Vec<u8>, usize>,
    by_key: HashMap<u32, usize>,
    array_form: bool,
    retain_unused: bool,
    policy: DefaultValuesPolicy,
    prefers_async: bool,
}

impl<T: Send + Sync + 'static> ObjectConverter<T> {
    /// The non-ignored properties that pass the inclusion filter for `value`
    fn included(&self, value: &T) -> Vec<usize> {
        self.serializable
            .iter()
            .copied()
            .filter(|&i| {
                let b = &self.bound[i];
                !(self.policy.suppresses(b.category()) && b.is_default(value))
            })
            .collect()
    }

    fn write_named_map(
        &self,
        writer: &mut Writer,
        value: &T,
        included: &[usize],
        unused: Option<&UnusedData>,
        cx: &mut Context,
    ) -> Result<()> {
        let extra = unused.map_or(0, UnusedData::len);
        writer.write_map_header(included.len() + extra)?;
        for &i in included {
            let b = &self.bound[i];
            writer.write_raw(b.wire_name().framed());
            b.write_value(writer, value, cx)?;
        }
        if let Some(unused) = unused {
            for (key, val) in unused.entries() {
                writer.write_raw(key);
                writer.write_raw(val);
            }
        }
        Ok(())
    }

    fn write_indexed(
        &self,
        writer: &mut Writer,
        value: &T,
        included: &[usize],
        unused: Option<&UnusedData>,
        cx: &mut Context,
    ) -> Result<()> {
        // Retained unknown entries force the map form: their raw keys
        // cannot be placed in array slots.
        let has_unused = unused.is_some_and(|u| !u.is_empty());
        let highest = included
            .iter()
            .filter_map(|&i| self.bound[i].key())
            .max();
        let array_len = highest.map_or(0, |h| h as usize + 1);

        // Estimate: one slot byte per array element (gaps are nil) versus
        // roughly two bytes per map entry (small integer key + overhead).
        let use_array = !has_unused && array_len <= 2 * included.len();
        if use_array {
            writer.write_array_header(array_len)?;
            for slot in 0..array_len {
                match self.by_key.get(&(slot as u32)) {
                    Some(&i) if self.serializable.contains(&i) => {
                        self.bound[i].write_value(writer, value, cx)?;
                    }
                    _ => writer.write_nil(),
                }
            }
            Ok(())
        } else {
            let extra = unused.map_or(0, UnusedData::len);
            writer.write_map_header(included.len() + extra)?;
            for &i in included {
                let b = &self.bound[i];
                // in array form every serializable property has a key
                let key = b.key().unwrap_or_default();
                writer.write_uint(u64::from(key));
                b.write_value(writer, value, cx)?;
            }
            if let Some(unused) = unused {
                for (key, val) in unused.entries() {
                    writer.write_raw(key);
                    writer.write_raw(val);
                }
            }
            Ok(())
        }
    }

    fn read_map_entries(
        &self,
        reader: &mut Reader<'_>,
        slots: &mut SlotValues,
        unused: &mut Option<UnusedData>,
        cx: &mut Context,
    ) -> Result<()> {
        let pairs = reader.read_map_header()?;
        for _ in 0..pairs {
            let key_start = reader.position();
            let resolved = match reader.peek_kind()? {
                TokenKind::String => {
                    let bytes = reader.read_str_bytes()?;
                    self.by_name.get(bytes).copied()
                }
                TokenKind::Integer if self.array_form => {
                    let key = reader.read_u64()?;
                    u32::try_from(key)
                        .ok()
                        .and_then(|k| self.by_key.get(&k))
                        .copied()
                }
                _ => {
                    reader.skip_structure()?;
                    None
                }
            };
            match resolved {
                Some(index) => {
                    if slots.is_filled(index) {
                        return Err(Error::double_assignment(
                            self.bound[index].declared_name(),
                        ));
                    }
                    self.bound[index].read_into(reader, slots, index, cx)?;
                }
                None => {
                    let key_end = reader.position();
                    let value_raw = reader.read_raw_structure()?;
                    if let Some(packet) = unused.as_mut() {
                        let key_raw = reader.slice_between(key_start, key_end);
                        packet.push(
                            Bytes::copy_from_slice(key_raw),
                            Bytes::copy_from_slice(value_raw),
                        );
                    } else {
                        tracing::debug!(
                            type_name = self.shape.type_name,
                            "skipping unrecognized property"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn read_array_elements(
        &self,
        reader: &mut Reader<'_>,
        slots: &mut SlotValues,
        cx: &mut Context,
    ) -> Result<()> {
        let count = reader.read_array_header()?;
        for slot in 0..count {
            let index = u32::try_from(slot).ok().and_then(|s| self.by_key.get(&s));
            match index {
                Some(&i) => {
                    let b = &self.bound[i];
                    // A nil slot is a gap unless the property itself is
                    // optional (then nil is its legitimate absent value).
                    if !b.accepts_nil() && reader.try_read_nil()? {
                        continue;
                    }
                    if slots.is_filled(i) {
                        return Err(Error::double_assignment(b.declared_name()));
                    }
                    b.read_into(reader, slots, i, cx)?;
                }
                // out-of-range or keyless slots are consumed and ignored
                // so older readers tolerate schema growth
                None => reader.skip_structure()?,
            }
        }
        Ok(())
    }

    fn construct(&self, mut slots: SlotValues, unused: Option<UnusedData>) -> Result<T> {
        // ctor presence is checked at build time
        let ctor = self
            .shape
            .ctor
            .as_ref()
            .ok_or_else(|| Error::unsupported_type(self.shape.type_name))?;
        let mut value = match ctor {
            Ctor::Default(new) => {
                let mut value = new();
                for (index, b) in self.bound.iter().enumerate() {
                    if !slots.is_filled(index) {
                        if b.required() {
                            return Err(Error::missing_required(b.declared_name()));
                        }
                        // absent and no explicit default: the constructed
                        // default stands
                        if !b.fill_default(&mut slots, index) {
                            continue;
                        }
                    }
                    if b.has_setter() {
                        b.apply_slot(&mut value, &mut slots, index)?;
                    }
                }
                value
            }
            Ctor::Args(construct) => {
                for (index, b) in self.bound.iter().enumerate() {
                    if slots.is_filled(index) {
                        continue;
                    }
                    if b.required() || !b.fill_default(&mut slots, index) {
                        return Err(Error::missing_required(b.declared_name()));
                    }
                }
                construct(&mut slots)?
            }
        };
        if let (Some(slot), Some(packet)) = (&self.shape.unused_data, unused) {
            if !packet.is_empty() {
                (slot.set)(&mut value, packet);
            }
        }
        Ok(value)
    }

    fn write_inner(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()> {
        cx.enter()?;
        let result = (|| {
            let included = self.included(value);
            let unused = if self.retain_unused {
                self.shape
                    .unused_data
                    .as_ref()
                    .map(|slot| (slot.get)(value))
                    .filter(|u| !u.is_empty())
            } else {
                None
            };
            if self.array_form {
                self.write_indexed(writer, value, &included, unused, cx)
            } else {
                self.write_named_map(writer, value, &included, unused, cx)
            }
        })();
        cx.leave();
        result
    }
}

impl<T: Send + Sync + 'static> Converter<T> for ObjectConverter<T> {
    fn write(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()> {
        // Scope the declared-type stack: inside this object, child sites
        // are declared as their property types, so a union ancestor above
        // us must not suppress framing of union-typed descendants.
        let pushed = cx.push_declared(std::any::TypeId::of::<T>());
        let result = self.write_inner(writer, value, cx);
        if pushed {
            cx.pop_declared();
        }
        result
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<T> {
        cx.enter()?;
        let result = (|| {
            let mut slots = SlotValues::new(self.bound.len());
            let mut unused = self.retain_unused.then(UnusedData::default);
            let start = reader.position();
            match reader.peek_kind()? {
                TokenKind::Map => {
                    self.read_map_entries(reader, &mut slots, &mut unused, cx)?;
                }
                TokenKind::Array if self.array_form => {
                    self.read_array_elements(reader, &mut slots, cx)?;
                }
                other => {
                    return Err(Error::malformed(
                        start,
                        format!(
                            "expected a map{} for {}, found {other}",
                            if self.array_form { " or array" } else { "" },
                            self.shape.type_name
                        ),
                    ));
                }
            }
            self.construct(slots, unused)
        })();
        cx.leave();
        result.map_err(|e| e.within(self.shape.type_name))
    }

    fn prefers_async(&self) -> bool {
        self.prefers_async
    }

    fn skip_to_property(
        &self,
        reader: &mut Reader<'_>,
        name: &str,
        cx: &mut Context,
    ) -> Result<bool> {
        cx.check_cancelled()?;
        let pairs = reader.read_map_header()?;
        for _ in 0..pairs {
            let matched = match reader.peek_kind()? {
                TokenKind::String => reader.read_str_bytes()? == name.as_bytes(),
                _ => {
                    reader.skip_structure()?;
                    false
                }
            };
            if matched {
                return Ok(true);
            }
            reader.skip_structure()?;
        }
        Ok(false)
    }

    fn skip_to_index(&self, reader: &mut Reader<'_>, key: u32, cx: &mut Context) -> Result<bool> {
        cx.check_cancelled()?;
        match reader.peek_kind()? {
            TokenKind::Array => {
                let count = reader.read_array_header()?;
                let target = key as usize;
                if target >= count {
                    for _ in 0..count {
                        reader.skip_structure()?;
                    }
                    return Ok(false);
                }
                for _ in 0..target {
                    reader.skip_structure()?;
                }
                Ok(true)
            }
            TokenKind::Map => {
                let pairs = reader.read_map_header()?;
                for _ in 0..pairs {
                    let matched = match reader.peek_kind()? {
                        TokenKind::Integer => reader.read_u64()? == u64::from(key),
                        _ => {
                            reader.skip_structure()?;
                            false
                        }
                    };
                    if matched {
                        return Ok(true);
                    }
                    reader.skip_structure()?;
                }
                Ok(false)
            }
            _ => Err(Error::malformed(
                reader.position(),
                "expected a map or array",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::{Reader, Writer};
    use crate::config::{DefaultValuesPolicy, SerializerConfig};
    use crate::context::Context;
    use crate::convert::ConverterRegistry;
    use crate::error::Result;
    use crate::shape::{ObjectShape, PropertyDef, Shape, Shaped};
    use pretty_assertions::assert_eq;

    /// Four keyed properties at indices 0..=3: the densest layout, which
    /// should always pick the array form
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Dense {
        a: u8,
        b: u8,
        c: u8,
        d: u8,
    }

    impl Shaped for Dense {
        fn shape() -> Shape<Self> {
            ObjectShape::new("Dense")
                .with_default_ctor(Dense::default)
                .with_property(
                    PropertyDef::new("a", |x: &Dense| &x.a)
                        .with_setter(|x, v| x.a = v)
                        .with_key(0)
                        .suppressible(),
                )
                .with_property(
                    PropertyDef::new("b", |x: &Dense| &x.b)
                        .with_setter(|x, v| x.b = v)
                        .with_key(1)
                        .suppressible(),
                )
                .with_property(
                    PropertyDef::new("c", |x: &Dense| &x.c)
                        .with_setter(|x, v| x.c = v)
                        .with_key(2)
                        .suppressible(),
                )
                .with_property(
                    PropertyDef::new("d", |x: &Dense| &x.d)
                        .with_setter(|x, v| x.d = v)
                        .with_key(3)
                        .suppressible(),
                )
                .into_shape()
        }
    }

    fn encode(config: SerializerConfig, value: &Dense) -> Result<Vec<u8>> {
        let registry = ConverterRegistry::new(config);
        let conv = registry.converter_for::<Dense>()?;
        let mut w = Writer::new();
        conv.write(&mut w, value, &mut Context::new(16))?;
        Ok(w.into_vec())
    }

    fn decode(config: SerializerConfig, bytes: &[u8]) -> Result<Dense> {
        let registry = ConverterRegistry::new(config);
        let conv = registry.converter_for::<Dense>()?;
        conv.read(&mut Reader::new(bytes), &mut Context::new(16))
    }

    #[test]
    fn fully_populated_uses_the_array_form() -> Result<()> {
        let value = Dense {
            a: 1,
            b: 2,
            c: 3,
            d: 4,
        };
        let bytes = encode(SerializerConfig::default(), &value)?;
        assert_eq!(bytes, [0x94, 1, 2, 3, 4]);
        assert_eq!(decode(SerializerConfig::default(), &bytes)?, value);
        Ok(())
    }

    #[test]
    fn mid_array_defaults_are_still_written() -> Result<()> {
        // Only the trailing run of defaults may be trimmed; a default in
        // the middle keeps its slot so later elements stay addressable.
        let config = SerializerConfig::default().with_default_values(DefaultValuesPolicy::Never);
        let value = Dense {
            a: 1,
            b: 0,
            c: 3,
            d: 0,
        };
        let bytes = encode(config.clone(), &value)?;
        assert_eq!(bytes, [0x93, 1, 0, 3]);
        assert_eq!(decode(config, &bytes)?, value);
        Ok(())
    }

    #[test]
    fn all_default_collapses_to_an_empty_array() -> Result<()> {
        let config = SerializerConfig::default().with_default_values(DefaultValuesPolicy::Never);
        let bytes = encode(config.clone(), &Dense::default())?;
        assert_eq!(bytes, [0x90]);
        assert_eq!(decode(config, &bytes)?, Dense::default());
        Ok(())
    }

    #[test]
    fn nil_array_slots_are_gaps_not_values() -> Result<()> {
        // [nil, 9]: slot 0 absent, slot 1 = 9
        let decoded = decode(SerializerConfig::default(), &[0x92, 0xc0, 0x09])?;
        assert_eq!(
            decoded,
            Dense {
                a: 0,
                b: 9,
                c: 0,
                d: 0
            }
        );
        Ok(())
    }
}
