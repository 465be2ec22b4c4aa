// (c) 2025 Ross Younger

//! `shapepack` is a high-performance, schema-aware serializer and
//! deserializer for the [MessagePack] binary format, driven by *type
//! shapes* over user data models.
//!
//! ## Overview
//!
//! - 🧭 **Shape-driven**: types describe themselves once through the
//!   [`Shaped`] trait (scalar, optional, sequence, map, object, union,
//!   surrogate); the serializer synthesizes and caches one converter per
//!   type, including recursive graphs.
//! - 📦 **Full wire grammar**: every MessagePack encoding family,
//!   shortest-encoding output, range-checked input, and the standard
//!   timestamp extension.
//! - 🔁 **Sync and async agree bit-for-bit**: the async paths prefetch
//!   until a structure is whole, then run the same synchronous converters.
//! - 🔐 **Secure structural hashing**: a parallel visitor over the same
//!   shapes yields deep equality and SipHash-2-4-backed,
//!   collision-resistant 64-bit hashes.
//! - 🛡️ **Defensive by default**: depth limits, cancellation, a
//!   double-assignment guard, and a closed error taxonomy with byte
//!   offsets.
//!
//! ## Quick start
//!
//! ```
//! use shapepack::{
//!     MessagePackSerializer, ObjectShape, PropertyDef, Shape, Shaped,
//! };
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Person {
//!     first_name: String,
//!     last_name: String,
//! }
//!
//! impl Shaped for Person {
//!     fn shape() -> Shape<Self> {
//!         ObjectShape::new("Person")
//!             .with_default_ctor(Person::default)
//!             .with_property(
//!                 PropertyDef::new("first_name", |p: &Person| &p.first_name)
//!                     .with_setter(|p, v| p.first_name = v),
//!             )
//!             .with_property(
//!                 PropertyDef::new("last_name", |p: &Person| &p.last_name)
//!                     .with_setter(|p, v| p.last_name = v),
//!             )
//!             .into_shape()
//!     }
//! }
//!
//! # fn main() -> shapepack::Result<()> {
//! let mp = MessagePackSerializer::default();
//! let person = Person {
//!     first_name: "Andrew".into(),
//!     last_name: "Arnott".into(),
//! };
//! let bytes = mp.serialize(&person)?;
//! assert_eq!(mp.deserialize::<Person>(&bytes)?, person);
//! assert!(mp.deep_equal(&person, &mp.deserialize::<Person>(&bytes)?)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Module | Role |
//! |--------|------|
//! | [`codec`] | Wire grammar: [`Writer`](codec::Writer), [`Reader`](codec::Reader), restartable [`StreamingReader`](codec::StreamingReader), async prefetch |
//! | [`shape`] | The type-shape data model and [`Shaped`] impls for std types |
//! | [`convert`] | The converter trait, registry/graph builder, and per-shape converters |
//! | [`equality`] | The structural equality/hash visitor and SipHash-2-4 |
//! | [`config`] | The configuration surface |
//!
//! ## Configuration
//!
//! All knobs live on [`SerializerConfig`]: depth limits, property naming
//! policies, default-value suppression, enum-as-name mode, reference
//! preservation, string interning, async buffering, extension-code
//! remapping and the multi-dimensional array format.
//!
//! [MessagePack]: https://github.com/msgpack/msgpack/blob/master/spec.md

pub mod codec;
pub mod config;
mod context;
pub mod convert;
pub mod doc;
pub mod equality;
mod error;
mod serializer;
pub mod shape;

pub use codec::{Reader, Timestamp, TokenKind, Writer};
pub use config::{
    DefaultKinds, DefaultValuesPolicy, ExtensionCodes, MultiDimFormat, NamingPolicy,
    SerializerConfig,
};
pub use context::Context;
pub use convert::{Converter, ConverterRegistry, PreformattedString};
pub use equality::{EqualityRegistry, StructuralEq};
pub use error::{Error, ErrorKind, Result};
pub use serializer::MessagePackSerializer;
pub use shape::{
    Binary, EnumShape, Grid, ObjectShape, Property, PropertyDef, Shape, Shaped, SlotValues,
    UnionShape, UnusedData,
};
