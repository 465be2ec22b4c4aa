//! Serializer configuration surface
// (c) 2025 Ross Younger
//!
//! All behavioral knobs live on [`SerializerConfig`]. A configuration is
//! fixed for the lifetime of the facade that owns it; converter caches are
//! keyed by the configuration [fingerprint](SerializerConfig::fingerprint)
//! so that two facades with different settings never share graph nodes.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use heck::{ToKebabCase, ToLowerCamelCase, ToPascalCase, ToSnakeCase};

use crate::convert::Converter;
use crate::equality::siphash::SipHasher24;
use crate::error::{Error, Result};
use crate::shape::Shaped;

/// Default nesting limit (`max-depth`)
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default async buffering threshold (`max-async-buffer`), in bytes
pub const DEFAULT_MAX_ASYNC_BUFFER: usize = 64 * 1024;

/// Case transform applied to *inferred* property names.
///
/// Explicit per-property names (`serialize-as-name`) are emitted verbatim,
/// bypassing the policy.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum NamingPolicy {
    /// Use declared names as-is
    #[default]
    Identity,
    /// `camelCase`
    Camel,
    /// `PascalCase`
    Pascal,
    /// `snake_case`
    Snake,
    /// `kebab-case`
    Kebab,
    /// Caller-supplied transform
    Custom(fn(&str) -> String),
}

impl NamingPolicy {
    /// Applies this policy to a declared property name
    #[must_use]
    pub fn apply(&self, name: &str) -> String {
        match self {
            NamingPolicy::Identity => name.to_string(),
            NamingPolicy::Camel => name.to_lower_camel_case(),
            NamingPolicy::Pascal => name.to_pascal_case(),
            NamingPolicy::Snake => name.to_snake_case(),
            NamingPolicy::Kebab => name.to_kebab_case(),
            NamingPolicy::Custom(f) => f(name),
        }
    }
}

/// Masks for [`DefaultValuesPolicy::Masked`]: which kinds of default-valued
/// properties are suppressed on serialization.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct DefaultKinds {
    /// Suppress absent optional/reference values
    pub reference_defaults: bool,
    /// Suppress zero-equivalent scalar values
    pub value_type_defaults: bool,
    /// Suppress empty collections
    pub collections: bool,
    /// Suppress empty (but present) strings
    pub strings: bool,
}

impl DefaultKinds {
    /// All masks set: equivalent to [`DefaultValuesPolicy::Never`]
    #[must_use]
    pub const fn all() -> Self {
        Self {
            reference_defaults: true,
            value_type_defaults: true,
            collections: true,
            strings: true,
        }
    }
}

/// Governs whether default-valued properties are written at all (§inclusion
/// filter of the object converter).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum DefaultValuesPolicy {
    /// Every serializable property is written
    #[default]
    Always,
    /// Properties whose value equals their type's default are suppressed
    Never,
    /// Only the masked kinds are suppressed
    Masked(DefaultKinds),
}

impl DefaultValuesPolicy {
    /// Does this policy suppress a default-valued property of the given category?
    #[must_use]
    pub(crate) fn suppresses(&self, category: DefaultCategory) -> bool {
        match self {
            DefaultValuesPolicy::Always => false,
            DefaultValuesPolicy::Never => true,
            DefaultValuesPolicy::Masked(kinds) => match category {
                DefaultCategory::Reference => kinds.reference_defaults,
                DefaultCategory::Value => kinds.value_type_defaults,
                DefaultCategory::Collection => kinds.collections,
                DefaultCategory::String => kinds.strings,
                DefaultCategory::Other => false,
            },
        }
    }
}

/// Classification of a property's shape for the per-kind suppression masks
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum DefaultCategory {
    /// Optional / reference-like: default means nil/absent
    Reference,
    /// Plain value scalar (numbers, bool, char, timestamps)
    Value,
    /// Sequences and keyed maps: default means empty
    Collection,
    /// Strings: default means empty-but-present
    String,
    /// Objects, unions and anything else: never mask-suppressed
    Other,
}

/// The extension type codes this library reserves from the 0-127
/// application range, remappable to avoid collisions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ExtensionCodes {
    /// First occurrence of a shared reference: body is the new identity
    /// followed by the encoded payload
    pub reference_id: i8,
    /// Back-reference to a previously assigned identity
    pub back_reference: i8,
}

impl Default for ExtensionCodes {
    fn default() -> Self {
        Self {
            reference_id: 120,
            back_reference: 121,
        }
    }
}

impl ExtensionCodes {
    /// Checks the codes lie in the application range and do not collide
    pub fn validate(&self) -> Result<()> {
        if self.reference_id < 0 || self.back_reference < 0 {
            return Err(Error::invalid_operation(
                "library extension type codes must be in the 0-127 application range",
            ));
        }
        if self.reference_id == self.back_reference {
            return Err(Error::invalid_operation(
                "library extension type codes must be distinct",
            ));
        }
        Ok(())
    }
}

/// Wire format for multi-dimensional arrays
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum MultiDimFormat {
    /// An array of arrays, one per row
    #[default]
    Nested,
    /// One flat array: a dimension-length header array, then the elements
    /// in row-major order
    Flattened,
}

type OverrideMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;
type StateSeed = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// The set of configurable options recognized by the serializer.
///
/// Construct with [`SerializerConfig::default`] and chain the `with_*`
/// builder methods. The configuration is immutable once handed to a
/// [`MessagePackSerializer`](crate::MessagePackSerializer).
#[derive(Clone)]
pub struct SerializerConfig {
    /// Hard cap on structure nesting; exceeding it fails with `DepthExceeded`
    pub max_depth: usize,
    /// Case transform for inferred property names
    pub naming_policy: NamingPolicy,
    /// Whether default-valued properties are serialized
    pub default_values: DefaultValuesPolicy,
    /// When true, enums are written as their declared names (strings)
    pub enum_by_name: bool,
    /// Enables reference deduplication for shared-reference shapes
    pub preserve_references: bool,
    /// Master switch for unused-data retention on opted-in object types
    pub retain_unused_data: bool,
    /// Routes decoded shared strings through the process-wide interning cache
    pub intern_strings: bool,
    /// Byte threshold above which async paths stay async instead of
    /// buffering to a single synchronous write
    pub max_async_buffer: usize,
    /// Remappable reserved extension type codes
    pub extension_codes: ExtensionCodes,
    /// Wire format for multi-dimensional array shapes
    pub multi_dim_format: MultiDimFormat,
    pub(crate) overrides: Arc<OverrideMap>,
    pub(crate) starting_state: Arc<StateSeed>,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            naming_policy: NamingPolicy::default(),
            default_values: DefaultValuesPolicy::default(),
            enum_by_name: false,
            preserve_references: false,
            retain_unused_data: false,
            intern_strings: false,
            max_async_buffer: DEFAULT_MAX_ASYNC_BUFFER,
            extension_codes: ExtensionCodes::default(),
            multi_dim_format: MultiDimFormat::default(),
            overrides: Arc::new(HashMap::new()),
            starting_state: Arc::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for SerializerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerConfig")
            .field("max_depth", &self.max_depth)
            .field("naming_policy", &self.naming_policy)
            .field("default_values", &self.default_values)
            .field("enum_by_name", &self.enum_by_name)
            .field("preserve_references", &self.preserve_references)
            .field("retain_unused_data", &self.retain_unused_data)
            .field("intern_strings", &self.intern_strings)
            .field("max_async_buffer", &self.max_async_buffer)
            .field("extension_codes", &self.extension_codes)
            .field("multi_dim_format", &self.multi_dim_format)
            .field("overrides", &self.overrides.len())
            .field("starting_state", &self.starting_state.len())
            .finish()
    }
}

impl SerializerConfig {
    /// Sets the nesting limit
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the property naming policy
    #[must_use]
    pub fn with_naming_policy(mut self, policy: NamingPolicy) -> Self {
        self.naming_policy = policy;
        self
    }

    /// Sets the default-values serialization policy
    #[must_use]
    pub fn with_default_values(mut self, policy: DefaultValuesPolicy) -> Self {
        self.default_values = policy;
        self
    }

    /// Enables or disables enum-as-name serialization
    #[must_use]
    pub fn with_enum_by_name(mut self, enabled: bool) -> Self {
        self.enum_by_name = enabled;
        self
    }

    /// Enables or disables reference preservation
    #[must_use]
    pub fn with_preserve_references(mut self, enabled: bool) -> Self {
        self.preserve_references = enabled;
        self
    }

    /// Enables or disables unused-data retention
    #[must_use]
    pub fn with_retain_unused_data(mut self, enabled: bool) -> Self {
        self.retain_unused_data = enabled;
        self
    }

    /// Enables or disables string interning
    #[must_use]
    pub fn with_intern_strings(mut self, enabled: bool) -> Self {
        self.intern_strings = enabled;
        self
    }

    /// Sets the async buffering threshold
    #[must_use]
    pub fn with_max_async_buffer(mut self, bytes: usize) -> Self {
        self.max_async_buffer = bytes;
        self
    }

    /// Remaps the reserved extension type codes
    #[must_use]
    pub fn with_extension_codes(mut self, codes: ExtensionCodes) -> Self {
        self.extension_codes = codes;
        self
    }

    /// Sets the multi-dimensional array wire format
    #[must_use]
    pub fn with_multi_dim_format(mut self, format: MultiDimFormat) -> Self {
        self.multi_dim_format = format;
        self
    }

    /// Registers a custom converter override for `T`.
    ///
    /// The override takes precedence over the shape-driven graph builder
    /// whenever a converter for `T` is required, including as a child of
    /// other types.
    #[must_use]
    pub fn with_converter<T: Shaped>(mut self, converter: Arc<dyn Converter<T>>) -> Self {
        let map = Arc::make_mut(&mut self.overrides);
        let _ = map.insert(
            TypeId::of::<T>(),
            Arc::new(converter) as Arc<dyn Any + Send + Sync>,
        );
        self
    }

    /// Seeds the per-call context's user-state map (`starting-context`)
    #[must_use]
    pub fn with_starting_state<S: Any + Send + Sync>(
        mut self,
        key: impl Into<String>,
        value: Arc<S>,
    ) -> Self {
        let map = Arc::make_mut(&mut self.starting_state);
        let _ = map.insert(key.into(), value as Arc<dyn Any + Send + Sync>);
        self
    }

    /// Looks up a registered converter override for `T`
    pub(crate) fn converter_override<T: Shaped>(&self) -> Option<Arc<dyn Converter<T>>> {
        self.overrides
            .get(&TypeId::of::<T>())
            .and_then(|any| any.downcast_ref::<Arc<dyn Converter<T>>>())
            .cloned()
    }

    /// A 64-bit digest of every option that affects converter construction.
    ///
    /// Converter caches are keyed by `(shape identity, fingerprint)`; caches
    /// with different fingerprints coexist and never share graph nodes.
    /// The starting user state is deliberately excluded (it affects calls,
    /// not graphs).
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut h = SipHasher24::with_key(0x7368_6170_6570_6163, 0x6b66_696e_6765_7270);
        self.naming_policy.hash(&mut h);
        self.default_values.hash(&mut h);
        self.enum_by_name.hash(&mut h);
        self.preserve_references.hash(&mut h);
        self.retain_unused_data.hash(&mut h);
        self.intern_strings.hash(&mut h);
        self.extension_codes.hash(&mut h);
        self.multi_dim_format.hash(&mut h);
        let mut keys: Vec<TypeId> = self.overrides.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            key.hash(&mut h);
        }
        h.digest()
    }
}
