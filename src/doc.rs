// (c) 2025 Ross Younger

//! Extended documentation: wire formats, performance notes
//!
//! This module carries no code. It exists so the details below are
//! rendered into the crate documentation and can be linked from the API.
//!
//! # Object wire forms
//!
//! An object whose properties have no key indices always serializes as a
//! map keyed by property name:
//!
//! ```text
//! 82 aa 66 69 72 73 74 5f 6e 61 6d 65 a6 41 6e 64 72 65 77 ...
//! ^map-2  ^fixstr-10 "first_name"    ^fixstr-6 "Andrew"
//! ```
//!
//! When *every* serializable property carries an explicit key index, the
//! serializer chooses between two compact forms per value:
//!
//! * **array form** — an array of `highest-included-key + 1` slots, values
//!   at their key index, `nil` in keyless gaps, trailing suppressed
//!   defaults trimmed;
//! * **indexed map form** — a map whose keys are the integer indices
//!   (MessagePack permits non-string map keys).
//!
//! The choice is an estimate: the array wins when its slot count does not
//! exceed roughly two bytes per written property, i.e. sparse key spaces
//! fall back to the map. Readers accept either form regardless of what
//! the writer chose, so the choice can vary value-by-value without a
//! schema change. Out-of-range array slots are consumed and ignored,
//! which is what lets a newer writer add keys without breaking an older
//! reader.
//!
//! # Union framing
//!
//! A value serialized at a union-typed site is wrapped in a two-element
//! array: `[discriminator, payload]`. The discriminator is the case's
//! integer index, its string alias, or `nil` for the registered base
//! case. A site whose declared type is the concrete case emits no
//! framing at all; the declared type already says everything.
//!
//! # Reference extensions
//!
//! With `preserve-references` enabled, the first occurrence of a shared
//! value is an application extension (type 120 by default) whose body is
//! a 4-byte big-endian identity followed by the encoded payload. Every
//! later occurrence is a fixext4 (type 121 by default) holding just the
//! identity. Both codes can be remapped through
//! [`ExtensionCodes`](crate::ExtensionCodes) if an application already
//! uses them.
//!
//! # Performance notes
//!
//! * **Converter graphs build once.** The first serialize/deserialize of
//!   a type walks its shape and caches one converter per type reachable
//!   from it; subsequent calls take a shared-lock cache hit. Keep one
//!   [`MessagePackSerializer`](crate::MessagePackSerializer) per
//!   configuration for the life of the process and share it freely
//!   between threads.
//! * **Property names are pre-formatted.** Each object property's wire
//!   name is framed once at graph-build time; serialization appends the
//!   framed bytes verbatim and deserialization matches incoming keys by
//!   byte equality with no allocation or UTF-8 validation.
//! * **Async costs one boundary scan.** The async read path proves a
//!   structure is complete by running the incremental skip over the
//!   prefetched bytes, then decodes synchronously. For small structures
//!   that is one extra linear pass; raise `max-async-buffer` if your
//!   structures are large and your pipe is fast.
//! * **Depth checks are cheap, so the default is conservative.** The
//!   64-level default exists to stop hostile inputs; raise it via
//!   `max-depth` if your data is legitimately deep.
//! * **Interning pays off only for repetitive strings.** The cache
//!   hashes every decoded `Arc<str>`; enable it when the same values
//!   recur across messages (enum-like strings, property bags), not for
//!   free-form text.
