//! Error taxonomy shared by the codec, the converter graph and the facade
// (c) 2025 Ross Younger

use std::borrow::Cow;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of failure kinds this crate can report.
///
/// Every [`Error`] carries exactly one of these. Callers that need to react
/// programmatically should match on [`Error::kind`] rather than parse the
/// message text.
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, strum_macros::Display, strum_macros::EnumString,
)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The input ended in the middle of a structure
    EndOfStream,
    /// A byte did not match the wire grammar at its position
    Malformed,
    /// A valid token whose value is out of range for the requested target type
    Overflow,
    /// Nesting exceeded the configured maximum depth
    DepthExceeded,
    /// Cancellation was signalled
    Cancelled,
    /// A union discriminator was not recognized
    UnknownSubType,
    /// The same property was assigned twice within one object
    DoublePropertyAssignment,
    /// A required property or constructor parameter was absent
    MissingRequired,
    /// An object cycle was encountered with reference preservation disabled
    CyclicGraph,
    /// A type shape has no applicable converter
    UnsupportedType,
    /// Misuse of the API (e.g. writing two structures in one converter call)
    InvalidOperation,
}

/// The error type for all serialization and deserialization operations.
///
/// Carries a [kind](ErrorKind), a human-readable message, and optionally the
/// byte offset at which the problem was detected plus the property path the
/// object converters were visiting at the time.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
    offset: Option<usize>,
    path: Vec<&'static str>,
}

impl Error {
    /// General-purpose constructor
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            offset: None,
            path: Vec::new(),
        }
    }

    /// Truncated input detected at `offset`
    #[must_use]
    pub fn end_of_stream(offset: usize) -> Self {
        Self::new(ErrorKind::EndOfStream, "unexpected end of input").with_offset(offset)
    }

    /// Grammar violation at `offset`
    #[must_use]
    pub fn malformed(offset: usize, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Malformed, message).with_offset(offset)
    }

    /// Valid token, out of range for the target
    #[must_use]
    pub fn overflow(offset: usize, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Overflow, message).with_offset(offset)
    }

    /// The configured nesting limit was exceeded
    #[must_use]
    pub fn depth_exceeded(max_depth: usize) -> Self {
        Self::new(
            ErrorKind::DepthExceeded,
            format!("nesting exceeded the configured maximum of {max_depth}"),
        )
    }

    /// Cancellation was signalled
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation was cancelled")
    }

    /// A union discriminator did not match any registered case
    #[must_use]
    pub fn unknown_sub_type(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::UnknownSubType, message)
    }

    /// The named property appeared twice within a single object
    #[must_use]
    pub fn double_assignment(property: &str) -> Self {
        Self::new(
            ErrorKind::DoublePropertyAssignment,
            format!("property '{property}' was assigned twice"),
        )
    }

    /// A required property or constructor parameter was not supplied
    #[must_use]
    pub fn missing_required(property: &str) -> Self {
        Self::new(
            ErrorKind::MissingRequired,
            format!("required property '{property}' was absent"),
        )
    }

    /// An object graph cycle was found while reference preservation was off
    #[must_use]
    pub fn cyclic_graph(type_name: &'static str) -> Self {
        Self::new(
            ErrorKind::CyclicGraph,
            format!("cycle through '{type_name}' cannot be serialized without reference preservation"),
        )
    }

    /// No converter exists for the type shape
    #[must_use]
    pub fn unsupported_type(type_name: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedType,
            format!("no converter is applicable to '{type_name}'"),
        )
    }

    /// API misuse
    #[must_use]
    pub fn invalid_operation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidOperation, message)
    }

    /// Which failure kind this is
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Byte offset at which the failure was detected, where known
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// The property path (outermost first) the object converters were
    /// visiting, where known. Empty for failures outside object context.
    #[must_use]
    pub fn path(&self) -> &[&'static str] {
        &self.path
    }

    /// Attaches a byte offset (first one wins; nested rewraps keep the
    /// innermost, most precise offset)
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        if self.offset.is_none() {
            self.offset = Some(offset);
        }
        self
    }

    /// Prepends a property-path segment as the error bubbles out of an
    /// object converter
    #[must_use]
    pub(crate) fn within(mut self, segment: &'static str) -> Self {
        self.path.insert(0, segment);
        self
    }

    /// Renders the path as a dotted string for display purposes
    #[must_use]
    pub fn path_display(&self) -> String {
        self.path.join(".")
    }
}
