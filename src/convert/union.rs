//! Union framing: `[discriminator, payload]`
// (c) 2025 Ross Younger
//!
//! When the declared type at a serialization site is a union, the value is
//! wrapped in a two-element array whose first element identifies the case:
//! the integer case index, the string alias, or nil when the value is the
//! base (fallback) case. The payload is produced by the case's own
//! converter. Framing is suppressed when the declared type already
//! identifies the case statically, and the declared-type stack in the
//! context guards against re-framing when a case shape resolves back to
//! the same union.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{Reader, TokenKind, Writer};
use crate::context::Context;
use crate::convert::registry::Generation;
use crate::convert::Converter;
use crate::error::{Error, Result};
use crate::shape::union::{TypedCase, UnionCaseFacet, UnionShape};
use crate::shape::Shaped;

/// A union case bound into a converter graph
pub(crate) trait BoundCase<T>: Send + Sync {
    fn matches(&self, value: &T) -> bool;
    fn write_payload(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()>;
    fn read_payload(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<T>;
    fn prefers_async(&self) -> bool;
}

struct BoundCaseImpl<T: 'static, C: 'static> {
    project: fn(&T) -> Option<&C>,
    inject: fn(C) -> T,
    child: Arc<dyn Converter<C>>,
}

impl<T: Send + Sync, C: Send + Sync + 'static> BoundCase<T> for BoundCaseImpl<T, C> {
    fn matches(&self, value: &T) -> bool {
        (self.project)(value).is_some()
    }

    fn write_payload(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()> {
        let payload = (self.project)(value)
            .ok_or_else(|| Error::invalid_operation("union case written for a non-matching value"))?;
        self.child.write(writer, payload, cx)
    }

    fn read_payload(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<T> {
        Ok((self.inject)(self.child.read(reader, cx)?))
    }

    fn prefers_async(&self) -> bool {
        self.child.prefers_async()
    }
}

impl<T: Send + Sync + 'static, C: Shaped> UnionCaseFacet<T> for TypedCase<T, C> {
    fn bind(&self, gen: &mut Generation<'_>) -> Result<Arc<dyn BoundCase<T>>> {
        let child = gen.converter_for::<C>()?;
        Ok(Arc::new(BoundCaseImpl {
            project: self.project,
            inject: self.inject,
            child,
        }))
    }

    fn bind_equality(
        &self,
        gen: &mut crate::equality::registry::EqGeneration<'_>,
    ) -> Result<Arc<dyn crate::equality::comparers::CaseEq<T>>> {
        let inner = gen.comparer_for::<C>()?;
        Ok(Arc::new(crate::equality::comparers::CaseEqImpl {
            project: self.project,
            inner,
        }))
    }
}

/// Builds the union converter: cases bound in the order the shape reports
/// them, so nested unions and ordering-sensitive matches behave as
/// declared
pub(crate) fn build<T: Shaped>(
    shape: &Arc<UnionShape<T>>,
    gen: &mut Generation<'_>,
) -> Result<Arc<dyn Converter<T>>> {
    let mut cases = Vec::with_capacity(shape.cases.len());
    let mut by_index = HashMap::new();
    let mut by_alias = HashMap::new();
    for case in &shape.cases {
        let bound = case.facet.bind(gen)?;
        let position = cases.len();
        if by_index.insert(case.index, position).is_some() {
            return Err(Error::invalid_operation(format!(
                "duplicate union case index {} on {}",
                case.index, shape.type_name
            )));
        }
        if let Some(alias) = case.alias {
            if by_alias.insert(alias, position).is_some() {
                return Err(Error::invalid_operation(format!(
                    "duplicate union case alias '{alias}' on {}",
                    shape.type_name
                )));
            }
        }
        cases.push((case.index, case.alias, bound));
    }
    let fallback = shape
        .fallback
        .as_ref()
        .map(|facet| facet.bind(gen))
        .transpose()?;
    Ok(Arc::new(UnionConverter {
        type_name: shape.type_name,
        self_id: TypeId::of::<T>(),
        cases,
        by_index,
        by_alias,
        fallback,
    }))
}

pub(crate) struct UnionConverter<T: 'static> {
    type_name: &'static str,
    self_id: TypeId,
    cases: Vec<(u32, Option<&'static str>, Arc<dyn BoundCase<T>>)>,
    by_index: HashMap<u32, usize>,
    by_alias: HashMap<&'static str, usize>,
    fallback: Option<Arc<dyn BoundCase<T>>>,
}

impl<T: Send + Sync + 'static> UnionConverter<T> {
    /// Writes the frame. The declared-type stack holds this union on
    /// entry; exactly one pop happens here. For an indexed case the frame
    /// is popped before the payload (whose declared type is the case
    /// type); the fallback payload is still declared as the union, so its
    /// frame stays on the stack until the payload is written.
    fn write_framed(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()> {
        if let Some((index, alias, case)) =
            self.cases.iter().find(|(_, _, case)| case.matches(value))
        {
            cx.pop_declared();
            writer.write_array_header(2)?;
            match alias {
                Some(alias) => writer.write_str(alias)?,
                None => writer.write_uint(u64::from(*index)),
            }
            return case.write_payload(writer, value, cx);
        }
        if let Some(fallback) = &self.fallback {
            if fallback.matches(value) {
                writer.write_array_header(2)?;
                writer.write_nil();
                let result = fallback.write_payload(writer, value, cx);
                cx.pop_declared();
                return result;
            }
        }
        cx.pop_declared();
        Err(Error::unknown_sub_type(format!(
            "value of '{}' matches no registered union case",
            self.type_name
        )))
    }
}

impl<T: Send + Sync + 'static> Converter<T> for UnionConverter<T> {
    fn write(&self, writer: &mut Writer, value: &T, cx: &mut Context) -> Result<()> {
        if !cx.push_declared(self.self_id) {
            // Re-entered from our own fallback payload: the outer frame
            // already carries the nil discriminator, so framing again
            // would be redundant.
            cx.report_warning(&format!(
                "suppressing redundant union framing for '{}'",
                self.type_name
            ));
            let fallback = self.fallback.as_ref().ok_or_else(|| {
                Error::invalid_operation(format!(
                    "recursive union framing on '{}' with no base case",
                    self.type_name
                ))
            })?;
            return fallback.write_payload(writer, value, cx);
        }
        match cx.enter() {
            Ok(()) => {
                let framed = self.write_framed(writer, value, cx);
                cx.leave();
                framed
            }
            Err(e) => {
                cx.pop_declared();
                Err(e)
            }
        }
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<T> {
        cx.enter()?;
        let result = (|| {
            let start = reader.position();
            let len = reader.read_array_header()?;
            if len != 2 {
                return Err(Error::malformed(
                    start,
                    format!("union framing must be a 2-element array, found {len}"),
                ));
            }
            match reader.peek_kind()? {
                TokenKind::Nil => {
                    let _ = reader.try_read_nil()?;
                    let fallback = self.fallback.as_ref().ok_or_else(|| {
                        Error::unknown_sub_type(format!(
                            "'{}' has no base case for a nil discriminator",
                            self.type_name
                        ))
                    })?;
                    fallback.read_payload(reader, cx)
                }
                TokenKind::Integer => {
                    let raw = reader.read_u64()?;
                    let position = u32::try_from(raw)
                        .ok()
                        .and_then(|index| self.by_index.get(&index))
                        .ok_or_else(|| {
                            Error::unknown_sub_type(format!(
                                "{raw} is not a case of '{}'",
                                self.type_name
                            ))
                        })?;
                    self.cases[*position].2.read_payload(reader, cx)
                }
                TokenKind::String => {
                    let alias = reader.read_str()?;
                    let position = self.by_alias.get(alias).ok_or_else(|| {
                        Error::unknown_sub_type(format!(
                            "'{alias}' is not a case of '{}'",
                            self.type_name
                        ))
                    })?;
                    self.cases[*position].2.read_payload(reader, cx)
                }
                other => Err(Error::malformed(
                    start,
                    format!("union discriminator must be nil, an integer or a string, found {other}"),
                )),
            }
        })();
        cx.leave();
        result.map_err(|e| e.within(self.type_name))
    }

    fn prefers_async(&self) -> bool {
        self.cases.iter().any(|(_, _, case)| case.prefers_async())
            || self
                .fallback
                .as_ref()
                .is_some_and(|case| case.prefers_async())
    }
}
