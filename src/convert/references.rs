//! Reference preservation for shared values
// (c) 2025 Ross Younger
//!
//! With `preserve-references` enabled, each distinct `Arc` is assigned a
//! dense identity on first encounter. The first occurrence is written as a
//! reserved extension whose body is the 4-byte identity followed by the
//! encoded payload; later occurrences are a small extension holding just
//! the identity. Deserialization resolves identities against a per-call
//! table, so shared structure survives a round trip.
//!
//! With preservation disabled the converter is transparent, except that a
//! cycle (a value reached again while still being written) fails with
//! `CyclicGraph` instead of recursing forever.

use std::any::Any;
use std::sync::Arc;

use crate::codec::{Reader, TokenKind, Writer};
use crate::config::ExtensionCodes;
use crate::context::Context;
use crate::convert::Converter;
use crate::error::{Error, Result};
use crate::shape::Shaped;

pub(crate) struct SharedConverter<E: 'static> {
    pub(crate) inner: Arc<dyn Converter<E>>,
    pub(crate) preserve: bool,
    pub(crate) codes: ExtensionCodes,
}

impl<E: Shaped> Converter<Arc<E>> for SharedConverter<E> {
    fn write(&self, writer: &mut Writer, value: &Arc<E>, cx: &mut Context) -> Result<()> {
        let identity = Arc::as_ptr(value) as usize;
        if !self.preserve {
            let tables = cx.references();
            if tables.writing.contains(&identity) {
                return Err(Error::cyclic_graph(std::any::type_name::<E>()));
            }
            tables.writing.push(identity);
            let result = self.inner.write(writer, &**value, cx);
            let _ = cx.references().writing.pop();
            return result;
        }

        if let Some(&id) = cx.references().assigned.get(&identity) {
            return writer.write_ext(self.codes.back_reference, &id.to_be_bytes());
        }
        let id = {
            let tables = cx.references();
            let id = tables.next_id;
            tables.next_id += 1;
            let _ = tables.assigned.insert(identity, id);
            id
        };
        // The extension body needs a length up front, so the payload is
        // staged through a scratch writer.
        let mut scratch = Writer::new();
        self.inner.write(&mut scratch, &**value, cx)?;
        let payload = scratch.into_bytes();
        let mut body = Vec::with_capacity(4 + payload.len());
        body.extend_from_slice(&id.to_be_bytes());
        body.extend_from_slice(&payload);
        writer.write_ext(self.codes.reference_id, &body)
    }

    fn read(&self, reader: &mut Reader<'_>, cx: &mut Context) -> Result<Arc<E>> {
        if !self.preserve || reader.peek_kind()? != TokenKind::Extension {
            // Plain payload: preservation off, or data written without it.
            return Ok(Arc::new(self.inner.read(reader, cx)?));
        }
        let start = reader.position();
        let (code, body) = reader.read_ext()?;
        if code == self.codes.back_reference {
            let id = decode_identity(body, start)?;
            let resolved = cx.references().resolved.get(&id).cloned();
            return resolved
                .and_then(|any: Arc<dyn Any + Send + Sync>| any.downcast::<E>().ok())
                .ok_or_else(|| {
                    Error::new(
                        crate::error::ErrorKind::CyclicGraph,
                        format!("reference {id} is not resolved yet; cycles cannot be rebuilt"),
                    )
                    .with_offset(start)
                });
        }
        if code == self.codes.reference_id {
            if body.len() < 4 {
                return Err(Error::malformed(start, "reference body is too short"));
            }
            let id = decode_identity(&body[..4], start)?;
            let mut payload = Reader::new(&body[4..]);
            let value = Arc::new(self.inner.read(&mut payload, cx)?);
            let _ = cx
                .references()
                .resolved
                .insert(id, Arc::clone(&value) as Arc<dyn Any + Send + Sync>);
            return Ok(value);
        }
        Err(Error::malformed(
            start,
            format!("extension type {code} is not a reference tag"),
        ))
    }

    fn prefers_async(&self) -> bool {
        self.inner.prefers_async()
    }
}

fn decode_identity(body: &[u8], offset: usize) -> Result<u32> {
    let bytes: [u8; 4] = body
        .try_into()
        .map_err(|_| Error::malformed(offset, "reference identity must be 4 bytes"))?;
    Ok(u32::from_be_bytes(bytes))
}
