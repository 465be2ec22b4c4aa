//! String conversion, pre-formatted names, and the interning cache
// (c) 2025 Ross Younger
//!
//! Property names recur on every serialization of an object type, so they
//! are framed once into a [`PreformattedString`] and thereafter emitted as
//! raw bytes and matched against incoming keys by plain byte equality with
//! no allocation.
//!
//! Shared strings (`Arc<str>`) can additionally be routed through a
//! process-wide, size-bounded interning cache: repeat values decode to the
//! same allocation across any number of deserializations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use bytes::Bytes;

use crate::codec::{Reader, Writer};
use crate::context::Context;
use crate::convert::Converter;
use crate::equality::siphash;
use crate::error::Result;

/// A property name held in three forms: the string, its UTF-8 bytes, and
/// its fully framed MessagePack encoding (length header plus body).
#[derive(Clone, Debug)]
pub struct PreformattedString {
    text: Arc<str>,
    framed: Bytes,
    header_len: usize,
}

impl PreformattedString {
    /// Encodes `text` eagerly
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut w = Writer::new();
        // A str32 header is the largest possible; write_str only fails on
        // > 4 GiB input, which a property name cannot be.
        let _ = w.write_str(text);
        let framed = w.into_bytes();
        Self {
            text: Arc::from(text),
            header_len: framed.len() - text.len(),
            framed,
        }
    }

    /// The decoded string
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The UTF-8 body without framing
    #[must_use]
    pub fn utf8(&self) -> &[u8] {
        &self.framed[self.header_len..]
    }

    /// The full wire encoding
    #[must_use]
    pub fn framed(&self) -> &[u8] {
        &self.framed
    }

    /// Byte-equality fast path against an incoming key's UTF-8 bytes
    #[must_use]
    pub fn matches(&self, incoming: &[u8]) -> bool {
        self.utf8() == incoming
    }
}

/// Plain owned strings
pub(crate) struct StringConverter;
impl Converter<String> for StringConverter {
    fn write(&self, writer: &mut Writer, value: &String, _cx: &mut Context) -> Result<()> {
        writer.write_str(value)
    }
    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<String> {
        Ok(reader.read_str()?.to_owned())
    }
}

/// Shared strings, optionally interned
pub(crate) struct ArcStrConverter {
    pub(crate) intern: bool,
}
impl Converter<Arc<str>> for ArcStrConverter {
    fn write(&self, writer: &mut Writer, value: &Arc<str>, _cx: &mut Context) -> Result<()> {
        writer.write_str(value)
    }
    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<Arc<str>> {
        let s = reader.read_str()?;
        if self.intern {
            Ok(intern(s))
        } else {
            Ok(Arc::from(s))
        }
    }
}

/// Number of shards in the interning cache
const INTERN_SHARDS: usize = 16;
/// Entries retained per shard before eviction
const INTERN_SHARD_CAPACITY: usize = 512;

struct InternEntry {
    value: Arc<str>,
    last_used: AtomicU64,
}

#[derive(Default)]
struct InternShard {
    // Keyed by the SipHash of the UTF-8 bytes; collisions are resolved by
    // comparing the stored value.
    entries: HashMap<u64, Vec<InternEntry>>,
    population: usize,
}

struct InternCache {
    shards: Vec<RwLock<InternShard>>,
    clock: AtomicU64,
}

fn cache() -> &'static InternCache {
    static CACHE: OnceLock<InternCache> = OnceLock::new();
    CACHE.get_or_init(|| InternCache {
        shards: (0..INTERN_SHARDS).map(|_| RwLock::default()).collect(),
        clock: AtomicU64::new(0),
    })
}

/// Routes a decoded string through the process-wide cache: a hit returns
/// the cached allocation, a miss inserts one, evicting the least recently
/// used entries when a shard is full.
pub(crate) fn intern(s: &str) -> Arc<str> {
    let cache = cache();
    let hash = siphash::hash_bytes(s.as_bytes());
    let stamp = cache.clock.fetch_add(1, Ordering::Relaxed);
    let shard_index = (hash as usize) % INTERN_SHARDS;
    let shard_lock = &cache.shards[shard_index];

    {
        let shard = shard_lock.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = shard.entries.get(&hash) {
            for entry in bucket {
                if &*entry.value == s {
                    entry.last_used.store(stamp, Ordering::Relaxed);
                    return Arc::clone(&entry.value);
                }
            }
        }
    }

    let mut shard = shard_lock.write().unwrap_or_else(PoisonError::into_inner);
    // Re-check: another thread may have inserted while we waited.
    if let Some(bucket) = shard.entries.get(&hash) {
        for entry in bucket {
            if &*entry.value == s {
                entry.last_used.store(stamp, Ordering::Relaxed);
                return Arc::clone(&entry.value);
            }
        }
    }
    if shard.population >= INTERN_SHARD_CAPACITY {
        evict(&mut shard);
    }
    let value: Arc<str> = Arc::from(s);
    shard
        .entries
        .entry(hash)
        .or_default()
        .push(InternEntry {
            value: Arc::clone(&value),
            last_used: AtomicU64::new(stamp),
        });
    shard.population += 1;
    value
}

/// Drops the least-recently-used half of a shard
fn evict(shard: &mut InternShard) {
    let mut stamps: Vec<u64> = shard
        .entries
        .values()
        .flatten()
        .map(|e| e.last_used.load(Ordering::Relaxed))
        .collect();
    stamps.sort_unstable();
    let cutoff = stamps.get(stamps.len() / 2).copied().unwrap_or(0);
    shard.entries.retain(|_, bucket| {
        bucket.retain(|e| e.last_used.load(Ordering::Relaxed) > cutoff);
        !bucket.is_empty()
    });
    shard.population = shard.entries.values().map(Vec::len).sum();
    tracing::debug!(population = shard.population, "interning cache evicted");
}

#[cfg(test)]
mod tests {
    use super::{intern, PreformattedString};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn preformatted_forms_agree() {
        let p = PreformattedString::new("first_name");
        assert_eq!(p.text(), "first_name");
        assert_eq!(p.utf8(), b"first_name");
        assert_eq!(p.framed()[0], 0xaa); // fixstr of length 10
        assert_eq!(&p.framed()[1..], b"first_name");
        assert!(p.matches(b"first_name"));
        assert!(!p.matches(b"last_name"));
        assert!(!p.matches(b"first_nam"));
    }

    #[test]
    fn interning_returns_the_same_allocation() {
        let a = intern("repeated-value-for-interning");
        let b = intern("repeated-value-for-interning");
        assert!(Arc::ptr_eq(&a, &b));
        let c = intern("a-different-value");
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
