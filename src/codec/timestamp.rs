//! The standard MessagePack timestamp extension (type -1)
// (c) 2025 Ross Younger

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Nanoseconds per second; the nanoseconds component is always below this
const NANOS_RANGE: u32 = 1_000_000_000;

/// A point in time as carried by the MessagePack timestamp extension:
/// whole seconds since the Unix epoch plus a sub-second nanosecond count.
///
/// Three wire encodings exist (4, 8 and 12 bytes); the writer picks the
/// smallest that can represent the value and the reader accepts all three.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Timestamp {
    seconds: i64,
    nanos: u32,
}

impl Timestamp {
    /// The Unix epoch itself
    pub const EPOCH: Timestamp = Timestamp {
        seconds: 0,
        nanos: 0,
    };

    /// Creates a timestamp; fails if `nanos` is a whole second or more
    pub fn new(seconds: i64, nanos: u32) -> Result<Self> {
        if nanos >= NANOS_RANGE {
            return Err(Error::invalid_operation(
                "timestamp nanoseconds must be below one second",
            ));
        }
        Ok(Self { seconds, nanos })
    }

    /// Whole seconds since the Unix epoch (may be negative)
    #[must_use]
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Sub-second nanoseconds, always below one second
    #[must_use]
    pub fn nanos(&self) -> u32 {
        self.nanos
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        match value.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                // no overflow until the year 292 billion or so
                seconds: d.as_secs() as i64,
                nanos: d.subsec_nanos(),
            },
            Err(e) => {
                let d = e.duration();
                let mut seconds = -(d.as_secs() as i64);
                let mut nanos = d.subsec_nanos();
                if nanos > 0 {
                    seconds -= 1;
                    nanos = NANOS_RANGE - nanos;
                }
                Self { seconds, nanos }
            }
        }
    }
}

impl TryFrom<Timestamp> for SystemTime {
    type Error = Error;

    fn try_from(value: Timestamp) -> Result<Self> {
        let base = if value.seconds >= 0 {
            UNIX_EPOCH.checked_add(Duration::new(value.seconds as u64, value.nanos))
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(value.seconds.unsigned_abs()))
                .and_then(|t| t.checked_add(Duration::from_nanos(u64::from(value.nanos))))
        };
        base.ok_or_else(|| Error::overflow(0, "timestamp does not fit in SystemTime"))
    }
}

/// Decodes a timestamp extension body of 4, 8 or 12 bytes.
/// Any other length is a grammar violation.
pub(crate) fn decode_body(body: &[u8], offset: usize) -> Result<Timestamp> {
    match body.len() {
        4 => {
            let secs = u32::from_be_bytes(body.try_into().unwrap_or_default());
            Ok(Timestamp {
                seconds: i64::from(secs),
                nanos: 0,
            })
        }
        8 => {
            let packed = u64::from_be_bytes(body.try_into().unwrap_or_default());
            let nanos = (packed >> 34) as u32;
            let seconds = (packed & ((1 << 34) - 1)) as i64;
            if nanos >= NANOS_RANGE {
                return Err(Error::malformed(offset, "timestamp nanoseconds out of range"));
            }
            Ok(Timestamp { seconds, nanos })
        }
        12 => {
            let nanos = u32::from_be_bytes(body[..4].try_into().unwrap_or_default());
            let seconds = i64::from_be_bytes(body[4..].try_into().unwrap_or_default());
            if nanos >= NANOS_RANGE {
                return Err(Error::malformed(offset, "timestamp nanoseconds out of range"));
            }
            Ok(Timestamp { seconds, nanos })
        }
        _ => Err(Error::malformed(
            offset,
            "timestamp extension body must be 4, 8 or 12 bytes",
        )),
    }
}
