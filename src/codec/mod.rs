//! MessagePack codec primitives
// (c) 2025 Ross Younger
//!
//! The full wire grammar: positive/negative fixint, the sized integer
//! families, nil, booleans, float32/64, the str/bin/array/map families,
//! fixext/ext, and the standard timestamp extension (type -1).
//!
//! Four entry points share one grammar implementation and agree
//! bit-for-bit:
//!
//! * [`Writer`] — push-style, shortest-encoding output
//! * [`Reader`] — pull-style, random access over a contiguous buffer
//! * [`StreamingReader`] — incremental, restartable reads over a buffer
//!   that may be missing its tail
//! * [`AsyncSource`] — prefetch buffering that proves a structure is whole
//!   and then hands it to a synchronous [`Reader`]

mod async_reader;
mod format;
mod reader;
mod streaming;
mod timestamp;
mod writer;

pub use async_reader::AsyncSource;
pub use format::TokenKind;
pub use reader::Reader;
pub use streaming::{Outcome, SkipState, StreamingReader};
pub use timestamp::Timestamp;
pub use writer::Writer;
