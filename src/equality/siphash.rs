//! SipHash-2-4 over byte spans
// (c) 2025 Ross Younger
//!
//! A keyed pseudo-random function producing collision-resistant 64-bit
//! hashes. The structural-equality comparers route every hashed bit pattern
//! through this, keyed by a process-global 128-bit value drawn from the
//! platform RNG at first use.
//!
//! The implementation follows the published SipHash-2-4 definition: two
//! compression rounds per 8-byte block, four finalization rounds. Blocks
//! are consumed in place; only a sub-8-byte tail is ever staged in the
//! hasher's own buffer.

use std::sync::OnceLock;

/// Streaming SipHash-2-4 state.
///
/// Also usable as a [`std::hash::Hasher`], which is how the configuration
/// fingerprint is computed.
#[derive(Clone, Copy, Debug)]
pub struct SipHasher24 {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
    tail: [u8; 8],
    tail_len: usize,
    length: u64,
}

impl SipHasher24 {
    /// Creates a hasher with an explicit 128-bit key (as two little-endian words)
    #[must_use]
    pub fn with_key(k0: u64, k1: u64) -> Self {
        Self {
            v0: k0 ^ 0x736f_6d65_7073_6575,
            v1: k1 ^ 0x646f_7261_6e64_6f6d,
            v2: k0 ^ 0x6c79_6765_6e65_7261,
            v3: k1 ^ 0x7465_6462_7974_6573,
            tail: [0; 8],
            tail_len: 0,
            length: 0,
        }
    }

    /// Creates a hasher with the process-global key
    #[must_use]
    pub fn with_process_key() -> Self {
        let (k0, k1) = process_key();
        Self::with_key(k0, k1)
    }

    #[inline]
    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(13);
        self.v1 ^= self.v0;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(16);
        self.v3 ^= self.v2;
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(21);
        self.v3 ^= self.v0;
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(17);
        self.v1 ^= self.v2;
        self.v2 = self.v2.rotate_left(32);
    }

    #[inline]
    fn compress(&mut self, m: u64) {
        self.v3 ^= m;
        self.round();
        self.round();
        self.v0 ^= m;
    }

    /// Feeds a byte span into the hash.
    ///
    /// Whole 8-byte blocks are consumed directly from the input; at most 7
    /// bytes are staged until the next update or finalization.
    pub fn update(&mut self, mut bytes: &[u8]) {
        self.length = self.length.wrapping_add(bytes.len() as u64);

        if self.tail_len > 0 {
            let need = 8 - self.tail_len;
            let take = need.min(bytes.len());
            self.tail[self.tail_len..self.tail_len + take].copy_from_slice(&bytes[..take]);
            self.tail_len += take;
            bytes = &bytes[take..];
            if self.tail_len < 8 {
                return;
            }
            let m = u64::from_le_bytes(self.tail);
            self.compress(m);
            self.tail_len = 0;
        }

        let mut chunks = bytes.chunks_exact(8);
        for chunk in &mut chunks {
            // unwrap is fine: chunks_exact guarantees 8 bytes
            let m = u64::from_le_bytes(chunk.try_into().unwrap_or([0; 8]));
            self.compress(m);
        }
        let rest = chunks.remainder();
        self.tail[..rest.len()].copy_from_slice(rest);
        self.tail_len = rest.len();
    }

    /// Feeds a single `u64` (little-endian) into the hash
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.update(&value.to_le_bytes());
    }

    /// Runs the four finalization rounds and returns the 64-bit digest.
    /// The hasher state is unchanged (it is `Copy`), so this may be called
    /// mid-stream if a prefix digest is useful.
    #[must_use]
    pub fn digest(&self) -> u64 {
        let mut fin = *self;
        let mut last = [0u8; 8];
        last[..fin.tail_len].copy_from_slice(&fin.tail[..fin.tail_len]);
        last[7] = (fin.length & 0xff) as u8;
        fin.compress(u64::from_le_bytes(last));
        fin.v2 ^= 0xff;
        fin.round();
        fin.round();
        fin.round();
        fin.round();
        fin.v0 ^ fin.v1 ^ fin.v2 ^ fin.v3
    }
}

impl std::hash::Hasher for SipHasher24 {
    fn finish(&self) -> u64 {
        self.digest()
    }
    fn write(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

/// One-shot hash of a byte span with the process-global key
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut h = SipHasher24::with_process_key();
    h.update(bytes);
    h.digest()
}

/// The process-global 128-bit key, initialized once from the platform RNG.
///
/// `OnceLock` gives the release-publish semantics required for subsequent
/// lock-free reads.
pub(crate) fn process_key() -> (u64, u64) {
    static KEY: OnceLock<(u64, u64)> = OnceLock::new();
    *KEY.get_or_init(|| (rand::random(), rand::random()))
}

#[cfg(test)]
mod tests {
    use super::SipHasher24;
    use pretty_assertions::assert_eq;

    /// Key 00 01 02 .. 0f, inputs 00, 00 01, ... as in the reference
    /// implementation's vector table.
    fn reference_hasher() -> SipHasher24 {
        let k0 = u64::from_le_bytes([0, 1, 2, 3, 4, 5, 6, 7]);
        let k1 = u64::from_le_bytes([8, 9, 10, 11, 12, 13, 14, 15]);
        SipHasher24::with_key(k0, k1)
    }

    #[test]
    fn reference_vectors() {
        let cases: &[(usize, u64)] = &[
            (0, 0x726f_db47_dd0e_0e31),
            (1, 0x74f8_39c5_93dc_67fd),
            (2, 0x0d6c_8009_d9a9_4f5a),
            (3, 0x8567_6696_d7fb_7e2d),
            (8, 0x93f5_f579_9a93_2462),
            (15, 0xa129_ca61_49be_45e5),
        ];
        for &(len, expect) in cases {
            let input: Vec<u8> = (0..len as u8).collect();
            let mut h = reference_hasher();
            h.update(&input);
            assert_eq!(h.digest(), expect, "input length {len}");
        }
    }

    #[test]
    fn split_updates_agree_with_one_shot() {
        let input: Vec<u8> = (0..64).collect();
        let mut whole = reference_hasher();
        whole.update(&input);
        for split in [1, 3, 7, 8, 9, 31] {
            let mut parts = reference_hasher();
            for chunk in input.chunks(split) {
                parts.update(chunk);
            }
            assert_eq!(parts.digest(), whole.digest(), "split {split}");
        }
    }

    #[test]
    fn digest_is_non_destructive() {
        let mut h = reference_hasher();
        h.update(b"hello");
        let first = h.digest();
        assert_eq!(first, h.digest());
        h.update(b" world");
        assert_ne!(first, h.digest());
    }

    #[test]
    fn process_key_is_stable() {
        assert_eq!(super::process_key(), super::process_key());
    }
}
