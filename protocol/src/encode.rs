//! Canonical little-endian, length-prefixed byte encoding used to compute
//! an entry's `EntryID`. This is *not* a general wire format: it exists
//! only to produce a bit-exact, deterministic byte sequence to hash.

use crate::merkle::HasherPool;
use shared::Hash;
use std::sync::OnceLock;

/// Accumulates the canonical encoding of one entry body.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn push_i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn push_varint(&mut self, mut v: u64) -> &mut Self {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if v == 0 {
                break;
            }
        }
        self
    }

    /// A length-prefixed (varint) byte string.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.push_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// A hash is fixed-size: no length prefix needed.
    pub fn push_hash(&mut self, h: &Hash) -> &mut Self {
        self.buf.extend_from_slice(h.as_bytes());
        self
    }

    /// A length-prefixed (varint) ordered collection, encoded by `f` per
    /// element.
    pub fn push_collection<T>(&mut self, items: &[T], mut f: impl FnMut(&mut Self, &T)) -> &mut Self {
        self.push_varint(items.len() as u64);
        for item in items {
            f(self, item);
        }
        self
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

static ENTRY_HASH_POOL: OnceLock<HasherPool> = OnceLock::new();

/// Computes `SHA3-256(type_tag || encode(body))`, the identity of every
/// entry in the graph. Hashed through the shared [`HasherPool`] so the
/// lift and the per-tx well-formedness pass reuse hasher state instead
/// of allocating one per entry.
#[must_use]
pub fn entry_id(type_tag: &str, body_bytes: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(type_tag.len() + body_bytes.len());
    buf.extend_from_slice(type_tag.as_bytes());
    buf.extend_from_slice(body_bytes);
    ENTRY_HASH_POOL.get_or_init(HasherPool::default).hash(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_small_values_are_single_byte() {
        let mut e = Encoder::new();
        e.push_varint(5);
        assert_eq!(e.finish(), vec![5]);
    }

    #[test]
    fn varint_large_values_span_multiple_bytes() {
        let mut e = Encoder::new();
        e.push_varint(300);
        assert_eq!(e.finish(), vec![0xac, 0x02]);
    }

    #[test]
    fn entry_id_is_deterministic() {
        let a = entry_id("spend1", &[1, 2, 3]);
        let b = entry_id("spend1", &[1, 2, 3]);
        assert_eq!(a, b);
    }

    #[test]
    fn entry_id_is_sensitive_to_type_tag() {
        let a = entry_id("spend1", &[1, 2, 3]);
        let b = entry_id("issuance1", &[1, 2, 3]);
        assert_ne!(a, b);
    }
}
