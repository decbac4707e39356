//! Shared deterministic hash encoding for signatures and plan-item identity.
//!
//! Every variable-length field is length-prefixed and every section starts
//! with a one-byte tag, so distinct inputs never collide by concatenation.
#![expect(clippy::cast_possible_truncation)]

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::Xxh3;

const HEX: &[u8; 16] = b"0123456789abcdef";

pub(crate) fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}

pub(crate) fn write_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_be_bytes());
}

pub(crate) fn write_str(hasher: &mut Sha256, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

/// Hash a list of strings as a length-prefixed section.
pub(crate) fn write_str_list<'a>(
    hasher: &mut Sha256,
    values: impl ExactSizeIterator<Item = &'a str>,
) {
    write_u32(hasher, values.len() as u32);
    for value in values {
        write_str(hasher, value);
    }
}

/// Finalize into lowercase hex.
pub(crate) fn finish_hex(hasher: Sha256) -> String {
    encode_hex(&hasher.finalize())
}

#[must_use]
pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[usize::from(byte >> 4)] as char);
        out.push(HEX[usize::from(byte & 0x0f)] as char);
    }

    out
}

///
/// IdHasher
///
/// Fast non-cryptographic 64-bit identity for deduplicating work items.
/// Never used for cache validity.
///

pub(crate) struct IdHasher(Xxh3);

impl IdHasher {
    pub(crate) fn new(domain: &str) -> Self {
        let mut inner = Xxh3::new();
        inner.update(&(domain.len() as u32).to_be_bytes());
        inner.update(domain.as_bytes());
        Self(inner)
    }

    pub(crate) fn str(&mut self, value: &str) -> &mut Self {
        self.0.update(&(value.len() as u32).to_be_bytes());
        self.0.update(value.as_bytes());
        self
    }

    pub(crate) fn i32(&mut self, value: i32) -> &mut Self {
        self.0.update(&value.to_be_bytes());
        self
    }

    pub(crate) fn finish(&self) -> u64 {
        self.0.digest()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_encoding_is_lowercase_and_padded() {
        assert_eq!(encode_hex(&[0x00, 0x0f, 0xa0, 0xff]), "000fa0ff");
    }

    #[test]
    fn length_prefix_separates_concatenations() {
        let mut a = Sha256::new();
        write_str(&mut a, "ab");
        write_str(&mut a, "c");

        let mut b = Sha256::new();
        write_str(&mut b, "a");
        write_str(&mut b, "bc");

        assert_ne!(finish_hex(a), finish_hex(b));
    }

    #[test]
    fn id_hasher_is_deterministic_and_domain_separated() {
        let one = IdHasher::new("item").str("x").i32(4).finish();
        let two = IdHasher::new("item").str("x").i32(4).finish();
        let other = IdHasher::new("other").str("x").i32(4).finish();

        assert_eq!(one, two);
        assert_ne!(one, other);
    }
}
