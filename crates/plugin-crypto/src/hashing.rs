//! # BLAKE3 Hashing
//!
//! Fast cryptographic hashing used for content-derived event identifiers and
//! for deriving encryption keys from operator-supplied secrets.

/// BLAKE3 hash output (256-bit).
pub type Hash = [u8; 32];

/// Hash data with BLAKE3 (one-shot).
pub fn blake3_hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Hash data and render the first `len` bytes as lowercase hex.
///
/// `len` is clamped to the 32-byte digest size.
pub fn blake3_hex(data: &[u8], len: usize) -> String {
    let hash = blake3_hash(data);
    hex::encode(&hash[..len.min(hash.len())])
}

/// Derive key from context and input key material.
pub fn blake3_derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}
