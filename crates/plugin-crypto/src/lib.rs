//! # Plugin Crypto - Symmetric Encryption and Hashing
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | XChaCha20-Poly1305, AES-256-GCM | Sensitive config fields at rest |
//! | `hashing` | BLAKE3 | Deterministic event ids, key derivation |
//!
//! ## Security Properties
//!
//! - **XChaCha20**: 192-bit nonce, safe to generate randomly per message
//! - **AES-GCM**: 96-bit nonce, use only with AES-NI hardware acceleration
//! - **BLAKE3**: SIMD-accelerated, keyed and key-derivation modes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod symmetric;

// Re-exports
pub use errors::CryptoError;
pub use hashing::{blake3_derive_key, blake3_hash, blake3_hex, Hash};
pub use symmetric::{Cipher, FieldCipher, SecretKey};
