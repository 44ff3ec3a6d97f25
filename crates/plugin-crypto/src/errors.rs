//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Sealed payload shorter than its nonce
    #[error("Sealed payload too short: need at least {minimum} bytes, got {actual}")]
    TruncatedPayload {
        /// Minimum length (nonce size)
        minimum: usize,
        /// Actual length in bytes
        actual: usize,
    },
}
