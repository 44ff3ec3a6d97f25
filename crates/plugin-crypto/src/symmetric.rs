//! # Symmetric Encryption
//!
//! Provides XChaCha20-Poly1305 (default) and AES-256-GCM encryption.
//!
//! `FieldCipher` seals a value as `nonce || ciphertext` so a single opaque
//! byte string can be stored in place of a plaintext config field.

use crate::CryptoError;
use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroize;

/// Secret key (256-bit).
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Key length in bytes.
    pub const LEN: usize = 32;

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: Self::LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Generate random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Cipher selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Cipher {
    /// XChaCha20-Poly1305 (default, side-channel immune)
    #[default]
    XChaCha20Poly1305,
    /// AES-256-GCM (use with AES-NI only)
    Aes256Gcm,
}

impl Cipher {
    /// Nonce length in bytes.
    pub fn nonce_len(&self) -> usize {
        match self {
            Self::XChaCha20Poly1305 => 24,
            Self::Aes256Gcm => 12,
        }
    }

    /// Stable identifier stored alongside sealed values.
    pub fn name(&self) -> &'static str {
        match self {
            Self::XChaCha20Poly1305 => "xchacha20poly1305",
            Self::Aes256Gcm => "aes256gcm",
        }
    }

    /// Parse an identifier produced by [`Cipher::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "xchacha20poly1305" => Some(Self::XChaCha20Poly1305),
            "aes256gcm" => Some(Self::Aes256Gcm),
            _ => None,
        }
    }
}

/// Seals and opens individual values with a fixed key and cipher.
#[derive(Clone, Debug)]
pub struct FieldCipher {
    cipher: Cipher,
    key: SecretKey,
}

impl FieldCipher {
    /// Create a field cipher.
    pub fn new(cipher: Cipher, key: SecretKey) -> Self {
        Self { cipher, key }
    }

    /// The configured cipher.
    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    /// Encrypt `plaintext` under a fresh random nonce, returning `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = vec![0u8; self.cipher.nonce_len()];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);

        let sealed = match self.cipher {
            Cipher::XChaCha20Poly1305 => XChaCha20Poly1305::new(self.key.as_bytes().into())
                .encrypt(XNonce::from_slice(&nonce), plaintext),
            Cipher::Aes256Gcm => Aes256Gcm::new(self.key.as_bytes().into())
                .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext),
        };
        let ciphertext = sealed.map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        nonce.extend_from_slice(&ciphertext);
        Ok(nonce)
    }

    /// Reverse [`FieldCipher::seal`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce_len = self.cipher.nonce_len();
        if sealed.len() < nonce_len {
            return Err(CryptoError::TruncatedPayload {
                minimum: nonce_len,
                actual: sealed.len(),
            });
        }
        let (nonce, ciphertext) = sealed.split_at(nonce_len);

        let plaintext = match self.cipher {
            Cipher::XChaCha20Poly1305 => XChaCha20Poly1305::new(self.key.as_bytes().into())
                .decrypt(XNonce::from_slice(nonce), ciphertext),
            Cipher::Aes256Gcm => Aes256Gcm::new(self.key.as_bytes().into())
                .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext),
        };

        plaintext.map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}
