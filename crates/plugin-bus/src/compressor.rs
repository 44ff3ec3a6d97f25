//! # Payload Compression
//!
//! Zstd compression for oversized event payloads.
//!
//! ## Wire Form
//!
//! Payloads whose serialized size reaches the threshold are replaced by an
//! envelope:
//!
//! ```json
//! { "__compressed": "zstd+base64", "data": "<base64>", "original_size": 4096 }
//! ```
//!
//! Smaller payloads pass through untouched. A value counts as an envelope
//! only when it has exactly these three fields with this encoding, so user
//! payloads that happen to carry a `__compressed` key are compressed like any
//! other.
//!
//! ## Failure Policy
//!
//! - Compression failure: logged, original payload returned
//! - Decompression failure: returned as an error

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Envelope marker key.
pub const COMPRESSED_KEY: &str = "__compressed";

/// Envelope encoding identifier.
pub const ENCODING: &str = "zstd+base64";

// =============================================================================
// COMPRESSION CONFIGURATION
// =============================================================================

/// Configuration for payload compression
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Serialized payloads smaller than this are left alone
    pub threshold_bytes: usize,
    /// Zstd level (1-22, default 3)
    pub level: i32,
    /// Enable compression (can be disabled for debugging)
    pub enabled: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: 1024,
            level: 3,
            enabled: true,
        }
    }
}

impl CompressionConfig {
    pub fn with_threshold(threshold_bytes: usize) -> Self {
        Self {
            threshold_bytes,
            ..Default::default()
        }
    }
}

// =============================================================================
// COMPRESSION ERROR
// =============================================================================

/// Errors during compression/decompression
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Compression failed: {0}")]
    CompressFailed(std::io::Error),

    #[error("Decompression failed: {0}")]
    DecompressFailed(std::io::Error),

    #[error("Invalid base64 payload: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Compression level {0} outside zstd's supported range")]
    InvalidLevel(i32),
}

// =============================================================================
// EVENT COMPRESSOR
// =============================================================================

/// Threshold-gated zstd compressor for JSON payloads.
#[derive(Debug, Clone, Default)]
pub struct EventCompressor {
    config: CompressionConfig,
}

impl EventCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Compress `data` if its serialized size reaches the threshold.
    ///
    /// Never fails: on error the original payload is returned.
    pub fn compress(&self, data: &Value) -> Value {
        if !self.config.enabled || Self::is_compressed(data) {
            return data.clone();
        }

        match self.try_compress(data) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => data.clone(),
            Err(e) => {
                warn!(error = %e, "Payload compression failed, sending uncompressed");
                data.clone()
            }
        }
    }

    /// Compress, returning `Ok(None)` when below the threshold.
    pub fn try_compress(&self, data: &Value) -> Result<Option<Value>, CompressionError> {
        let raw = serde_json::to_vec(data)?;
        if raw.len() < self.config.threshold_bytes {
            return Ok(None);
        }
        if !zstd::compression_level_range().contains(&self.config.level) {
            return Err(CompressionError::InvalidLevel(self.config.level));
        }

        let compressed =
            zstd::encode_all(raw.as_slice(), self.config.level).map_err(CompressionError::CompressFailed)?;

        debug!(
            original = raw.len(),
            compressed = compressed.len(),
            "Payload compressed"
        );

        Ok(Some(json!({
            COMPRESSED_KEY: ENCODING,
            "data": STANDARD.encode(&compressed),
            "original_size": raw.len(),
        })))
    }

    /// Reverse [`EventCompressor::compress`]. Uncompressed values are returned
    /// unchanged.
    pub fn decompress(&self, data: &Value) -> Result<Value, CompressionError> {
        let encoded = match Self::envelope_data(data) {
            Some(encoded) => encoded,
            None => return Ok(data.clone()),
        };

        let compressed = STANDARD.decode(encoded)?;
        let raw = zstd::decode_all(compressed.as_slice()).map_err(CompressionError::DecompressFailed)?;

        Ok(serde_json::from_slice(&raw)?)
    }

    /// Whether `data` is a compression envelope.
    pub fn is_compressed(data: &Value) -> bool {
        Self::envelope_data(data).is_some()
    }

    fn envelope_data(data: &Value) -> Option<&str> {
        let fields = data.as_object()?;
        if fields.len() != 3
            || fields.get(COMPRESSED_KEY)?.as_str()? != ENCODING
            || !fields.get("original_size")?.is_u64()
        {
            return None;
        }
        fields.get("data")?.as_str()
    }
}
