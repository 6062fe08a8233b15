//! # Persistence Format
//!
//! Binary serialization for run summaries.
//!
//! File I/O happens in the binary; this module is a pure bytes transformation.
//!
//! Format: Header (5 bytes) + postcard-serialized `RunSummary`.
//! - 4 bytes: Magic ("AGRS")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded.

use crate::export::RunSummary;
use crate::{AgoraError, primitives};

/// Maximum accepted encoded summary size.
pub const MAX_SUMMARY_SIZE: usize = 256 * 1024 * 1024; // 256 MB

const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header preceding every encoded summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SummaryHeader {
    /// A header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), AgoraError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(AgoraError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(AgoraError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let [a, b, c, d] = self.magic;
        [a, b, c, d, self.version]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AgoraError> {
        match bytes {
            [a, b, c, d, version, ..] => Ok(Self {
                magic: [*a, *b, *c, *d],
                version: *version,
            }),
            _ => Err(AgoraError::DeserializationError(
                "Header too short".to_string(),
            )),
        }
    }
}

impl Default for SummaryHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Encode a summary (header + payload).
pub fn summary_to_bytes(summary: &RunSummary) -> Result<Vec<u8>, AgoraError> {
    let payload =
        postcard::to_stdvec(summary).map_err(|e| AgoraError::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&SummaryHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a summary produced by `summary_to_bytes`.
pub fn summary_from_bytes(bytes: &[u8]) -> Result<RunSummary, AgoraError> {
    if bytes.len() > MAX_SUMMARY_SIZE {
        return Err(AgoraError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SUMMARY_SIZE
        )));
    }

    let header = SummaryHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(HEADER_SIZE..).unwrap_or_default();
    postcard::from_bytes(payload).map_err(|e| {
        AgoraError::DeserializationError(format!("Failed to decode summary: {e}"))
    })
}

// =============================================================================
// TESTS
// =============================================================================
