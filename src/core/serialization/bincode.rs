/*!
 * Binary Frame Serialization with bincode
 * Versioned, length-prefixed frames for child-to-parent result transport
 *
 * Format: [1-byte version][4-byte LE length][bincode body]
 */

use crate::core::limits::{MAX_RESULT_FRAME_SIZE, RESULT_FRAME_HEADER_LEN, RESULT_FRAME_VERSION};
use serde::{de::DeserializeOwned, Serialize};

/// Result type for bincode operations
pub type BincodeResult<T> = Result<T, BincodeError>;

/// Binary serialization errors with rich context
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[non_exhaustive]
pub enum BincodeError {
    #[error("Serialization failed: {context}")]
    #[diagnostic(code(forklift::frame::encode))]
    Serialization {
        context: &'static str,
        #[source]
        source: Box<bincode::ErrorKind>,
    },

    #[error("Deserialization failed: {context}")]
    #[diagnostic(code(forklift::frame::decode))]
    Deserialization {
        context: &'static str,
        #[source]
        source: Box<bincode::ErrorKind>,
    },

    #[error("Buffer too small: expected {expected} bytes, got {actual} bytes")]
    #[diagnostic(code(forklift::frame::truncated))]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Invalid format version: expected {expected}, got {actual}")]
    #[diagnostic(code(forklift::frame::version))]
    InvalidVersion { expected: u8, actual: u8 },

    #[error("Frame too large: {size} bytes (limit {limit})")]
    #[diagnostic(code(forklift::frame::too_large))]
    FrameTooLarge { size: usize, limit: usize },
}

/// Serialize to binary bytes using bincode
#[inline]
pub fn to_vec<T: Serialize>(value: &T) -> BincodeResult<Vec<u8>> {
    bincode::serialize(value).map_err(|source| BincodeError::Serialization {
        context: "standard serialization",
        source,
    })
}

/// Deserialize from binary bytes using bincode
#[inline]
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> BincodeResult<T> {
    bincode::deserialize(bytes).map_err(|source| BincodeError::Deserialization {
        context: "standard deserialization",
        source,
    })
}

/// Serialize with version and size prefix
pub fn to_vec_with_header<T: Serialize>(value: &T) -> BincodeResult<Vec<u8>> {
    let data = to_vec(value)?;
    if data.len() > MAX_RESULT_FRAME_SIZE {
        return Err(BincodeError::FrameTooLarge {
            size: data.len(),
            limit: MAX_RESULT_FRAME_SIZE,
        });
    }
    let len = data.len() as u32;

    let mut result = Vec::with_capacity(RESULT_FRAME_HEADER_LEN + data.len());
    result.push(RESULT_FRAME_VERSION);
    result.extend_from_slice(&len.to_le_bytes());
    result.extend_from_slice(&data);

    Ok(result)
}

/// Deserialize from versioned size-prefixed format
///
/// Rejects unknown versions and truncated bodies.
pub fn from_slice_with_header<T: DeserializeOwned>(bytes: &[u8]) -> BincodeResult<T> {
    if bytes.len() < RESULT_FRAME_HEADER_LEN {
        return Err(BincodeError::BufferTooSmall {
            expected: RESULT_FRAME_HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != RESULT_FRAME_VERSION {
        return Err(BincodeError::InvalidVersion {
            expected: RESULT_FRAME_VERSION,
            actual: version,
        });
    }

    let len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    if len > MAX_RESULT_FRAME_SIZE {
        return Err(BincodeError::FrameTooLarge {
            size: len,
            limit: MAX_RESULT_FRAME_SIZE,
        });
    }

    let end = RESULT_FRAME_HEADER_LEN + len;
    if bytes.len() < end {
        return Err(BincodeError::BufferTooSmall {
            expected: end,
            actual: bytes.len(),
        });
    }

    from_slice(&bytes[RESULT_FRAME_HEADER_LEN..end])
}
