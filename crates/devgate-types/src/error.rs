//! Error types for payload decoding in devgate-types.

use thiserror::Error;

/// Errors that can occur when decoding a raw backend payload into a value.
///
/// This error type is transport-agnostic and does not include backend
/// or session errors (those belong in devgate-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload is shorter than the decoder requires.
    #[error("Insufficient bytes: decoder requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes the decoder needs.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// The payload has the right size but an invalid content.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl DecodeError {
    /// Create an insufficient bytes error.
    pub fn insufficient(expected: usize, actual: usize) -> Self {
        Self::InsufficientBytes { expected, actual }
    }

    /// Fail with [`DecodeError::InsufficientBytes`] when `data` is shorter than `expected`.
    pub fn require_len(data: &[u8], expected: usize) -> DecodeResult<()> {
        if data.len() < expected {
            Err(Self::insufficient(expected, data.len()))
        } else {
            Ok(())
        }
    }
}

/// A protocol name that does not correspond to any known transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown protocol: {0}")]
pub struct UnknownProtocol(pub String);

/// Result type alias using devgate-types' DecodeError type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
