//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding, decoding or type parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A value type string could not be parsed.
    #[error("invalid type string {input:?} at position {position}")]
    InvalidTypeString {
        /// The full input that was being parsed.
        input: String,
        /// Byte offset where parsing stopped.
        position: usize,
    },

    /// A value does not match the type it was expected to have.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The expected type string.
        expected: String,
        /// What was found instead.
        found: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid type string error.
    pub fn invalid_type_string(input: impl Into<String>, position: usize) -> Self {
        Self::InvalidTypeString {
            input: input.into(),
            position,
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
