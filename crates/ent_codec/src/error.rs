//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised by encoders and decoders.
///
/// Encoders and decoders hold on to the first error they encounter (see
/// [`crate::Encoder::err`]), so these values are cloned out rather than moved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a value.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// NaN and infinite floats have no text form.
    #[error("unsupported float value {value}")]
    UnsupportedFloat {
        /// Text rendering of the rejected value.
        value: String,
    },

    /// A value kind that can not be part of an index key.
    #[error("can't index {kind}")]
    Unindexable {
        /// What was rejected ("lists", "dicts", "nested blobs").
        kind: &'static str,
    },

    /// A compound key received a different number of keys and values.
    #[error("unbalanced key-value: {keys} keys, {values} values")]
    UnbalancedKeyValues {
        /// Number of keys written.
        keys: usize,
        /// Number of values written.
        values: usize,
    },

    /// The decoded value has a different type than requested.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The requested type.
        expected: &'static str,
        /// What was found instead.
        found: String,
    },

    /// An integer does not fit the requested bit width.
    #[error("integer {value} overflows {bitsize}-bit field")]
    IntegerOverflow {
        /// Text rendering of the value.
        value: String,
        /// Requested width in bits.
        bitsize: u32,
    },

    /// Malformed JSON input.
    #[error("json error: {message}")]
    Json {
        /// Parser message.
        message: String,
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

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: &'static str, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.into(),
        }
    }

    /// Create an integer overflow error.
    pub fn integer_overflow(value: impl ToString, bitsize: u32) -> Self {
        Self::IntegerOverflow {
            value: value.to_string(),
            bitsize,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}
