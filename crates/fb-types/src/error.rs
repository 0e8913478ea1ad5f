//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TypeError {
    /// Value is out of range for the target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// Buffer too short for the value.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// String data not representable in, or not valid for, the charset.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),

    /// The charset is not known to the lookup service.
    #[error("unknown character set: {0}")]
    UnknownCharset(String),

    /// Invalid date/time value.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// Invalid decimal value.
    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),
}
