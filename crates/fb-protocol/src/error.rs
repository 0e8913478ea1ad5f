//! Protocol-level error type.

use thiserror::Error;

/// Errors raised while encoding or decoding wire messages.
///
/// These never carry server diagnostics; a server-reported failure arrives as
/// a well-formed response whose [`StatusVector`](crate::StatusVector) is an
/// error, not as a `ProtocolError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The buffer ended before the value was complete.
    #[error("unexpected end of message")]
    UnexpectedEof,

    /// A frame header announced more bytes than were available.
    #[error("incomplete frame: expected {expected} bytes, have {actual}")]
    IncompleteFrame {
        /// Bytes announced by the header.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// A frame exceeds the configured maximum size.
    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Announced size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Unknown operation code.
    #[error("invalid operation code: {0}")]
    InvalidOperation(u32),

    /// An operation arrived where a different one was required.
    #[error("unexpected operation: expected {expected}, got {actual}")]
    UnexpectedOperation {
        /// What the reader was waiting for.
        expected: &'static str,
        /// Operation code actually read.
        actual: u32,
    },

    /// Unknown status vector argument tag.
    #[error("invalid status vector argument: {0}")]
    InvalidStatusArgument(u32),

    /// A string was not valid UTF-8.
    #[error("invalid string encoding")]
    StringEncoding,

    /// A field held a value outside its domain.
    #[error("invalid value for field {0}")]
    InvalidField(&'static str),

    /// Opaque value larger than the protocol allows.
    #[error("value of {0} bytes is too long for the wire")]
    ValueTooLong(usize),
}
