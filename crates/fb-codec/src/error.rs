//! Codec error type.

use std::time::Duration;

use fb_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised by the framing layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Transport failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A frame exceeds the configured maximum.
    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Frame payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The zlib stream is corrupt or could not be produced.
    #[error("compression error: {0}")]
    Compression(String),

    /// No frame arrived within the read timeout.
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),
}

impl CodecError {
    /// Whether the error leaves the connection unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ReadTimeout(_))
    }
}
