//! Client error types.

use std::sync::Arc;

use fb_protocol::{StatusVector, codes};
use thiserror::Error;

/// Errors that can occur during client operations.
///
/// Variants fall into the classes reported by the classification helpers:
/// transport failures leave the attachment unusable, state errors are caller
/// mistakes that leave it usable, server errors carry the server's
/// [`StatusVector`], and timeouts and cancellations are reported separately.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connection closed unexpectedly or was aborted.
    #[error("connection closed")]
    ConnectionClosed,

    /// TCP connection was not established in time.
    #[error("connection timed out")]
    ConnectTimeout,

    /// Protocol negotiation failed.
    #[error("protocol negotiation failed: {0}")]
    Negotiation(String),

    /// Malformed message.
    #[error("protocol error: {0}")]
    Protocol(#[from] fb_protocol::ProtocolError),

    /// Framing or transport error.
    #[error("codec error: {0}")]
    Codec(#[from] fb_codec::CodecError),

    /// Value conversion error.
    #[error("type error: {0}")]
    Type(#[from] fb_types::TypeError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// The server reported an error.
    #[error("server error: {0}")]
    Server(StatusVector),

    /// Operation not valid in the object's current state.
    #[error("{message}")]
    InvalidState {
        /// Error code from the server's catalogue.
        code: u32,
        /// Message.
        message: String,
    },

    /// Parameter values do not match the parameter descriptor.
    #[error("expected {expected} parameters, got {actual}")]
    InvalidParameterCount {
        /// Parameters described by prepare.
        expected: usize,
        /// Parameters supplied.
        actual: usize,
    },

    /// Operation needs a capability the negotiated protocol lacks.
    #[error("operation requires {0}, not supported by the negotiated protocol")]
    Unsupported(&'static str),

    /// Statement timeout expired.
    #[error("statement timed out")]
    StatementTimeout,

    /// The operation was cancelled.
    #[error("operation was cancelled")]
    Cancelled,

    /// A batch stopped at a failing item.
    #[error(transparent)]
    Batch(Box<BatchError>),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// Partial result of a batch that stopped at its first failure.
#[derive(Debug, Error)]
#[error("batch item {failed_index} failed after {} completed: {source}", .completed.len())]
pub struct BatchError {
    /// Affected rows of every item before the failing one.
    pub completed: Vec<u64>,
    /// Zero-based index of the failing item.
    pub failed_index: usize,
    /// Failure of that item.
    pub source: Error,
}

impl Error {
    /// State error with a catalogue code; the message comes from the catalogue.
    pub(crate) fn state(code: u32) -> Self {
        Self::InvalidState {
            code,
            message: codes::format_message(code, &[]),
        }
    }

    /// State error with a catalogue code and message parameters.
    pub(crate) fn state_with(code: u32, params: &[String]) -> Self {
        Self::InvalidState {
            code,
            message: codes::format_message(code, params),
        }
    }

    /// Map a failed status vector to an error.
    pub(crate) fn from_status(status: StatusVector) -> Self {
        if status.contains(codes::REQ_STMT_TIMEOUT) {
            Self::StatementTimeout
        } else if status.contains(codes::CANCELLED) {
            Self::Cancelled
        } else {
            Self::Server(status)
        }
    }

    /// Whether the connection is unusable after this error.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::ConnectionClosed
            | Self::ConnectTimeout
            | Self::Negotiation(_)
            | Self::Protocol(_)
            | Self::Io(_) => true,
            Self::Codec(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Whether this is a caller error against the current object state.
    #[must_use]
    pub fn is_state(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. } | Self::InvalidParameterCount { .. } | Self::Unsupported(_)
        )
    }

    /// Whether the server reported the failure.
    #[must_use]
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    /// Whether a statement or transport deadline expired.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::StatementTimeout
                | Self::ConnectTimeout
                | Self::Codec(fb_codec::CodecError::ReadTimeout(_))
        )
    }

    /// Whether the operation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// The client never retries on its own; this is a hint for callers.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectTimeout | Self::StatementTimeout | Self::ConnectionClosed | Self::Io(_) => {
                true
            }
            Self::Server(status) => {
                status.contains(codes::DEADLOCK)
                    || status.contains(codes::LOCK_CONFLICT)
                    || status.contains(codes::LOCK_TIMEOUT)
            }
            _ => false,
        }
    }

    /// Server error code, for server and state errors.
    #[must_use]
    pub fn error_code(&self) -> Option<u32> {
        match self {
            Self::Server(status) => status.error_code(),
            Self::InvalidState { code, .. } => Some(*code),
            Self::StatementTimeout => Some(codes::REQ_STMT_TIMEOUT),
            Self::Cancelled => Some(codes::CANCELLED),
            Self::Batch(batch) => batch.source.error_code(),
            _ => None,
        }
    }

    /// Status vector reported by the server.
    #[must_use]
    pub fn status_vector(&self) -> Option<&StatusVector> {
        match self {
            Self::Server(status) => Some(status),
            Self::Batch(batch) => batch.source.status_vector(),
            _ => None,
        }
    }

    /// Check if this is a server or state error with a specific code.
    #[must_use]
    pub fn is_server_error(&self, code: u32) -> bool {
        match self {
            Self::Server(status) => status.contains(code),
            _ => self.error_code() == Some(code),
        }
    }

    /// The batch partial result, if this is a batch failure.
    #[must_use]
    pub fn as_batch(&self) -> Option<&BatchError> {
        match self {
            Self::Batch(batch) => Some(batch),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use fb_protocol::StatusEntry;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            Error::from_status(StatusVector::error(codes::REQ_STMT_TIMEOUT)),
            Error::StatementTimeout
        ));
        assert!(Error::from_status(StatusVector::error(codes::CANCELLED)).is_cancelled());

        let server = Error::from_status(StatusVector::error(codes::NO_DUP));
        assert!(server.is_server());
        assert_eq!(server.error_code(), Some(codes::NO_DUP));
        assert!(!server.is_transient());
    }

    #[test]
    fn test_state_message_from_catalogue() {
        let err = Error::state(codes::SEGSTR_NO_OP);
        assert!(err.is_state());
        assert!(err.is_server_error(codes::SEGSTR_NO_OP));
        assert_eq!(err.to_string(), "attempted invalid operation on a BLOB");

        let err = Error::state_with(codes::OPEN_TRANS, &["1".to_string()]);
        assert_eq!(
            err.to_string(),
            "cannot disconnect database with open transactions (1 active)"
        );
    }

    #[test]
    fn test_lock_conflict_is_transient() {
        let status = StatusVector::from_entry(StatusEntry::error(codes::LOCK_CONFLICT));
        assert!(Error::Server(status).is_transient());
    }

    #[test]
    fn test_batch_error_exposes_source() {
        let err = Error::Batch(Box::new(BatchError {
            completed: vec![1, 1],
            failed_index: 2,
            source: Error::Server(StatusVector::error(codes::NO_DUP)),
        }));
        assert_eq!(err.error_code(), Some(codes::NO_DUP));
        assert_eq!(err.as_batch().map(|b| b.completed.len()), Some(2));
        assert!(err.status_vector().is_some());
    }

    #[test]
    fn test_transport_classification() {
        assert!(Error::ConnectionClosed.is_transport());
        assert!(Error::ConnectTimeout.is_transport());
        let refused = Error::from(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(matches!(refused, Error::Io(_)));
        assert!(refused.is_transport());
        assert!(Error::Negotiation("no common revision".into()).is_transport());
        assert!(!Error::StatementTimeout.is_transport());
        assert!(Error::StatementTimeout.is_timeout());
    }
}
