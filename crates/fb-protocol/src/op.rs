//! Operation codes.

use crate::error::ProtocolError;

macro_rules! operations {
    ($($(#[$doc:meta])* $name:ident = $value:literal,)*) => {
        /// Wire operation code.
        ///
        /// The first `u32` of every message.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        #[non_exhaustive]
        pub enum Operation {
            $($(#[$doc])* $name = $value,)*
        }

        impl Operation {
            /// Create an operation from its raw code.
            pub fn from_u32(value: u32) -> Result<Self, ProtocolError> {
                match value {
                    $($value => Ok(Self::$name),)*
                    _ => Err(ProtocolError::InvalidOperation(value)),
                }
            }

            /// Raw code of this operation.
            #[must_use]
            pub const fn code(self) -> u32 {
                self as u32
            }
        }
    };
}

operations! {
    /// Protocol negotiation request.
    Connect = 1,
    /// Server is going away.
    Exit = 2,
    /// Negotiation accepted.
    Accept = 3,
    /// Negotiation rejected.
    Reject = 4,
    /// Orderly close of the connection.
    Disconnect = 6,
    /// Generic response.
    Response = 9,
    /// Attach to a database.
    Attach = 19,
    /// Create a database.
    Create = 20,
    /// Detach from a database.
    Detach = 21,
    /// Start a transaction.
    Transaction = 29,
    /// Commit a transaction.
    Commit = 30,
    /// Roll back a transaction.
    Rollback = 31,
    /// Prepare a transaction for two-phase commit.
    Prepare = 32,
    /// Reconnect to a limbo transaction.
    Reconnect = 33,
    /// Open an existing blob for reading.
    OpenBlob = 35,
    /// Read blob segments.
    GetSegment = 36,
    /// Write one blob segment.
    PutSegment = 37,
    /// Discard an output blob.
    CancelBlob = 38,
    /// Close a blob.
    CloseBlob = 39,
    /// Database information request.
    InfoDatabase = 40,
    /// Transaction information request.
    InfoTransaction = 42,
    /// Blob information request.
    InfoBlob = 43,
    /// Write several blob segments at once.
    BatchSegments = 44,
    /// Register interest in events.
    QueEvents = 48,
    /// Cancel an event registration.
    CancelEvents = 49,
    /// Commit and keep the transaction context.
    CommitRetaining = 50,
    /// Event notification on the auxiliary channel.
    Event = 52,
    /// Request an auxiliary channel.
    ConnectRequest = 53,
    /// Create a blob for writing.
    CreateBlob = 57,
    /// Reposition a stream blob.
    SeekBlob = 61,
    /// Allocate a statement handle.
    AllocateStatement = 62,
    /// Execute a prepared statement.
    Execute = 63,
    /// Execute a statement text without preparing.
    ExecImmediate = 64,
    /// Fetch rows from an open cursor.
    Fetch = 65,
    /// Rows returned by a fetch.
    FetchResponse = 66,
    /// Close, unprepare or drop a statement.
    FreeStatement = 67,
    /// Prepare statement text.
    PrepareStatement = 68,
    /// Name the cursor of a statement.
    SetCursor = 69,
    /// Statement information request.
    InfoSql = 70,
    /// Keep-alive.
    Dummy = 71,
    /// Execute a statement producing a singleton row.
    Execute2 = 76,
    /// Singleton row response.
    SqlResponse = 78,
    /// Drop the attached database.
    DropDatabase = 81,
    /// Attach to the service manager.
    ServiceAttach = 82,
    /// Detach from the service manager.
    ServiceDetach = 83,
    /// Service information request.
    ServiceInfo = 84,
    /// Start a service action.
    ServiceStart = 85,
    /// Roll back and keep the transaction context.
    RollbackRetaining = 86,
    /// Cancel the running operation.
    Cancel = 91,
    /// Create a server-side batch.
    BatchCreate = 99,
    /// Add messages to a batch.
    BatchMsg = 100,
    /// Execute a batch.
    BatchExec = 101,
    /// Release a batch.
    BatchRelease = 102,
    /// Batch completion state.
    BatchCompletion = 103,
    /// Blob delivered along with fetched rows.
    InlineBlob = 114,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_u32() {
        assert_eq!(Operation::from_u32(9).unwrap(), Operation::Response);
        assert_eq!(Operation::from_u32(114).unwrap(), Operation::InlineBlob);
        assert_eq!(Operation::Fetch.code(), 65);
        assert_eq!(
            Operation::from_u32(5000),
            Err(ProtocolError::InvalidOperation(5000))
        );
    }
}
