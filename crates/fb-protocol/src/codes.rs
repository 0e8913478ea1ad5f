//! Server error codes.
//!
//! Numbering follows the server's message catalogue so diagnostics read the
//! same as those of native tooling. Message templates use `@1`, `@2`, ...
//! for positional parameters.

macro_rules! error_codes {
    ($($(#[$doc:meta])* $name:ident = $value:literal => $text:literal,)*) => {
        $($(#[$doc])* pub const $name: u32 = $value;)*

        /// Message template for a known error code.
        #[must_use]
        pub fn message_template(code: u32) -> Option<&'static str> {
            match code {
                $($value => Some($text),)*
                _ => None,
            }
        }
    };
}

error_codes! {
    /// Bad database handle.
    BAD_DB_HANDLE = 335544324 => "invalid database handle (no active connection)",
    /// Bad statement request handle.
    BAD_REQ_HANDLE = 335544327 => "invalid request handle",
    /// Bad blob handle.
    BAD_SEGSTR_HANDLE = 335544328 => "invalid BLOB handle",
    /// Unknown blob id.
    BAD_SEGSTR_ID = 335544329 => "invalid BLOB ID",
    /// Malformed transaction parameter buffer.
    BAD_TPB_FORM = 335544331 => "improperly formatted transaction parameter block",
    /// Bad transaction handle.
    BAD_TRANS_HANDLE = 335544332 => "invalid transaction handle (expecting explicit transaction start)",
    /// Deadlock.
    DEADLOCK = 335544336 => "deadlock",
    /// Lock conflict in a no-wait transaction.
    LOCK_CONFLICT = 335544345 => "lock conflict on no wait transaction",
    /// No current record.
    NO_CUR_REC = 335544348 => "no current record for fetch operation",
    /// Unique constraint violation.
    NO_DUP = 335544349 => "attempt to store duplicate value (visible to active transactions) in unique index \"@1\"",
    /// Blob opened again without being closed.
    NO_SEGSTR_CLOSE = 335544355 => "BLOB was not closed",
    /// Detach attempted with active transactions.
    OPEN_TRANS = 335544357 => "cannot disconnect database with open transactions (@1 active)",
    /// Request synchronisation error.
    REQ_SYNC = 335544364 => "request synchronization error",
    /// Segment longer than the buffer.
    SEGMENT = 335544366 => "segment buffer length shorter than expected",
    /// Read past the last segment.
    SEGSTR_EOF = 335544367 => "attempted retrieval of more segments than exist",
    /// Invalid blob operation.
    SEGSTR_NO_OP = 335544368 => "attempted invalid operation on a BLOB",
    /// Read of an output blob.
    SEGSTR_NO_READ = 335544369 => "attempted read of a new, open BLOB",
    /// Blob used outside its transaction.
    SEGSTR_NO_TRANS = 335544370 => "attempted action on BLOB outside transaction",
    /// Write to an input blob.
    SEGSTR_NO_WRITE = 335544371 => "attempted write to read-only BLOB",
    /// Blob from another database.
    SEGSTR_WRONG_DB = 335544372 => "attempted reference to BLOB in unavailable database",
    /// Fetch past the end of a cursor.
    STREAM_EOF = 335544374 => "attempt to fetch past the last record in a record stream",
    /// Database unavailable.
    UNAVAILABLE = 335544375 => "unavailable database",
    /// Free-form message.
    RANDOM = 335544382 => "@1",
    /// Negotiation rejected by the server.
    CONNECT_REJECT = 335544421 => "connection rejected by remote interface",
    /// Generic SQL error.
    SQLERR = 335544436 => "SQL error code = @1",
    /// Seek on a segmented blob.
    BAD_SEGSTR_TYPE = 335544465 => "invalid BLOB type for operation",
    /// Transaction in a state that forbids the operation.
    TRA_STATE = 335544468 => "transaction @1 is in an ill-defined state",
    /// Bad statement handle.
    BAD_STMT_HANDLE = 335544485 => "invalid statement handle",
    /// Lock wait timed out.
    LOCK_TIMEOUT = 335544510 => "lock time-out on wait transaction",
    /// Database shut down.
    SHUTDOWN = 335544528 => "database @1 shutdown",
    /// Bad service handle.
    BAD_SVC_HANDLE = 335544559 => "invalid service handle",
    /// Dynamic SQL error.
    DSQL_ERROR = 335544569 => "Dynamic SQL Error",
    /// Invalid cursor reference.
    DSQL_CURSOR_ERR = 335544572 => "Invalid cursor reference",
    /// Cursor opened twice.
    DSQL_CURSOR_OPEN_ERR = 335544576 => "Attempt to reopen an open cursor",
    /// Cursor closed twice.
    DSQL_CURSOR_CLOSE_ERR = 335544577 => "Attempt to reclose a closed cursor",
    /// Descriptor mismatch.
    DSQL_SQLDA_ERR = 335544583 => "SQLDA error",
    /// Execute before prepare.
    UNPREPARED_STMT = 335544711 => "Attempt to execute an unprepared dynamic SQL statement.",
    /// Network failure.
    NETWORK_ERROR = 335544721 => "Unable to complete network request to host \"@1\"",
    /// Connection could not be established.
    NET_CONNECT_ERR = 335544722 => "Failed to establish a connection.",
    /// Read failure.
    NET_READ_ERR = 335544726 => "Error reading data from the connection.",
    /// Write failure.
    NET_WRITE_ERR = 335544727 => "Error writing data to the connection.",
    /// Operation cancelled.
    CANCELLED = 335544794 => "operation was cancelled",
    /// Statement timeout expired on the server.
    REQ_STMT_TIMEOUT = 335545267 => "Statement level timeout expired.",
}

/// Format a message for `code`, substituting `params` into the template.
///
/// Unknown codes render as `error code <n>`.
#[must_use]
pub fn format_message(code: u32, params: &[String]) -> String {
    let Some(template) = message_template(code) else {
        return format!("error code {code}");
    };
    let mut message = template.to_string();
    // Replace from the highest index down so @1 does not clobber @10.
    for (index, param) in params.iter().enumerate().rev() {
        message = message.replace(&format!("@{}", index + 1), param);
    }
    message
}
