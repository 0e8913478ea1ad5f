//! Typed request and response messages.
//!
//! A message is an [`Operation`] code followed by the operation's arguments
//! in XDR. Both directions are implemented so the same definitions serve the
//! client and the test server.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::describe::RowData;
use crate::error::ProtocolError;
use crate::op::Operation;
use crate::status::StatusVector;
use crate::version::{ProtocolOffer, ProtocolRevision};
use crate::xdr;

/// Protocol version of the connect message itself.
pub const CONNECT_VERSION: u32 = 3;

/// Free option: close the cursor, keep the statement prepared.
pub const FREE_CLOSE: u32 = 1;
/// Free option: release the statement handle.
pub const FREE_DROP: u32 = 2;
/// Free option: keep the handle, forget the prepared text.
pub const FREE_UNPREPARE: u32 = 4;

/// Kind of an `op_cancel` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelKind {
    /// Ignore cancel requests until re-enabled.
    Disable,
    /// Accept cancel requests again.
    Enable,
    /// Cancel the running operation.
    Raise,
    /// Abort the connection.
    Abort,
}

impl CancelKind {
    /// Wire code of this kind.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Disable => 1,
            Self::Enable => 2,
            Self::Raise => 3,
            Self::Abort => 4,
        }
    }

    /// Kind for a wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Disable),
            2 => Some(Self::Enable),
            3 => Some(Self::Raise),
            4 => Some(Self::Abort),
            _ => None,
        }
    }
}

/// Arguments of `op_execute` and `op_execute2`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecuteRequest {
    /// Statement handle.
    pub statement: u32,
    /// Transaction handle.
    pub transaction: u32,
    /// Parameter row, if the statement takes parameters.
    pub parameters: Option<RowData>,
    /// Server-side timeout in milliseconds, 0 for none.
    pub timeout_ms: u32,
    /// Largest blob the server may send inline, 0 to disable.
    pub max_inline_blob_size: u32,
}

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Request {
    /// Protocol negotiation.
    Connect {
        /// Database or service the connection is for.
        database: String,
        /// Operating system user, informational.
        user: String,
        /// Offered protocols.
        offers: Vec<ProtocolOffer>,
    },
    /// Attach to an existing database.
    Attach {
        /// Database path or alias.
        database: String,
        /// Database parameter buffer.
        dpb: Bytes,
    },
    /// Create and attach to a new database.
    Create {
        /// Database path.
        database: String,
        /// Database parameter buffer.
        dpb: Bytes,
    },
    /// Detach from the database.
    Detach {
        /// Database handle.
        database: u32,
    },
    /// Drop the attached database.
    DropDatabase {
        /// Database handle.
        database: u32,
    },
    /// Attach to the service manager.
    ServiceAttach {
        /// Service name.
        service: String,
        /// Service parameter buffer.
        spb: Bytes,
    },
    /// Detach from the service manager.
    ServiceDetach {
        /// Service handle.
        service: u32,
    },
    /// Start a service action.
    ServiceStart {
        /// Service handle.
        service: u32,
        /// Service parameter buffer describing the action.
        spb: Bytes,
    },
    /// Query the service manager.
    ServiceInfo {
        /// Service handle.
        service: u32,
        /// Requested items.
        items: Bytes,
        /// Response buffer size.
        buffer_length: u32,
    },
    /// Query the database.
    InfoDatabase {
        /// Database handle.
        database: u32,
        /// Requested items.
        items: Bytes,
        /// Response buffer size.
        buffer_length: u32,
    },
    /// Start a transaction.
    Transaction {
        /// Database handle.
        database: u32,
        /// Transaction parameter buffer.
        tpb: Bytes,
    },
    /// Commit.
    Commit {
        /// Transaction handle.
        transaction: u32,
    },
    /// Commit retaining the transaction context.
    CommitRetaining {
        /// Transaction handle.
        transaction: u32,
    },
    /// Roll back.
    Rollback {
        /// Transaction handle.
        transaction: u32,
    },
    /// Roll back retaining the transaction context.
    RollbackRetaining {
        /// Transaction handle.
        transaction: u32,
    },
    /// First phase of a two-phase commit.
    Prepare {
        /// Transaction handle.
        transaction: u32,
        /// Recovery message stored with the prepared transaction.
        message: Bytes,
    },
    /// Reconnect to a prepared (limbo) transaction.
    Reconnect {
        /// Database handle.
        database: u32,
        /// Transaction id.
        transaction_id: u32,
    },
    /// Query a transaction.
    InfoTransaction {
        /// Transaction handle.
        transaction: u32,
        /// Requested items.
        items: Bytes,
        /// Response buffer size.
        buffer_length: u32,
    },
    /// Allocate a statement handle.
    AllocateStatement {
        /// Database handle.
        database: u32,
    },
    /// Prepare statement text.
    PrepareStatement {
        /// Transaction handle.
        transaction: u32,
        /// Statement handle.
        statement: u32,
        /// SQL dialect.
        dialect: u32,
        /// Statement text.
        sql: String,
    },
    /// Execute, possibly opening a cursor.
    Execute(ExecuteRequest),
    /// Execute returning a singleton row.
    Execute2(ExecuteRequest),
    /// Execute text without a statement handle.
    ExecImmediate {
        /// Transaction handle.
        transaction: u32,
        /// Database handle.
        database: u32,
        /// SQL dialect.
        dialect: u32,
        /// Statement text.
        sql: String,
    },
    /// Fetch rows.
    Fetch {
        /// Statement handle.
        statement: u32,
        /// Maximum rows to return.
        count: u32,
    },
    /// Close the cursor, unprepare or drop a statement.
    FreeStatement {
        /// Statement handle.
        statement: u32,
        /// One of [`FREE_CLOSE`], [`FREE_DROP`], [`FREE_UNPREPARE`].
        option: u32,
    },
    /// Name the cursor.
    SetCursor {
        /// Statement handle.
        statement: u32,
        /// Cursor name.
        name: String,
    },
    /// Query a statement.
    InfoSql {
        /// Statement handle.
        statement: u32,
        /// Requested items.
        items: Bytes,
        /// Response buffer size.
        buffer_length: u32,
    },
    /// Create a server batch for a prepared statement.
    BatchCreate {
        /// Statement handle.
        statement: u32,
        /// Server buffer size hint.
        buffer_size: u32,
    },
    /// Append parameter rows to a batch.
    BatchMsg {
        /// Statement handle.
        statement: u32,
        /// Parameter rows.
        rows: Vec<RowData>,
    },
    /// Execute a batch.
    BatchExec {
        /// Statement handle.
        statement: u32,
        /// Transaction handle.
        transaction: u32,
    },
    /// Release a batch.
    BatchRelease {
        /// Statement handle.
        statement: u32,
    },
    /// Create an output blob.
    CreateBlob {
        /// Transaction handle.
        transaction: u32,
        /// Blob parameter buffer.
        bpb: Bytes,
    },
    /// Open an input blob.
    OpenBlob {
        /// Transaction handle.
        transaction: u32,
        /// Blob id.
        blob_id: u64,
        /// Blob parameter buffer.
        bpb: Bytes,
    },
    /// Read segments.
    GetSegment {
        /// Blob handle.
        blob: u32,
        /// Maximum bytes to return.
        max_length: u32,
    },
    /// Write one segment.
    PutSegment {
        /// Blob handle.
        blob: u32,
        /// Segment bytes.
        segment: Bytes,
    },
    /// Write several length-prefixed segments.
    BatchSegments {
        /// Blob handle.
        blob: u32,
        /// Segments, each as `u16 LE` length and bytes.
        data: Bytes,
    },
    /// Reposition a stream blob.
    SeekBlob {
        /// Blob handle.
        blob: u32,
        /// 0 absolute, 1 relative, 2 from end.
        mode: u32,
        /// Offset.
        offset: i64,
    },
    /// Query a blob.
    InfoBlob {
        /// Blob handle.
        blob: u32,
        /// Requested items.
        items: Bytes,
        /// Response buffer size.
        buffer_length: u32,
    },
    /// Close a blob.
    CloseBlob {
        /// Blob handle.
        blob: u32,
    },
    /// Discard an output blob.
    CancelBlob {
        /// Blob handle.
        blob: u32,
    },
    /// Ask for an auxiliary (event) channel.
    ConnectRequest {
        /// Database handle.
        database: u32,
    },
    /// Register for events.
    QueEvents {
        /// Database handle.
        database: u32,
        /// Event parameter buffer.
        epb: Bytes,
        /// Client-side id echoed back in notifications.
        local_id: u32,
    },
    /// Cancel an event registration.
    CancelEvents {
        /// Database handle.
        database: u32,
        /// Server-side event id.
        event_id: u32,
    },
    /// Cancel the running operation.
    Cancel {
        /// Cancel kind.
        kind: u32,
    },
    /// Keep-alive.
    Dummy,
    /// Orderly connection close.
    Disconnect,
}

impl Request {
    /// Operation code of this request.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Connect { .. } => Operation::Connect,
            Self::Attach { .. } => Operation::Attach,
            Self::Create { .. } => Operation::Create,
            Self::Detach { .. } => Operation::Detach,
            Self::DropDatabase { .. } => Operation::DropDatabase,
            Self::ServiceAttach { .. } => Operation::ServiceAttach,
            Self::ServiceDetach { .. } => Operation::ServiceDetach,
            Self::ServiceStart { .. } => Operation::ServiceStart,
            Self::ServiceInfo { .. } => Operation::ServiceInfo,
            Self::InfoDatabase { .. } => Operation::InfoDatabase,
            Self::Transaction { .. } => Operation::Transaction,
            Self::Commit { .. } => Operation::Commit,
            Self::CommitRetaining { .. } => Operation::CommitRetaining,
            Self::Rollback { .. } => Operation::Rollback,
            Self::RollbackRetaining { .. } => Operation::RollbackRetaining,
            Self::Prepare { .. } => Operation::Prepare,
            Self::Reconnect { .. } => Operation::Reconnect,
            Self::InfoTransaction { .. } => Operation::InfoTransaction,
            Self::AllocateStatement { .. } => Operation::AllocateStatement,
            Self::PrepareStatement { .. } => Operation::PrepareStatement,
            Self::Execute(_) => Operation::Execute,
            Self::Execute2(_) => Operation::Execute2,
            Self::ExecImmediate { .. } => Operation::ExecImmediate,
            Self::Fetch { .. } => Operation::Fetch,
            Self::FreeStatement { .. } => Operation::FreeStatement,
            Self::SetCursor { .. } => Operation::SetCursor,
            Self::InfoSql { .. } => Operation::InfoSql,
            Self::BatchCreate { .. } => Operation::BatchCreate,
            Self::BatchMsg { .. } => Operation::BatchMsg,
            Self::BatchExec { .. } => Operation::BatchExec,
            Self::BatchRelease { .. } => Operation::BatchRelease,
            Self::CreateBlob { .. } => Operation::CreateBlob,
            Self::OpenBlob { .. } => Operation::OpenBlob,
            Self::GetSegment { .. } => Operation::GetSegment,
            Self::PutSegment { .. } => Operation::PutSegment,
            Self::BatchSegments { .. } => Operation::BatchSegments,
            Self::SeekBlob { .. } => Operation::SeekBlob,
            Self::InfoBlob { .. } => Operation::InfoBlob,
            Self::CloseBlob { .. } => Operation::CloseBlob,
            Self::CancelBlob { .. } => Operation::CancelBlob,
            Self::ConnectRequest { .. } => Operation::ConnectRequest,
            Self::QueEvents { .. } => Operation::QueEvents,
            Self::CancelEvents { .. } => Operation::CancelEvents,
            Self::Cancel { .. } => Operation::Cancel,
            Self::Dummy => Operation::Dummy,
            Self::Disconnect => Operation::Disconnect,
        }
    }

    /// Whether the server answers this request.
    ///
    /// `op_cancel` and `op_disconnect` are fire-and-forget.
    #[must_use]
    pub fn expects_response(&self) -> bool {
        !matches!(self, Self::Cancel { .. } | Self::Disconnect)
    }

    /// Encode into a new buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Encode the operation code and arguments.
    pub fn encode(&self, dst: &mut impl BufMut) {
        xdr::write_u32(dst, self.operation().code());
        match self {
            Self::Connect {
                database,
                user,
                offers,
            } => {
                xdr::write_u32(dst, Operation::Attach.code());
                xdr::write_u32(dst, CONNECT_VERSION);
                xdr::write_string(dst, database);
                xdr::write_string(dst, user);
                xdr::write_u32(dst, offers.len() as u32);
                for offer in offers {
                    offer.encode(dst);
                }
            }
            Self::Attach { database, dpb }
            | Self::Create { database, dpb } => {
                xdr::write_u32(dst, 0);
                xdr::write_string(dst, database);
                xdr::write_opaque(dst, dpb);
            }
            Self::ServiceAttach { service, spb } => {
                xdr::write_u32(dst, 0);
                xdr::write_string(dst, service);
                xdr::write_opaque(dst, spb);
            }
            Self::Detach { database: handle }
            | Self::DropDatabase { database: handle }
            | Self::ServiceDetach { service: handle }
            | Self::Commit { transaction: handle }
            | Self::CommitRetaining { transaction: handle }
            | Self::Rollback { transaction: handle }
            | Self::RollbackRetaining { transaction: handle }
            | Self::AllocateStatement { database: handle }
            | Self::BatchRelease { statement: handle }
            | Self::CloseBlob { blob: handle }
            | Self::CancelBlob { blob: handle }
            | Self::ConnectRequest { database: handle }
            | Self::Cancel { kind: handle } => {
                xdr::write_u32(dst, *handle);
            }
            Self::ServiceStart { service, spb } => {
                xdr::write_u32(dst, *service);
                xdr::write_opaque(dst, spb);
            }
            Self::ServiceInfo {
                service: handle,
                items,
                buffer_length,
            }
            | Self::InfoDatabase {
                database: handle,
                items,
                buffer_length,
            }
            | Self::InfoTransaction {
                transaction: handle,
                items,
                buffer_length,
            }
            | Self::InfoSql {
                statement: handle,
                items,
                buffer_length,
            }
            | Self::InfoBlob {
                blob: handle,
                items,
                buffer_length,
            } => {
                xdr::write_u32(dst, *handle);
                xdr::write_opaque(dst, items);
                xdr::write_u32(dst, *buffer_length);
            }
            Self::Transaction { database, tpb } => {
                xdr::write_u32(dst, *database);
                xdr::write_opaque(dst, tpb);
            }
            Self::Prepare {
                transaction,
                message,
            } => {
                xdr::write_u32(dst, *transaction);
                xdr::write_opaque(dst, message);
            }
            Self::Reconnect {
                database,
                transaction_id,
            } => {
                xdr::write_u32(dst, *database);
                xdr::write_u32(dst, *transaction_id);
            }
            Self::PrepareStatement {
                transaction,
                statement,
                dialect,
                sql,
            } => {
                xdr::write_u32(dst, *transaction);
                xdr::write_u32(dst, *statement);
                xdr::write_u32(dst, *dialect);
                xdr::write_string(dst, sql);
            }
            Self::Execute(request) | Self::Execute2(request) => {
                xdr::write_u32(dst, request.statement);
                xdr::write_u32(dst, request.transaction);
                match &request.parameters {
                    Some(row) => {
                        xdr::write_u32(dst, 1);
                        row.encode(dst);
                    }
                    None => xdr::write_u32(dst, 0),
                }
                xdr::write_u32(dst, request.timeout_ms);
                xdr::write_u32(dst, request.max_inline_blob_size);
            }
            Self::ExecImmediate {
                transaction,
                database,
                dialect,
                sql,
            } => {
                xdr::write_u32(dst, *transaction);
                xdr::write_u32(dst, *database);
                xdr::write_u32(dst, *dialect);
                xdr::write_string(dst, sql);
            }
            Self::Fetch { statement, count } => {
                xdr::write_u32(dst, *statement);
                xdr::write_u32(dst, *count);
            }
            Self::FreeStatement { statement, option } => {
                xdr::write_u32(dst, *statement);
                xdr::write_u32(dst, *option);
            }
            Self::SetCursor { statement, name } => {
                xdr::write_u32(dst, *statement);
                xdr::write_string(dst, name);
            }
            Self::BatchCreate {
                statement,
                buffer_size,
            } => {
                xdr::write_u32(dst, *statement);
                xdr::write_u32(dst, *buffer_size);
            }
            Self::BatchMsg { statement, rows } => {
                xdr::write_u32(dst, *statement);
                xdr::write_u32(dst, rows.len() as u32);
                for row in rows {
                    row.encode(dst);
                }
            }
            Self::BatchExec {
                statement,
                transaction,
            } => {
                xdr::write_u32(dst, *statement);
                xdr::write_u32(dst, *transaction);
            }
            Self::CreateBlob { transaction, bpb } => {
                xdr::write_u32(dst, *transaction);
                xdr::write_opaque(dst, bpb);
            }
            Self::OpenBlob {
                transaction,
                blob_id,
                bpb,
            } => {
                xdr::write_u32(dst, *transaction);
                xdr::write_u64(dst, *blob_id);
                xdr::write_opaque(dst, bpb);
            }
            Self::GetSegment { blob, max_length } => {
                xdr::write_u32(dst, *blob);
                xdr::write_u32(dst, *max_length);
            }
            Self::PutSegment { blob, segment: data }
            | Self::BatchSegments { blob, data } => {
                xdr::write_u32(dst, *blob);
                xdr::write_opaque(dst, data);
            }
            Self::SeekBlob { blob, mode, offset } => {
                xdr::write_u32(dst, *blob);
                xdr::write_u32(dst, *mode);
                xdr::write_i64(dst, *offset);
            }
            Self::QueEvents {
                database,
                epb,
                local_id,
            } => {
                xdr::write_u32(dst, *database);
                xdr::write_opaque(dst, epb);
                xdr::write_u32(dst, *local_id);
            }
            Self::CancelEvents { database, event_id } => {
                xdr::write_u32(dst, *database);
                xdr::write_u32(dst, *event_id);
            }
            Self::Dummy | Self::Disconnect => {}
        }
    }

    /// Decode a request, including its operation code.
    pub fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        let op = Operation::from_u32(xdr::read_u32(src)?)?;
        let request = match op {
            Operation::Connect => {
                let _attach_op = xdr::read_u32(src)?;
                let _version = xdr::read_u32(src)?;
                let database = xdr::read_string(src)?;
                let user = xdr::read_string(src)?;
                let count = xdr::read_u32(src)? as usize;
                if count > src.remaining() / 20 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let offers = (0..count)
                    .map(|_| ProtocolOffer::decode(src))
                    .collect::<Result<_, _>>()?;
                Self::Connect {
                    database,
                    user,
                    offers,
                }
            }
            Operation::Attach | Operation::Create => {
                let _ = xdr::read_u32(src)?;
                let database = xdr::read_string(src)?;
                let dpb = xdr::read_opaque(src)?;
                if op == Operation::Attach {
                    Self::Attach { database, dpb }
                } else {
                    Self::Create { database, dpb }
                }
            }
            Operation::ServiceAttach => {
                let _ = xdr::read_u32(src)?;
                Self::ServiceAttach {
                    service: xdr::read_string(src)?,
                    spb: xdr::read_opaque(src)?,
                }
            }
            Operation::Detach => Self::Detach {
                database: xdr::read_u32(src)?,
            },
            Operation::DropDatabase => Self::DropDatabase {
                database: xdr::read_u32(src)?,
            },
            Operation::ServiceDetach => Self::ServiceDetach {
                service: xdr::read_u32(src)?,
            },
            Operation::Commit => Self::Commit {
                transaction: xdr::read_u32(src)?,
            },
            Operation::CommitRetaining => Self::CommitRetaining {
                transaction: xdr::read_u32(src)?,
            },
            Operation::Rollback => Self::Rollback {
                transaction: xdr::read_u32(src)?,
            },
            Operation::RollbackRetaining => Self::RollbackRetaining {
                transaction: xdr::read_u32(src)?,
            },
            Operation::AllocateStatement => Self::AllocateStatement {
                database: xdr::read_u32(src)?,
            },
            Operation::BatchRelease => Self::BatchRelease {
                statement: xdr::read_u32(src)?,
            },
            Operation::CloseBlob => Self::CloseBlob {
                blob: xdr::read_u32(src)?,
            },
            Operation::CancelBlob => Self::CancelBlob {
                blob: xdr::read_u32(src)?,
            },
            Operation::ConnectRequest => Self::ConnectRequest {
                database: xdr::read_u32(src)?,
            },
            Operation::Cancel => Self::Cancel {
                kind: xdr::read_u32(src)?,
            },
            Operation::ServiceStart => Self::ServiceStart {
                service: xdr::read_u32(src)?,
                spb: xdr::read_opaque(src)?,
            },
            Operation::ServiceInfo
            | Operation::InfoDatabase
            | Operation::InfoTransaction
            | Operation::InfoSql
            | Operation::InfoBlob => {
                let handle = xdr::read_u32(src)?;
                let items = xdr::read_opaque(src)?;
                let buffer_length = xdr::read_u32(src)?;
                match op {
                    Operation::ServiceInfo => Self::ServiceInfo {
                        service: handle,
                        items,
                        buffer_length,
                    },
                    Operation::InfoDatabase => Self::InfoDatabase {
                        database: handle,
                        items,
                        buffer_length,
                    },
                    Operation::InfoTransaction => Self::InfoTransaction {
                        transaction: handle,
                        items,
                        buffer_length,
                    },
                    Operation::InfoSql => Self::InfoSql {
                        statement: handle,
                        items,
                        buffer_length,
                    },
                    _ => Self::InfoBlob {
                        blob: handle,
                        items,
                        buffer_length,
                    },
                }
            }
            Operation::Transaction => Self::Transaction {
                database: xdr::read_u32(src)?,
                tpb: xdr::read_opaque(src)?,
            },
            Operation::Prepare => Self::Prepare {
                transaction: xdr::read_u32(src)?,
                message: xdr::read_opaque(src)?,
            },
            Operation::Reconnect => Self::Reconnect {
                database: xdr::read_u32(src)?,
                transaction_id: xdr::read_u32(src)?,
            },
            Operation::PrepareStatement => Self::PrepareStatement {
                transaction: xdr::read_u32(src)?,
                statement: xdr::read_u32(src)?,
                dialect: xdr::read_u32(src)?,
                sql: xdr::read_string(src)?,
            },
            Operation::Execute | Operation::Execute2 => {
                let statement = xdr::read_u32(src)?;
                let transaction = xdr::read_u32(src)?;
                let parameters = if xdr::read_u32(src)? > 0 {
                    Some(RowData::decode(src)?)
                } else {
                    None
                };
                let request = ExecuteRequest {
                    statement,
                    transaction,
                    parameters,
                    timeout_ms: xdr::read_u32(src)?,
                    max_inline_blob_size: xdr::read_u32(src)?,
                };
                if op == Operation::Execute {
                    Self::Execute(request)
                } else {
                    Self::Execute2(request)
                }
            }
            Operation::ExecImmediate => Self::ExecImmediate {
                transaction: xdr::read_u32(src)?,
                database: xdr::read_u32(src)?,
                dialect: xdr::read_u32(src)?,
                sql: xdr::read_string(src)?,
            },
            Operation::Fetch => Self::Fetch {
                statement: xdr::read_u32(src)?,
                count: xdr::read_u32(src)?,
            },
            Operation::FreeStatement => Self::FreeStatement {
                statement: xdr::read_u32(src)?,
                option: xdr::read_u32(src)?,
            },
            Operation::SetCursor => Self::SetCursor {
                statement: xdr::read_u32(src)?,
                name: xdr::read_string(src)?,
            },
            Operation::BatchCreate => Self::BatchCreate {
                statement: xdr::read_u32(src)?,
                buffer_size: xdr::read_u32(src)?,
            },
            Operation::BatchMsg => {
                let statement = xdr::read_u32(src)?;
                let count = xdr::read_u32(src)? as usize;
                if count > src.remaining() / 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let rows = (0..count)
                    .map(|_| RowData::decode(src))
                    .collect::<Result<_, _>>()?;
                Self::BatchMsg { statement, rows }
            }
            Operation::BatchExec => Self::BatchExec {
                statement: xdr::read_u32(src)?,
                transaction: xdr::read_u32(src)?,
            },
            Operation::CreateBlob => Self::CreateBlob {
                transaction: xdr::read_u32(src)?,
                bpb: xdr::read_opaque(src)?,
            },
            Operation::OpenBlob => Self::OpenBlob {
                transaction: xdr::read_u32(src)?,
                blob_id: xdr::read_u64(src)?,
                bpb: xdr::read_opaque(src)?,
            },
            Operation::GetSegment => Self::GetSegment {
                blob: xdr::read_u32(src)?,
                max_length: xdr::read_u32(src)?,
            },
            Operation::PutSegment => Self::PutSegment {
                blob: xdr::read_u32(src)?,
                segment: xdr::read_opaque(src)?,
            },
            Operation::BatchSegments => Self::BatchSegments {
                blob: xdr::read_u32(src)?,
                data: xdr::read_opaque(src)?,
            },
            Operation::SeekBlob => Self::SeekBlob {
                blob: xdr::read_u32(src)?,
                mode: xdr::read_u32(src)?,
                offset: xdr::read_i64(src)?,
            },
            Operation::QueEvents => Self::QueEvents {
                database: xdr::read_u32(src)?,
                epb: xdr::read_opaque(src)?,
                local_id: xdr::read_u32(src)?,
            },
            Operation::CancelEvents => Self::CancelEvents {
                database: xdr::read_u32(src)?,
                event_id: xdr::read_u32(src)?,
            },
            Operation::Dummy => Self::Dummy,
            Operation::Disconnect => Self::Disconnect,
            other => {
                return Err(ProtocolError::UnexpectedOperation {
                    expected: "request",
                    actual: other.code(),
                });
            }
        };
        Ok(request)
    }
}

/// Negotiation accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptResponse {
    /// Accepted revision.
    pub revision: ProtocolRevision,
    /// Accepted architecture.
    pub architecture: u32,
    /// Accepted packet type, may carry the compression flag.
    pub packet_type: u32,
}

/// The generic response: handle, blob id, data and status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenericResponse {
    /// Object handle created or affected by the operation.
    pub handle: u32,
    /// Blob id, for blob creation.
    pub blob_id: u64,
    /// Operation-specific payload.
    pub data: Bytes,
    /// Diagnostics.
    pub status: StatusVector,
}

impl GenericResponse {
    /// A successful response with no payload.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// A successful response carrying `handle`.
    #[must_use]
    pub fn with_handle(handle: u32) -> Self {
        Self {
            handle,
            ..Self::default()
        }
    }

    /// A failed response.
    #[must_use]
    pub fn failed(status: StatusVector) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Fetch completion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// More rows may follow.
    More,
    /// The cursor is exhausted.
    Eof,
}

impl FetchStatus {
    fn to_u32(self) -> u32 {
        match self {
            Self::More => 0,
            Self::Eof => 100,
        }
    }
}

/// Rows returned by `op_fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Whether the cursor is exhausted.
    pub status: FetchStatus,
    /// Rows in cursor order.
    pub rows: Vec<RowData>,
}

/// A blob sent along with fetched rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineBlob {
    /// Transaction the blob belongs to.
    pub transaction: u32,
    /// Blob id.
    pub blob_id: u64,
    /// Whether the blob uses stream storage.
    pub stream: bool,
    /// Number of segments on the server.
    pub segment_count: u32,
    /// Full content.
    pub data: Bytes,
}

/// Completion state of a server batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchCompletion {
    /// Statement handle.
    pub statement: u32,
    /// Affected rows of every executed message, in order.
    pub counts: Vec<i64>,
    /// `(message index, status)` of failed messages.
    pub errors: Vec<(u32, StatusVector)>,
}

/// Event notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    /// Database handle.
    pub database: u32,
    /// Event parameter buffer with the current counts.
    pub epb: Bytes,
    /// Client-side registration id.
    pub local_id: u32,
}

/// A server message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Response {
    /// Negotiation accepted.
    Accept(AcceptResponse),
    /// Negotiation rejected.
    Reject,
    /// Generic response.
    Generic(GenericResponse),
    /// Singleton row, followed by a generic response.
    Sql(Option<RowData>),
    /// Fetched rows.
    Fetch(FetchResponse),
    /// Blob delivered ahead of a fetch response.
    InlineBlob(InlineBlob),
    /// Batch completion state.
    BatchCompletion(BatchCompletion),
    /// Event notification.
    Event(EventMessage),
    /// Keep-alive.
    Dummy,
    /// The server is closing the connection.
    Exit,
}

impl Response {
    /// Operation code of this response.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Accept(_) => Operation::Accept,
            Self::Reject => Operation::Reject,
            Self::Generic(_) => Operation::Response,
            Self::Sql(_) => Operation::SqlResponse,
            Self::Fetch(_) => Operation::FetchResponse,
            Self::InlineBlob(_) => Operation::InlineBlob,
            Self::BatchCompletion(_) => Operation::BatchCompletion,
            Self::Event(_) => Operation::Event,
            Self::Dummy => Operation::Dummy,
            Self::Exit => Operation::Exit,
        }
    }

    /// Encode into a new buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Encode the operation code and payload.
    pub fn encode(&self, dst: &mut impl BufMut) {
        xdr::write_u32(dst, self.operation().code());
        match self {
            Self::Accept(accept) => {
                xdr::write_u32(dst, accept.revision.wire_value());
                xdr::write_u32(dst, accept.architecture);
                xdr::write_u32(dst, accept.packet_type);
            }
            Self::Generic(response) => {
                xdr::write_u32(dst, response.handle);
                xdr::write_u64(dst, response.blob_id);
                xdr::write_opaque(dst, &response.data);
                response.status.encode(dst);
            }
            Self::Sql(row) => match row {
                Some(row) => {
                    xdr::write_u32(dst, 1);
                    row.encode(dst);
                }
                None => xdr::write_u32(dst, 0),
            },
            Self::Fetch(fetch) => {
                xdr::write_u32(dst, fetch.status.to_u32());
                xdr::write_u32(dst, fetch.rows.len() as u32);
                for row in &fetch.rows {
                    row.encode(dst);
                }
            }
            Self::InlineBlob(blob) => {
                xdr::write_u32(dst, blob.transaction);
                xdr::write_u64(dst, blob.blob_id);
                xdr::write_bool(dst, blob.stream);
                xdr::write_u32(dst, blob.segment_count);
                xdr::write_opaque(dst, &blob.data);
            }
            Self::BatchCompletion(completion) => {
                xdr::write_u32(dst, completion.statement);
                xdr::write_u32(dst, completion.counts.len() as u32);
                for count in &completion.counts {
                    xdr::write_i64(dst, *count);
                }
                xdr::write_u32(dst, completion.errors.len() as u32);
                for (index, status) in &completion.errors {
                    xdr::write_u32(dst, *index);
                    status.encode(dst);
                }
            }
            Self::Event(event) => {
                xdr::write_u32(dst, event.database);
                xdr::write_opaque(dst, &event.epb);
                xdr::write_u32(dst, event.local_id);
            }
            Self::Reject | Self::Dummy | Self::Exit => {}
        }
    }

    /// Decode a response, including its operation code.
    pub fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        let op = Operation::from_u32(xdr::read_u32(src)?)?;
        let response = match op {
            Operation::Accept => Self::Accept(AcceptResponse {
                revision: ProtocolRevision::from_wire(xdr::read_u32(src)?),
                architecture: xdr::read_u32(src)?,
                packet_type: xdr::read_u32(src)?,
            }),
            Operation::Reject => Self::Reject,
            Operation::Response => Self::Generic(GenericResponse {
                handle: xdr::read_u32(src)?,
                blob_id: xdr::read_u64(src)?,
                data: xdr::read_opaque(src)?,
                status: StatusVector::decode(src)?,
            }),
            Operation::SqlResponse => {
                if xdr::read_u32(src)? > 0 {
                    Self::Sql(Some(RowData::decode(src)?))
                } else {
                    Self::Sql(None)
                }
            }
            Operation::FetchResponse => {
                let status = match xdr::read_u32(src)? {
                    0 => FetchStatus::More,
                    100 => FetchStatus::Eof,
                    _ => return Err(ProtocolError::InvalidField("fetch status")),
                };
                let count = xdr::read_u32(src)? as usize;
                if count > src.remaining() / 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let rows = (0..count)
                    .map(|_| RowData::decode(src))
                    .collect::<Result<_, _>>()?;
                Self::Fetch(FetchResponse { status, rows })
            }
            Operation::InlineBlob => Self::InlineBlob(InlineBlob {
                transaction: xdr::read_u32(src)?,
                blob_id: xdr::read_u64(src)?,
                stream: xdr::read_bool(src)?,
                segment_count: xdr::read_u32(src)?,
                data: xdr::read_opaque(src)?,
            }),
            Operation::BatchCompletion => {
                let statement = xdr::read_u32(src)?;
                let count = xdr::read_u32(src)? as usize;
                if count > src.remaining() / 8 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let counts = (0..count)
                    .map(|_| xdr::read_i64(src))
                    .collect::<Result<_, _>>()?;
                let error_count = xdr::read_u32(src)? as usize;
                if error_count > src.remaining() / 8 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let mut errors = Vec::with_capacity(error_count);
                for _ in 0..error_count {
                    let index = xdr::read_u32(src)?;
                    errors.push((index, StatusVector::decode(src)?));
                }
                Self::BatchCompletion(BatchCompletion {
                    statement,
                    counts,
                    errors,
                })
            }
            Operation::Event => Self::Event(EventMessage {
                database: xdr::read_u32(src)?,
                epb: xdr::read_opaque(src)?,
                local_id: xdr::read_u32(src)?,
            }),
            Operation::Dummy => Self::Dummy,
            Operation::Exit | Operation::Disconnect => Self::Exit,
            other => {
                return Err(ProtocolError::UnexpectedOperation {
                    expected: "response",
                    actual: other.code(),
                });
            }
        };
        Ok(response)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codes;
    use crate::status::StatusEntry;

    fn request_roundtrip(request: Request) {
        let mut bytes = request.to_bytes();
        assert_eq!(Request::decode(&mut bytes).unwrap(), request);
        assert!(bytes.is_empty());
    }

    fn response_roundtrip(response: Response) {
        let mut bytes = response.to_bytes();
        assert_eq!(Response::decode(&mut bytes).unwrap(), response);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_connect_message() {
        request_roundtrip(Request::Connect {
            database: "employee".into(),
            user: "app".into(),
            offers: crate::version::default_offers(),
        });
    }

    #[test]
    fn test_execute_with_parameters() {
        request_roundtrip(Request::Execute(ExecuteRequest {
            statement: 3,
            transaction: 7,
            parameters: Some(RowData::new(vec![
                Some(Bytes::from_static(&[0, 0, 0, 1])),
                None,
            ])),
            timeout_ms: 250,
            max_inline_blob_size: 65_535,
        }));
        request_roundtrip(Request::Execute2(ExecuteRequest::default()));
    }

    #[test]
    fn test_info_requests_keep_their_kind() {
        request_roundtrip(Request::InfoBlob {
            blob: 4,
            items: Bytes::from_static(&[6, 7]),
            buffer_length: 64,
        });
        request_roundtrip(Request::InfoSql {
            statement: 4,
            items: Bytes::from_static(&[22]),
            buffer_length: 1024,
        });
    }

    #[test]
    fn test_generic_response_with_error() {
        let status = StatusVector::from_entry(
            StatusEntry::error(codes::NO_DUP).with_string("PK_ORDERS"),
        );
        response_roundtrip(Response::Generic(GenericResponse {
            handle: 1,
            blob_id: 0x0000_0001_0000_0002,
            data: Bytes::from_static(b"xyz"),
            status,
        }));
    }

    #[test]
    fn test_batch_completion() {
        response_roundtrip(Response::BatchCompletion(BatchCompletion {
            statement: 2,
            counts: vec![1, 1],
            errors: vec![(2, StatusVector::error(codes::NO_DUP))],
        }));
    }

    #[test]
    fn test_cancel_is_fire_and_forget() {
        assert!(!Request::Cancel { kind: 3 }.expects_response());
        assert!(Request::Dummy.expects_response());
    }

    #[test]
    fn test_response_rejects_request_op() {
        let mut bytes = Request::Dummy.to_bytes();
        assert!(Response::decode(&mut bytes).is_ok());
        let mut bytes = Request::Fetch {
            statement: 1,
            count: 10,
        }
        .to_bytes();
        assert!(matches!(
            Response::decode(&mut bytes),
            Err(ProtocolError::UnexpectedOperation { .. })
        ));
    }
}
