//! Database attachments.
//!
//! An [`Attachment`] owns one wire connection. Every request/response round
//! trip holds the attachment's serialization lock, so statements, blobs and
//! transactions sharing an attachment are queued rather than interleaved on
//! the wire. Cancellation goes through a separate handle and does not need
//! the lock.
//!
//! ```text
//! Unattached --attach()/create_database()--> Attached
//! Attached --detach()/drop_database()/abort--> Detached (terminal)
//! ```

use std::sync::Arc;

use bytes::Bytes;
use fb_codec::{CancelHandle, CodecError, Connection};
use fb_protocol::info::{self, INFO_DB_PAGE_SIZE, INFO_DB_SERVER_VERSION, INFO_END};
use fb_protocol::pb::{self, dpb};
use fb_protocol::version::PTYPE_COMPRESS_FLAG;
use fb_protocol::{
    CancelKind, Capabilities, GenericResponse, NegotiatedProtocol, ParameterBuffer, ProtocolError,
    ProtocolOffer, Request, Response, StatusVector, codes,
};
use fb_types::{ByteOrder, DatatypeCoder};
use tokio::net::TcpStream;
use tokio::sync::MutexGuard;

use crate::blob::{Blob, BlobConfig, BlobId};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::EventChannel;
use crate::statement::Statement;
use crate::transaction::{Transaction, TransactionConfig, TransactionState};

/// Size of the response buffer for database info requests.
const DEFAULT_INFO_SIZE: u32 = 1024;

/// Lifecycle of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentState {
    /// Not yet attached.
    #[default]
    Unattached,
    /// Attached and usable.
    Attached,
    /// Detached, dropped, aborted or lost; terminal.
    Detached,
}

#[derive(Debug, Default)]
struct SessionState {
    lifecycle: AttachmentState,
    handle: u32,
    protocol: Option<NegotiatedProtocol>,
    server_version: Option<String>,
    open_transactions: usize,
    warnings: Vec<StatusVector>,
}

struct AttachmentInner {
    config: Config,
    coder: DatatypeCoder,
    /// The serialization lock.
    channel: tokio::sync::Mutex<Option<Connection<TcpStream>>>,
    cancel: parking_lot::Mutex<Option<CancelHandle<TcpStream>>>,
    state: parking_lot::Mutex<SessionState>,
    events: parking_lot::Mutex<Option<EventChannel>>,
}

/// A session with a database.
///
/// Cloning is cheap; clones share the session. Transactions, statements,
/// blobs and event handles keep a clone and fail with a state error once the
/// attachment is detached.
///
/// # Example
///
/// ```rust,ignore
/// use fb_client::{Attachment, Config};
///
/// let config = Config::new()
///     .host("localhost")
///     .database("employee")
///     .credentials("SYSDBA", "masterkey");
///
/// let db = Attachment::new(config)?;
/// db.attach().await?;
///
/// let tx = db.start_default_transaction().await?;
/// let mut stmt = db.prepare(&tx, "SELECT 1 FROM RDB$DATABASE").await?;
/// stmt.execute(&[]).await?;
/// let rows = stmt.fetch_next().await?;
///
/// stmt.close().await?;
/// tx.commit().await?;
/// db.detach().await?;
/// ```
#[derive(Clone)]
pub struct Attachment {
    inner: Arc<AttachmentInner>,
}

impl Attachment {
    /// Create an unattached attachment.
    ///
    /// The configuration is validated and the datatype coder for its
    /// character set is built; no connection is made yet.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let coder = DatatypeCoder::for_charset(ByteOrder::BigEndian, &config.charset)?;
        Ok(Self {
            inner: Arc::new(AttachmentInner {
                config,
                coder,
                channel: tokio::sync::Mutex::new(None),
                cancel: parking_lot::Mutex::new(None),
                state: parking_lot::Mutex::new(SessionState::default()),
                events: parking_lot::Mutex::new(None),
            }),
        })
    }

    /// Connect and attach to the configured database.
    pub async fn attach(&self) -> Result<()> {
        self.open(false).await
    }

    /// Connect, create the configured database and attach to it.
    pub async fn create_database(&self) -> Result<()> {
        self.open(true).await
    }

    async fn open(&self, create: bool) -> Result<()> {
        let mut slot = self.inner.channel.lock().await;
        match self.state() {
            AttachmentState::Unattached => {}
            AttachmentState::Attached => {
                return Err(Error::InvalidState {
                    code: codes::BAD_DB_HANDLE,
                    message: "already attached".into(),
                });
            }
            AttachmentState::Detached => return Err(detached_error()),
        }

        let config = &self.inner.config;
        let (mut conn, protocol) = connect(config, &config.database).await?;

        let dpb = database_parameters(config)?;
        let request = if create {
            Request::Create {
                database: config.database.clone(),
                dpb,
            }
        } else {
            Request::Attach {
                database: config.database.clone(),
                dpb,
            }
        };
        let response = match expect_generic(conn.call(&request).await?) {
            Ok(response) if !response.status.is_error() => response,
            Ok(response) => {
                conn.close().await;
                return Err(Error::from_status(response.status));
            }
            Err(e) => {
                conn.close().await;
                return Err(e);
            }
        };
        let handle = response.handle;

        let server_version = match expect_generic(
            conn.call(&Request::InfoDatabase {
                database: handle,
                items: Bytes::from_static(&[INFO_DB_SERVER_VERSION, INFO_END]),
                buffer_length: DEFAULT_INFO_SIZE,
            })
            .await?,
        ) {
            Ok(info_response) if !info_response.status.is_error() => {
                let items = info::parse_info(&info_response.data)?;
                info::find_item(&items, INFO_DB_SERVER_VERSION).map(|item| item.as_string())
            }
            _ => None,
        };

        tracing::info!(
            database = %config.database,
            handle = handle,
            revision = %protocol.revision,
            server_version = server_version.as_deref().unwrap_or("unknown"),
            created = create,
            "attached"
        );

        *self.inner.cancel.lock() = Some(conn.cancel_handle());
        {
            let mut state = self.inner.state.lock();
            state.lifecycle = AttachmentState::Attached;
            state.handle = handle;
            state.protocol = Some(protocol);
            state.server_version = server_version;
            if response.status.has_warnings() {
                state.warnings.push(response.status.warnings_only());
            }
        }
        *slot = Some(conn);
        Ok(())
    }

    /// Detach from the database.
    ///
    /// Fails with `isc_open_trans` while transactions are still active.
    pub async fn detach(&self) -> Result<()> {
        let mut exchange = self.lock().await?;
        let open = self.inner.state.lock().open_transactions;
        if open > 0 {
            return Err(Error::state_with(codes::OPEN_TRANS, &[open.to_string()]));
        }
        self.close_event_channel();

        let handle = self.handle();
        let result = exchange.call(&Request::Detach { database: handle }).await;
        exchange.shutdown().await;
        tracing::info!(handle = handle, "detached");
        result.map(|_| ())
    }

    /// Drop the attached database and end the session.
    pub async fn drop_database(&self) -> Result<()> {
        let mut exchange = self.lock().await?;
        self.close_event_channel();

        let handle = self.handle();
        exchange.call(&Request::DropDatabase { database: handle }).await?;
        exchange.shutdown().await;
        tracing::info!(handle = handle, "database dropped");
        Ok(())
    }

    /// Send a cancel request for the operation currently holding the lock.
    ///
    /// `Raise`, `Enable` and `Disable` need protocol support for
    /// cancellation. `Abort` closes the socket and the attachment is
    /// detached afterwards.
    pub async fn cancel_operation(&self, kind: CancelKind) -> Result<()> {
        self.ensure_attached()?;
        if kind != CancelKind::Abort && !self.supports(Capabilities::CANCEL_OPERATION) {
            return Err(Error::Unsupported("operation cancellation"));
        }
        let handle = self
            .inner
            .cancel
            .lock()
            .clone()
            .ok_or(Error::ConnectionClosed)?;

        let result = handle.cancel(kind).await;
        if kind == CancelKind::Abort {
            self.close_event_channel();
            self.inner.state.lock().lifecycle = AttachmentState::Detached;
            tracing::warn!(handle = self.handle(), "attachment aborted");
        }
        result.map_err(Error::from)
    }

    /// Round trip a keep-alive message.
    pub async fn ping(&self) -> Result<()> {
        let mut exchange = self.lock().await?;
        exchange.call(&Request::Dummy).await?;
        Ok(())
    }

    /// Query database information; returns the raw info clumplets.
    pub async fn database_info(&self, items: &[u8], max_length: u32) -> Result<Bytes> {
        let mut exchange = self.lock().await?;
        let response = exchange
            .call(&Request::InfoDatabase {
                database: self.handle(),
                items: Bytes::copy_from_slice(items),
                buffer_length: max_length,
            })
            .await?;
        Ok(response.data)
    }

    /// Database page size in bytes.
    pub async fn page_size(&self) -> Result<u32> {
        let data = self
            .database_info(&[INFO_DB_PAGE_SIZE, INFO_END], DEFAULT_INFO_SIZE)
            .await?;
        let items = info::parse_info(&data)?;
        let item = info::find_item(&items, INFO_DB_PAGE_SIZE)
            .ok_or(ProtocolError::InvalidField("page size"))?;
        Ok(item.as_integer() as u32)
    }

    /// Execute a statement without preparing it.
    ///
    /// Without a transaction the statement runs outside any transaction,
    /// which only some statements (such as `CREATE DATABASE`) allow.
    pub async fn execute_immediate(&self, transaction: Option<&Transaction>, sql: &str) -> Result<()> {
        let transaction_handle = match transaction {
            Some(tx) => {
                tx.ensure_active()?;
                tx.handle()
            }
            None => 0,
        };
        let mut exchange = self.lock().await?;
        exchange
            .call(&Request::ExecImmediate {
                transaction: transaction_handle,
                database: self.handle(),
                dialect: self.inner.config.dialect,
                sql: sql.to_string(),
            })
            .await?;
        tracing::debug!(sql = sql, "executed immediate");
        Ok(())
    }

    /// Start a transaction.
    pub async fn start_transaction(&self, config: &TransactionConfig) -> Result<Transaction> {
        let tpb = config.to_tpb()?;
        let mut exchange = self.lock().await?;
        let response = exchange
            .call(&Request::Transaction {
                database: self.handle(),
                tpb,
            })
            .await?;
        drop(exchange);

        self.inner.state.lock().open_transactions += 1;
        tracing::debug!(transaction = response.handle, "transaction started");
        Ok(Transaction::new(
            self.clone(),
            response.handle,
            TransactionState::Active,
        ))
    }

    /// Start a transaction with the configured default parameters.
    pub async fn start_default_transaction(&self) -> Result<Transaction> {
        let config = self.inner.config.transaction;
        self.start_transaction(&config).await
    }

    /// Reconnect to a prepared (limbo) transaction by id.
    pub async fn reconnect_transaction(&self, transaction_id: u32) -> Result<Transaction> {
        let mut exchange = self.lock().await?;
        let response = exchange
            .call(&Request::Reconnect {
                database: self.handle(),
                transaction_id,
            })
            .await?;
        drop(exchange);

        self.inner.state.lock().open_transactions += 1;
        tracing::info!(
            transaction_id = transaction_id,
            transaction = response.handle,
            "reconnected to prepared transaction"
        );
        Ok(Transaction::new(
            self.clone(),
            response.handle,
            TransactionState::Prepared,
        ))
    }

    /// Allocate an unprepared statement.
    pub async fn create_statement(&self) -> Result<Statement> {
        let mut exchange = self.lock().await?;
        let response = exchange
            .call(&Request::AllocateStatement {
                database: self.handle(),
            })
            .await?;
        drop(exchange);
        tracing::debug!(statement = response.handle, "statement allocated");
        Ok(Statement::new(self.clone(), response.handle))
    }

    /// Allocate a statement and prepare `sql`.
    pub async fn prepare(&self, transaction: &Transaction, sql: &str) -> Result<Statement> {
        let mut statement = self.create_statement().await?;
        statement.prepare(transaction, sql).await?;
        Ok(statement)
    }

    /// Create an output blob; it is created on the server by [`Blob::open`].
    pub fn create_blob_for_output(&self, transaction: &Transaction, config: BlobConfig) -> Blob {
        Blob::output(self.clone(), transaction.clone(), config)
    }

    /// Create an input blob for `id`.
    ///
    /// When the blob arrived inline with a fetched row its content is served
    /// locally, without further round trips.
    pub fn create_blob_for_input(&self, transaction: &Transaction, id: BlobId) -> Blob {
        match transaction.inline_blob(id) {
            Some(inline) => Blob::inline(self.clone(), transaction.clone(), inline),
            None => Blob::input(self.clone(), transaction.clone(), id),
        }
    }

    /// Write `data` to a new blob and return its id.
    pub async fn write_blob(
        &self,
        transaction: &Transaction,
        data: &[u8],
        config: BlobConfig,
    ) -> Result<BlobId> {
        let mut blob = self.create_blob_for_output(transaction, config);
        blob.open().await?;
        for chunk in data.chunks(self.inner.config.blob_buffer_size) {
            if let Err(e) = blob.put_segment(chunk).await {
                if let Err(cancel_err) = blob.cancel().await {
                    tracing::debug!(error = %cancel_err, "blob cancel after failed write");
                }
                return Err(e);
            }
        }
        blob.close().await?;
        blob.id().ok_or(Error::state(codes::BAD_SEGSTR_ID))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AttachmentState {
        self.inner.state.lock().lifecycle
    }

    /// Whether the attachment is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state() == AttachmentState::Attached
    }

    /// Server-assigned handle, 0 until attached.
    #[must_use]
    pub fn handle(&self) -> u32 {
        self.inner.state.lock().handle
    }

    /// Server version string reported at attach.
    #[must_use]
    pub fn server_version(&self) -> Option<String> {
        self.inner.state.lock().server_version.clone()
    }

    /// Negotiated protocol, once attached.
    #[must_use]
    pub fn protocol(&self) -> Option<NegotiatedProtocol> {
        self.inner.state.lock().protocol
    }

    /// Whether the negotiated protocol has `capability`.
    #[must_use]
    pub fn supports(&self, capability: Capabilities) -> bool {
        self.protocol()
            .is_some_and(|protocol| protocol.supports(capability))
    }

    /// Datatype coder for parameter and row values of this attachment.
    #[must_use]
    pub fn coder(&self) -> &DatatypeCoder {
        &self.inner.coder
    }

    /// Configuration the attachment was created with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Number of active or prepared transactions.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.inner.state.lock().open_transactions
    }

    /// Take the warnings collected since the last call.
    pub fn take_warnings(&self) -> Vec<StatusVector> {
        std::mem::take(&mut self.inner.state.lock().warnings)
    }

    pub(crate) fn transaction_ended(&self) {
        let mut state = self.inner.state.lock();
        state.open_transactions = state.open_transactions.saturating_sub(1);
    }

    pub(crate) fn cancel_handle(&self) -> Option<CancelHandle<TcpStream>> {
        self.inner.cancel.lock().clone()
    }

    pub(crate) fn event_channel(&self) -> parking_lot::MutexGuard<'_, Option<EventChannel>> {
        self.inner.events.lock()
    }

    fn close_event_channel(&self) {
        if let Some(channel) = self.inner.events.lock().take() {
            channel.close();
        }
    }

    pub(crate) fn ensure_attached(&self) -> Result<()> {
        match self.state() {
            AttachmentState::Attached => Ok(()),
            AttachmentState::Unattached => Err(Error::InvalidState {
                code: codes::BAD_DB_HANDLE,
                message: "not attached".into(),
            }),
            AttachmentState::Detached => Err(detached_error()),
        }
    }

    /// Acquire the serialization lock for a round trip.
    pub(crate) async fn lock(&self) -> Result<Exchange<'_>> {
        self.ensure_attached()?;
        let slot = self.inner.channel.lock().await;
        // The attachment may have been detached while waiting.
        self.ensure_attached()?;
        Ok(Exchange {
            attachment: self,
            slot,
        })
    }

    fn mark_lost(&self) {
        let mut state = self.inner.state.lock();
        if state.lifecycle == AttachmentState::Attached {
            tracing::warn!(handle = state.handle, "connection lost");
            state.lifecycle = AttachmentState::Detached;
        }
    }

    fn check_status(&self, response: GenericResponse) -> Result<GenericResponse> {
        if response.status.is_error() {
            return Err(Error::from_status(response.status));
        }
        if response.status.has_warnings() {
            tracing::warn!(warning = %response.status, "server warning");
            self.inner
                .state
                .lock()
                .warnings
                .push(response.status.warnings_only());
        }
        Ok(response)
    }

    fn log_deferred(&self, responses: Vec<Response>) {
        for response in responses {
            if let Response::Generic(generic) = response
                && generic.status.is_error()
            {
                tracing::warn!(status = %generic.status, "deferred request failed");
            }
        }
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Attachment")
            .field("database", &self.inner.config.database)
            .field("state", &state.lifecycle)
            .field("handle", &state.handle)
            .field("protocol", &state.protocol.map(|p| p.revision))
            .finish_non_exhaustive()
    }
}

/// A held serialization lock.
pub(crate) struct Exchange<'a> {
    attachment: &'a Attachment,
    slot: MutexGuard<'a, Option<Connection<TcpStream>>>,
}

impl Exchange<'_> {
    fn connection(&mut self) -> Result<&mut Connection<TcpStream>> {
        self.slot.as_mut().ok_or(Error::ConnectionClosed)
    }

    /// Send a request and flush it together with any deferred ones.
    pub(crate) async fn send(&mut self, request: &Request) -> Result<()> {
        tracing::debug!(op = ?request.operation(), "request");
        let result = self.connection()?.send(request).await;
        self.check_transport(result)
    }

    /// Send a request whose response is read lazily.
    pub(crate) async fn send_deferred(&mut self, request: &Request) -> Result<()> {
        tracing::debug!(op = ?request.operation(), "deferred request");
        let result = self.connection()?.send_deferred(request).await;
        self.check_transport(result)
    }

    /// Read the next response. Cancel safe.
    pub(crate) async fn read(&mut self) -> Result<Response> {
        let conn = self.connection()?;
        let result = conn.read_response().await;
        let deferred = conn.take_deferred_responses();
        self.attachment.log_deferred(deferred);
        match self.check_transport(result)? {
            Response::Exit => {
                self.attachment.mark_lost();
                Err(Error::ConnectionClosed)
            }
            response => Ok(response),
        }
    }

    /// Read a generic response and check its status.
    pub(crate) async fn read_generic(&mut self) -> Result<GenericResponse> {
        let response = expect_generic(self.read().await?)?;
        self.attachment.check_status(response)
    }

    /// Send a request and read its generic response.
    pub(crate) async fn call(&mut self, request: &Request) -> Result<GenericResponse> {
        self.send(request).await?;
        self.read_generic().await
    }

    /// Check a generic response read through [`Exchange::read`].
    pub(crate) fn check(&self, response: GenericResponse) -> Result<GenericResponse> {
        self.attachment.check_status(response)
    }

    async fn shutdown(&mut self) {
        if let Some(mut conn) = self.slot.take() {
            conn.close().await;
        }
        self.attachment.inner.cancel.lock().take();
        self.attachment.inner.state.lock().lifecycle = AttachmentState::Detached;
    }

    fn check_transport<T>(&self, result: std::result::Result<T, CodecError>) -> Result<T> {
        result.map_err(|e| {
            if e.is_fatal() {
                self.attachment.mark_lost();
            }
            Error::from(e)
        })
    }
}

/// Open a TCP connection and negotiate the protocol revision.
///
/// The highest revision both sides support wins. A rejection, an accept
/// naming a revision that was not offered, or one switching on compression
/// the client did not ask for, fails before any session exists.
pub(crate) async fn connect(
    config: &Config,
    target: &str,
) -> Result<(Connection<TcpStream>, NegotiatedProtocol)> {
    let addr = config.address();
    tracing::debug!("establishing TCP connection to {}", addr);
    let stream = tokio::time::timeout(config.timeouts.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::ConnectTimeout)??;
    stream.set_nodelay(true)?;

    let mut conn = Connection::new(stream);
    conn.set_read_timeout(config.timeouts.read_timeout);

    let offers: Vec<ProtocolOffer> = config
        .protocol_revisions
        .iter()
        .map(|&revision| {
            let compress = config.wire_compression
                && revision
                    .capabilities()
                    .contains(Capabilities::WIRE_COMPRESSION);
            ProtocolOffer::new(revision).with_compression(compress)
        })
        .collect();
    let request = Request::Connect {
        database: target.to_string(),
        user: config.user.clone(),
        offers: offers.clone(),
    };

    let failure = match conn.call(&request).await? {
        Response::Accept(accept) => {
            let compressed = accept.packet_type & PTYPE_COMPRESS_FLAG != 0;
            match offers.iter().find(|offer| offer.revision == accept.revision) {
                None => {
                    format!("server accepted revision {} which was not offered", accept.revision)
                }
                Some(offer) if compressed && !offer.wants_compression() => format!(
                    "server enabled compression for revision {} without a request",
                    accept.revision
                ),
                Some(_) => {
                    if compressed {
                        conn.enable_compression().await;
                    }
                    let protocol =
                        NegotiatedProtocol::new(accept.revision, accept.architecture, compressed);
                    tracing::info!(
                        revision = %protocol.revision,
                        compressed,
                        capabilities = ?protocol.capabilities,
                        "protocol negotiated"
                    );
                    return Ok((conn, protocol));
                }
            }
        }
        Response::Reject => "server rejected every offered protocol revision".to_string(),
        other => format!("unexpected {:?} during negotiation", other.operation()),
    };
    conn.close().await;
    Err(Error::Negotiation(failure))
}

fn database_parameters(config: &Config) -> Result<Bytes> {
    let mut buffer = ParameterBuffer::new(pb::DPB_VERSION)
        .string(dpb::USER_NAME, &config.user)
        .string(dpb::PASSWORD, &config.password)
        .string(dpb::LC_CTYPE, &config.charset)
        .int(dpb::SQL_DIALECT, config.dialect as i32);
    if let Some(role) = &config.role {
        buffer = buffer.string(dpb::SQL_ROLE_NAME, role);
    }
    if let Some(name) = &config.process_name {
        buffer = buffer.string(dpb::PROCESS_NAME, name);
    }
    Ok(buffer.to_bytes()?)
}

pub(crate) fn expect_generic(response: Response) -> Result<GenericResponse> {
    match response {
        Response::Generic(generic) => Ok(generic),
        Response::Exit => Err(Error::ConnectionClosed),
        other => Err(unexpected("op_response", &other)),
    }
}

pub(crate) fn unexpected(expected: &'static str, response: &Response) -> Error {
    Error::Protocol(ProtocolError::UnexpectedOperation {
        expected,
        actual: response.operation().code(),
    })
}

fn detached_error() -> Error {
    Error::InvalidState {
        code: codes::BAD_DB_HANDLE,
        message: "attachment is detached".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_database_parameters() {
        let config = Config::new()
            .database("employee")
            .credentials("SYSDBA", "masterkey")
            .role("ADMIN");
        let raw = database_parameters(&config).unwrap();
        let parsed = ParameterBuffer::parse(&raw).unwrap();
        assert_eq!(parsed.version(), pb::DPB_VERSION);
        assert_eq!(parsed.get(dpb::USER_NAME).unwrap().as_string(), "SYSDBA");
        assert_eq!(parsed.get(dpb::LC_CTYPE).unwrap().as_string(), "UTF8");
        assert_eq!(parsed.get(dpb::SQL_DIALECT).unwrap().as_int(), 3);
        assert_eq!(parsed.get(dpb::SQL_ROLE_NAME).unwrap().as_string(), "ADMIN");
        assert!(!parsed.has(dpb::PROCESS_NAME));
    }

    #[test]
    fn test_new_is_unattached() {
        let db = Attachment::new(Config::new().database("employee")).unwrap();
        assert_eq!(db.state(), AttachmentState::Unattached);
        assert_eq!(db.handle(), 0);
        assert!(db.protocol().is_none());
        assert!(!db.supports(Capabilities::DEFERRED_PACKETS));
        assert!(db.ensure_attached().unwrap_err().is_state());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(matches!(
            Attachment::new(Config::new()),
            Err(Error::Config(_))
        ));
        assert!(Attachment::new(Config::new().database("x").charset("NO_SUCH_CHARSET")).is_err());
    }

    #[test]
    fn test_expect_generic() {
        assert!(expect_generic(Response::Generic(GenericResponse::ok())).is_ok());
        assert!(matches!(
            expect_generic(Response::Exit),
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(
            expect_generic(Response::Reject),
            Err(Error::Protocol(_))
        ));
    }
}
