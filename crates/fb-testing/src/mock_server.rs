//! Mock wire protocol server for testing.
//!
//! This module provides a mock server that speaks the server side of the
//! wire protocol. It answers revision negotiation, attachments,
//! transactions, prepared statements with canned results, blobs, server
//! batches and event notifications, and honours cancel requests while a
//! response is delayed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fb_testing::fixtures;
//! use fb_testing::mock_server::{MockServer, MockStatement};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockServer::builder()
//!         .with_statement(
//!             "SELECT ID FROM ITEMS",
//!             MockStatement::select(
//!                 vec![fixtures::int_column("ID")],
//!                 vec![fixtures::row([fixtures::int(1)])],
//!             ),
//!         )
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     // Connect your client to server.host() and server.port()...
//! }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use fb_codec::{CodecError, FrameStream};
use fb_protocol::info::{
    INFO_BLOB_MAX_SEGMENT, INFO_BLOB_NUM_SEGMENTS, INFO_BLOB_TOTAL_LENGTH, INFO_BLOB_TYPE,
    INFO_DB_PAGE_SIZE, INFO_DB_SERVER_VERSION, INFO_DB_SQL_DIALECT, INFO_SQL_GET_PLAN,
    INFO_SQL_STMT_TYPE, INFO_SVC_LINE, INFO_SVC_SERVER_VERSION, INFO_TRA_ID,
};
use fb_protocol::message::{FREE_CLOSE, FREE_DROP, FREE_UNPREPARE};
use fb_protocol::pb::{bpb, dpb};
use fb_protocol::segment::{
    self, MAX_SEGMENT_SIZE, SEEK_FROM_END, SEEK_RELATIVE, SEGMENT_COMPLETE, SEGMENT_EOF,
    SEGMENT_PARTIAL,
};
use fb_protocol::version::{self, PTYPE_COMPRESS_FLAG, PTYPE_LAZY_SEND};
use fb_protocol::{
    AcceptResponse, BatchCompletion, CancelKind, EventBuffer, EventMessage, ExecuteRequest,
    FetchResponse, FetchStatus, FieldDescriptor, GenericResponse, InfoBuilder, InlineBlob,
    Operation, ParameterBuffer, ProtocolError, ProtocolRevision, Request, Response, RowData,
    StatementDescription, StatementType, StatusEntry, StatusVector, codes,
};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast, mpsc};

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<ProtocolError> for MockServerError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Canned behaviour of one statement text.
#[derive(Clone)]
pub struct MockStatement {
    statement_type: StatementType,
    parameters: Vec<FieldDescriptor>,
    fields: Vec<FieldDescriptor>,
    rows: Vec<RowData>,
    affected: i64,
    prepare_error: Option<StatusVector>,
    execute_error: Option<StatusVector>,
    failing_value: Option<(Bytes, StatusVector)>,
    fetch_delay: Option<Duration>,
    plan: String,
}

impl fmt::Debug for MockStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockStatement")
            .field("statement_type", &self.statement_type)
            .field("parameters", &self.parameters.len())
            .field("fields", &self.fields.len())
            .field("rows", &self.rows.len())
            .field("affected", &self.affected)
            .finish_non_exhaustive()
    }
}

impl MockStatement {
    fn new(statement_type: StatementType) -> Self {
        Self {
            statement_type,
            parameters: Vec::new(),
            fields: Vec::new(),
            rows: Vec::new(),
            affected: 0,
            prepare_error: None,
            execute_error: None,
            failing_value: None,
            fetch_delay: None,
            plan: "PLAN NATURAL".to_string(),
        }
    }

    /// A query returning `rows` through a cursor.
    pub fn select(fields: Vec<FieldDescriptor>, rows: Vec<RowData>) -> Self {
        Self {
            fields,
            rows,
            ..Self::new(StatementType::Select)
        }
    }

    /// An `UPDATE` affecting `affected` rows per execution.
    pub fn dml(affected: i64) -> Self {
        Self {
            affected,
            ..Self::new(StatementType::Update)
        }
    }

    /// An `INSERT` affecting `affected` rows per execution.
    pub fn insert(affected: i64) -> Self {
        Self {
            affected,
            ..Self::new(StatementType::Insert)
        }
    }

    /// Data definition.
    pub fn ddl() -> Self {
        Self::new(StatementType::Ddl)
    }

    /// A procedure call answering with at most one row.
    pub fn procedure(fields: Vec<FieldDescriptor>, row: Option<RowData>) -> Self {
        Self {
            fields,
            rows: row.into_iter().collect(),
            ..Self::new(StatementType::ExecProcedure)
        }
    }

    /// Set the input parameter descriptors.
    pub fn with_parameters(mut self, parameters: Vec<FieldDescriptor>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Fail every prepare with `status`.
    pub fn with_prepare_error(mut self, status: StatusVector) -> Self {
        self.prepare_error = Some(status);
        self
    }

    /// Fail every execution with `status`.
    pub fn with_execute_error(mut self, status: StatusVector) -> Self {
        self.execute_error = Some(status);
        self
    }

    /// Fail executions whose parameters contain `value`.
    pub fn failing_on(mut self, value: impl Into<Bytes>, status: StatusVector) -> Self {
        self.failing_value = Some((value.into(), status));
        self
    }

    /// Hold every fetch response back for `delay`.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Set the reported execution plan.
    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = plan.into();
        self
    }

    fn description(&self) -> StatementDescription {
        StatementDescription {
            statement_type: self.statement_type,
            parameters: self.parameters.clone(),
            fields: self.fields.clone(),
        }
    }

    fn failure_for(&self, parameters: &RowData) -> Option<StatusVector> {
        if let Some(status) = &self.execute_error {
            return Some(status.clone());
        }
        let (value, status) = self.failing_value.as_ref()?;
        parameters
            .fields
            .iter()
            .any(|field| field.as_ref() == Some(value))
            .then(|| status.clone())
    }
}

/// Blob content held by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MockBlob {
    segments: Vec<Bytes>,
    stream: bool,
}

impl MockBlob {
    /// A stream blob.
    pub fn stream(data: impl Into<Bytes>) -> Self {
        Self {
            segments: vec![data.into()],
            stream: true,
        }
    }

    /// A segmented blob with the given segments.
    pub fn segmented(segments: Vec<Bytes>) -> Self {
        Self {
            segments,
            stream: false,
        }
    }

    /// Whether the blob uses stream storage.
    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// Stored segments.
    #[must_use]
    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    /// Full content.
    #[must_use]
    pub fn data(&self) -> Bytes {
        match self.segments.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            segments => {
                let mut buf = BytesMut::with_capacity(self.len());
                for piece in segments {
                    buf.extend_from_slice(piece);
                }
                buf.freeze()
            }
        }
    }

    /// Total length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.iter().map(Bytes::len).sum()
    }

    /// Whether the blob is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn max_segment(&self) -> usize {
        self.segments.iter().map(Bytes::len).max().unwrap_or(0)
    }

    fn info(&self, items: &[u8]) -> Bytes {
        let mut builder = InfoBuilder::new();
        for &item in items {
            builder = match item {
                INFO_BLOB_TOTAL_LENGTH => builder.long(item, self.len() as i64),
                INFO_BLOB_TYPE => builder.int(item, i32::from(self.stream)),
                INFO_BLOB_NUM_SEGMENTS => builder.int(item, self.segments.len() as i32),
                INFO_BLOB_MAX_SEGMENT => builder.int(item, self.max_segment() as i32),
                _ => builder,
            };
        }
        builder.finish()
    }
}

/// Configuration for the mock server.
pub struct MockServerConfig {
    /// Revisions the server accepts.
    revisions: Vec<ProtocolRevision>,
    /// Canned statements keyed by SQL text.
    statements: HashMap<String, MockStatement>,
    /// Blobs present at start.
    blobs: HashMap<u64, MockBlob>,
    /// Version string reported by info requests.
    server_version: String,
    /// Reported page size.
    page_size: u32,
    /// Output lines of a started service action.
    service_output: Vec<String>,
    /// Answer to compression requests.
    compression: CompressionPolicy,
}

/// How the server answers the compression flag of the accepted offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionPolicy {
    /// Never compress.
    #[default]
    Refuse,
    /// Compress when the client asks for it.
    Honour,
    /// Set the compression flag whether or not the client asked.
    Force,
}

/// Builder for [`MockServer`].
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig {
                revisions: ProtocolRevision::SUPPORTED.to_vec(),
                statements: HashMap::new(),
                blobs: HashMap::new(),
                server_version: "WI-V5.0.1.1469 MockServer".to_string(),
                page_size: 8192,
                service_output: Vec::new(),
                compression: CompressionPolicy::default(),
            },
        }
    }

    /// Accept only these protocol revisions.
    pub fn with_revisions(mut self, revisions: impl Into<Vec<ProtocolRevision>>) -> Self {
        self.config.revisions = revisions.into();
        self
    }

    /// Add canned behaviour for a statement text.
    pub fn with_statement(mut self, sql: impl Into<String>, statement: MockStatement) -> Self {
        self.config.statements.insert(sql.into(), statement);
        self
    }

    /// Store a blob under `id`.
    pub fn with_blob(mut self, id: u64, blob: MockBlob) -> Self {
        self.config.blobs.insert(id, blob);
        self
    }

    /// Set the reported server version.
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.config.server_version = version.into();
        self
    }

    /// Set the reported page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// Set the lines a started service action reports.
    pub fn with_service_output<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.service_output = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Choose how compression requests are answered.
    pub fn with_compression(mut self, policy: CompressionPolicy) -> Self {
        self.config.compression = policy;
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockServer> {
        MockServer::start(self.config).await
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Registration {
    session: u64,
    event_id: u32,
    database: u32,
    local_id: u32,
    names: Vec<String>,
    notify: mpsc::UnboundedSender<Bytes>,
}

#[derive(Default)]
struct EventTable {
    counts: HashMap<String, u32>,
    registrations: Vec<Registration>,
}

impl EventTable {
    fn current(&self, names: &[String]) -> EventBuffer {
        EventBuffer {
            events: names
                .iter()
                .map(|name| (name.clone(), self.counts.get(name).copied().unwrap_or(0)))
                .collect(),
        }
    }
}

#[derive(Default)]
struct Stats {
    round_trips: AtomicUsize,
    fetches: AtomicUsize,
    cancels: AtomicUsize,
    compressed_sessions: AtomicUsize,
    operations: parking_lot::Mutex<Vec<Operation>>,
    executions: parking_lot::Mutex<HashMap<String, usize>>,
    timeouts: parking_lot::Mutex<Vec<u32>>,
}

/// State shared by every connection of one server.
struct Shared {
    config: MockServerConfig,
    blobs: parking_lot::Mutex<HashMap<u64, MockBlob>>,
    next_blob_id: AtomicU64,
    events: parking_lot::Mutex<EventTable>,
    next_event_id: AtomicU32,
    next_session: AtomicU64,
    stats: Stats,
}

impl Shared {
    fn record_execution(&self, sql: &str) {
        *self
            .stats
            .executions
            .lock()
            .entry(sql.to_string())
            .or_insert(0) += 1;
    }
}

/// A mock server for testing.
///
/// Every accepted connection gets its own handles; blobs, event counts and
/// statistics are shared by all connections.
pub struct MockServer {
    /// Server address.
    addr: SocketAddr,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
    /// State shared with the connection tasks.
    shared: Arc<Shared>,
    /// Connection count.
    connection_count: Arc<Mutex<usize>>,
}

impl MockServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(mut config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let blobs = std::mem::take(&mut config.blobs);
        let next_blob_id = blobs.keys().max().map_or(1, |max| max + 1);
        let shared = Arc::new(Shared {
            config,
            blobs: parking_lot::Mutex::new(blobs),
            next_blob_id: AtomicU64::new(next_blob_id),
            events: parking_lot::Mutex::new(EventTable::default()),
            next_event_id: AtomicU32::new(1),
            next_session: AtomicU64::new(1),
            stats: Stats::default(),
        });
        let connection_count = Arc::new(Mutex::new(0usize));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            shared: Arc::clone(&shared),
            connection_count: Arc::clone(&connection_count),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let shared = Arc::clone(&shared);
                                let count = Arc::clone(&connection_count);
                                tokio::spawn(async move {
                                    {
                                        let mut c = count.lock().await;
                                        *c += 1;
                                    }
                                    if let Err(e) = handle_connection(stream, shared).await {
                                        tracing::debug!("Connection error: {}", e);
                                    }
                                    {
                                        let mut c = count.lock().await;
                                        *c = c.saturating_sub(1);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get the current connection count.
    pub async fn connection_count(&self) -> usize {
        *self.connection_count.lock().await
    }

    /// Post `count` occurrences of the event `name`.
    ///
    /// Every registration waiting for the event is notified once and then
    /// removed. Returns the number of notifications sent.
    pub fn post_event(&self, name: &str, count: u32) -> usize {
        let mut table = self.shared.events.lock();
        let total = table.counts.entry(name.to_string()).or_insert(0);
        *total = total.saturating_add(count);

        let (fired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut table.registrations)
            .into_iter()
            .partition(|registration| registration.names.iter().any(|n| n == name));
        table.registrations = waiting;

        let mut sent = 0;
        for registration in fired {
            let epb = match table.current(&registration.names).to_bytes() {
                Ok(epb) => epb,
                Err(e) => {
                    tracing::warn!(error = %e, "event buffer not encodable");
                    continue;
                }
            };
            let message = Response::Event(EventMessage {
                database: registration.database,
                epb,
                local_id: registration.local_id,
            });
            if registration.notify.send(message.to_bytes()).is_ok() {
                sent += 1;
            }
        }
        tracing::debug!(event = name, notified = sent, "event posted");
        sent
    }

    /// Total occurrences posted for `name`.
    pub fn event_count(&self, name: &str) -> u32 {
        self.shared.events.lock().counts.get(name).copied().unwrap_or(0)
    }

    /// Registrations waiting for a notification.
    pub fn pending_registrations(&self) -> usize {
        self.shared.events.lock().registrations.len()
    }

    /// Blob stored under `id`.
    pub fn blob(&self, id: u64) -> Option<MockBlob> {
        self.shared.blobs.lock().get(&id).cloned()
    }

    /// Requests answered so far, over all connections.
    pub fn round_trips(&self) -> usize {
        self.shared.stats.round_trips.load(Ordering::SeqCst)
    }

    /// Connections that switched to wire compression.
    pub fn compressed_sessions(&self) -> usize {
        self.shared.stats.compressed_sessions.load(Ordering::SeqCst)
    }

    /// `op_fetch` requests received.
    pub fn fetch_count(&self) -> usize {
        self.shared.stats.fetches.load(Ordering::SeqCst)
    }

    /// Operations cancelled by a cancel request.
    pub fn cancel_count(&self) -> usize {
        self.shared.stats.cancels.load(Ordering::SeqCst)
    }

    /// Requests of `operation` received.
    pub fn operation_count(&self, operation: Operation) -> usize {
        self.shared
            .stats
            .operations
            .lock()
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    /// Successful executions of `sql`, counting each batch item.
    pub fn executions(&self, sql: &str) -> usize {
        self.shared
            .stats
            .executions
            .lock()
            .get(sql)
            .copied()
            .unwrap_or(0)
    }

    /// Timeout sent with the most recent execute, in milliseconds.
    pub fn last_timeout_ms(&self) -> Option<u32> {
        self.shared.stats.timeouts.lock().last().copied()
    }

    /// Stop the server.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle a single client connection.
async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut session = Session::new(stream, Arc::clone(&shared));

    // Step 1: negotiate the protocol revision
    let Some(first) = session.next_request().await? else {
        return Ok(());
    };
    let (database, offers) = match first {
        Request::Connect {
            database, offers, ..
        } => (database, offers),
        other => {
            return Err(MockServerError::Protocol(format!(
                "Expected op_connect, got {:?}",
                other.operation()
            )));
        }
    };
    match version::select_offer(&offers, &shared.config.revisions) {
        Some(offer) => {
            let compress = match shared.config.compression {
                CompressionPolicy::Refuse => false,
                CompressionPolicy::Honour => offer.wants_compression(),
                CompressionPolicy::Force => true,
            };
            tracing::debug!(
                database = %database,
                revision = %offer.revision,
                compress,
                "accepting connection"
            );
            let packet_type = if compress {
                PTYPE_LAZY_SEND | PTYPE_COMPRESS_FLAG
            } else {
                PTYPE_LAZY_SEND
            };
            session
                .send(Response::Accept(AcceptResponse {
                    revision: offer.revision,
                    architecture: offer.architecture,
                    packet_type,
                }))
                .await?;
            if compress {
                session.stream.enable_compression();
                shared.stats.compressed_sessions.fetch_add(1, Ordering::SeqCst);
            }
        }
        None => {
            tracing::debug!(database = %database, "no common protocol revision");
            session.send(Response::Reject).await?;
            return Ok(());
        }
    }

    // Step 2: serve requests until the client goes away
    let result = session.run().await;
    let id = session.id;
    shared
        .events
        .lock()
        .registrations
        .retain(|registration| registration.session != id);
    result
}

#[derive(Default)]
struct SessionStatement {
    sql: Option<String>,
    cursor: Option<VecDeque<RowData>>,
    transaction: u32,
    max_inline_blob_size: u32,
    batch: Vec<RowData>,
}

struct OpenBlob {
    id: u64,
    blob: MockBlob,
    position: usize,
    output: bool,
}

impl OpenBlob {
    /// Read up to `max` bytes; returns the packed segments and the read state.
    fn read(&mut self, max: usize) -> (Bytes, u32) {
        let total = self.blob.len();
        if self.blob.stream {
            let data = self.blob.data();
            let start = self.position.min(total);
            let end = start.saturating_add(max).min(total);
            self.position = end;
            let state = if end == total {
                SEGMENT_EOF
            } else {
                SEGMENT_COMPLETE
            };
            return (segment::pack(&data[start..end]), state);
        }

        // Segmented blobs hand out at most one segment per read.
        let mut offset = 0;
        let mut current = None;
        for piece in &self.blob.segments {
            if self.position < offset + piece.len() {
                current = Some((piece.clone(), self.position - offset));
                break;
            }
            offset += piece.len();
        }
        let Some((piece, within)) = current else {
            return (Bytes::new(), SEGMENT_EOF);
        };
        let available = piece.len() - within;
        let take = available.min(max).min(MAX_SEGMENT_SIZE);
        self.position += take;
        let state = if self.position >= total {
            SEGMENT_EOF
        } else if take < available {
            SEGMENT_PARTIAL
        } else {
            SEGMENT_COMPLETE
        };
        (segment::pack(&piece[within..within + take]), state)
    }

    fn seek(&mut self, mode: u32, offset: i64) -> usize {
        let len = self.blob.len() as i64;
        let base = match mode {
            SEEK_RELATIVE => self.position as i64,
            SEEK_FROM_END => len,
            _ => 0,
        };
        self.position = base.saturating_add(offset).clamp(0, len) as usize;
        self.position
    }
}

enum Flow {
    Continue,
    Close,
}

enum Interrupt {
    Elapsed,
    Cancelled,
    Closed,
}

fn failure(code: u32) -> StatusVector {
    StatusVector::error(code)
}

fn failure_message(message: impl Into<String>) -> StatusVector {
    StatusVector::from_entry(StatusEntry::error(codes::RANDOM).with_string(message))
}

struct Session {
    id: u64,
    stream: FrameStream<TcpStream>,
    shared: Arc<Shared>,
    pending: VecDeque<Request>,
    next_handle: u32,
    database: u32,
    transactions: HashSet<u32>,
    statements: HashMap<u32, SessionStatement>,
    blobs: HashMap<u32, OpenBlob>,
    sent_inline: HashSet<(u32, u64)>,
    events: Option<mpsc::UnboundedSender<Bytes>>,
    cancel_enabled: bool,
    service_lines: VecDeque<String>,
}

impl Session {
    fn new(stream: TcpStream, shared: Arc<Shared>) -> Self {
        let id = shared.next_session.fetch_add(1, Ordering::SeqCst);
        Self {
            id,
            stream: FrameStream::new(stream),
            shared,
            pending: VecDeque::new(),
            next_handle: 1,
            database: 0,
            transactions: HashSet::new(),
            statements: HashMap::new(),
            blobs: HashMap::new(),
            sent_inline: HashSet::new(),
            events: None,
            cancel_enabled: true,
            service_lines: VecDeque::new(),
        }
    }

    async fn run(&mut self) -> Result<()> {
        loop {
            let request = match self.pending.pop_front() {
                Some(request) => request,
                None => match self.next_request().await? {
                    Some(request) => request,
                    None => return Ok(()),
                },
            };
            if request.expects_response() {
                self.shared.stats.round_trips.fetch_add(1, Ordering::SeqCst);
            }
            self.shared.stats.operations.lock().push(request.operation());
            if let Flow::Close = self.handle(request).await? {
                return Ok(());
            }
        }
    }

    async fn next_request(&mut self) -> Result<Option<Request>> {
        match self.stream.next().await {
            None => Ok(None),
            Some(frame) => {
                let mut frame = frame?;
                Ok(Some(Request::decode(&mut frame)?))
            }
        }
    }

    async fn send(&mut self, response: Response) -> Result<()> {
        self.stream.send(response.to_bytes()).await?;
        Ok(())
    }

    async fn reply(&mut self, response: GenericResponse) -> Result<()> {
        self.send(Response::Generic(response)).await
    }

    async fn ok(&mut self) -> Result<()> {
        self.reply(GenericResponse::ok()).await
    }

    async fn fail(&mut self, status: StatusVector) -> Result<()> {
        tracing::debug!(status = %status, "request failed");
        self.reply(GenericResponse::failed(status)).await
    }

    fn allocate(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Wait for `delay` while watching for cancel requests.
    async fn wait(&mut self, delay: Duration) -> Result<Interrupt> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return Ok(Interrupt::Elapsed),
                frame = self.stream.next() => {
                    let Some(frame) = frame else {
                        return Ok(Interrupt::Closed);
                    };
                    let mut frame = frame?;
                    match Request::decode(&mut frame)? {
                        Request::Cancel { kind } => match CancelKind::from_code(kind) {
                            Some(CancelKind::Raise) if self.cancel_enabled => {
                                return Ok(Interrupt::Cancelled);
                            }
                            Some(CancelKind::Abort) => return Ok(Interrupt::Closed),
                            Some(CancelKind::Disable) => self.cancel_enabled = false,
                            Some(CancelKind::Enable) => self.cancel_enabled = true,
                            _ => {}
                        },
                        other => self.pending.push_back(other),
                    }
                }
            }
        }
    }

    async fn handle(&mut self, request: Request) -> Result<Flow> {
        match request {
            Request::Connect { .. } => self.send(Response::Reject).await?,
            Request::Attach { database, dpb } | Request::Create { database, dpb } => {
                let params = ParameterBuffer::parse(&dpb)?;
                let user = params
                    .get(dpb::USER_NAME)
                    .map(|item| item.as_string())
                    .unwrap_or_default();
                self.database = self.allocate();
                tracing::debug!(database = %database, user = %user, handle = self.database, "attached");
                self.reply(GenericResponse::with_handle(self.database)).await?;
            }
            Request::Detach { .. } | Request::DropDatabase { .. } => {
                self.events = None;
                self.ok().await?;
            }
            Request::InfoDatabase { items, .. } => {
                let mut builder = InfoBuilder::new();
                for &item in items.iter() {
                    builder = match item {
                        INFO_DB_SERVER_VERSION => {
                            builder.string(item, &self.shared.config.server_version)
                        }
                        INFO_DB_PAGE_SIZE => builder.int(item, self.shared.config.page_size as i32),
                        INFO_DB_SQL_DIALECT => builder.int(item, 3),
                        _ => builder,
                    };
                }
                self.reply(GenericResponse {
                    data: builder.finish(),
                    ..GenericResponse::ok()
                })
                .await?;
            }
            Request::ServiceAttach { service, .. } => {
                let handle = self.allocate();
                tracing::debug!(service = %service, handle = handle, "service attached");
                self.reply(GenericResponse::with_handle(handle)).await?;
            }
            Request::ServiceStart { .. } => {
                self.service_lines = self.shared.config.service_output.iter().cloned().collect();
                self.ok().await?;
            }
            Request::ServiceInfo { items, .. } => {
                let mut builder = InfoBuilder::new();
                for &item in items.iter() {
                    builder = match item {
                        INFO_SVC_SERVER_VERSION => {
                            builder.string(item, &self.shared.config.server_version)
                        }
                        INFO_SVC_LINE => {
                            let line = self.service_lines.pop_front().unwrap_or_default();
                            builder.string(item, &line)
                        }
                        _ => builder,
                    };
                }
                self.reply(GenericResponse {
                    data: builder.finish(),
                    ..GenericResponse::ok()
                })
                .await?;
            }
            Request::ServiceDetach { .. } => self.ok().await?,
            Request::Transaction { .. } => {
                let handle = self.allocate();
                self.transactions.insert(handle);
                self.reply(GenericResponse::with_handle(handle)).await?;
            }
            Request::Reconnect { transaction_id, .. } => {
                let handle = self.allocate();
                self.transactions.insert(handle);
                tracing::debug!(transaction_id = transaction_id, handle = handle, "transaction reconnected");
                self.reply(GenericResponse::with_handle(handle)).await?;
            }
            Request::Commit { transaction } | Request::Rollback { transaction } => {
                if self.transactions.remove(&transaction) {
                    self.sent_inline.retain(|(tx, _)| *tx != transaction);
                    self.ok().await?;
                } else {
                    self.fail(failure(codes::BAD_TRANS_HANDLE)).await?;
                }
            }
            Request::CommitRetaining { transaction }
            | Request::RollbackRetaining { transaction }
            | Request::Prepare { transaction, .. } => {
                if self.transactions.contains(&transaction) {
                    self.ok().await?;
                } else {
                    self.fail(failure(codes::BAD_TRANS_HANDLE)).await?;
                }
            }
            Request::InfoTransaction {
                transaction, items, ..
            } => {
                if !self.transactions.contains(&transaction) {
                    self.fail(failure(codes::BAD_TRANS_HANDLE)).await?;
                    return Ok(Flow::Continue);
                }
                let mut builder = InfoBuilder::new();
                for &item in items.iter() {
                    if item == INFO_TRA_ID {
                        builder = builder.int(item, transaction as i32);
                    }
                }
                self.reply(GenericResponse {
                    data: builder.finish(),
                    ..GenericResponse::ok()
                })
                .await?;
            }
            Request::AllocateStatement { .. } => {
                let handle = self.allocate();
                self.statements.insert(handle, SessionStatement::default());
                self.reply(GenericResponse::with_handle(handle)).await?;
            }
            Request::PrepareStatement { statement, sql, .. } => {
                self.prepare(statement, sql).await?;
            }
            Request::Execute(request) => self.execute(request, false).await?,
            Request::Execute2(request) => self.execute(request, true).await?,
            Request::ExecImmediate { sql, .. } => {
                let error = self
                    .shared
                    .config
                    .statements
                    .get(&sql)
                    .and_then(|statement| statement.execute_error.clone());
                match error {
                    Some(status) => self.fail(status).await?,
                    None => {
                        self.shared.record_execution(&sql);
                        self.ok().await?;
                    }
                }
            }
            Request::Fetch { statement, count } => return self.fetch(statement, count).await,
            Request::FreeStatement { statement, option } => {
                let known = match option {
                    FREE_DROP => self.statements.remove(&statement).is_some(),
                    FREE_CLOSE | FREE_UNPREPARE => match self.statements.get_mut(&statement) {
                        Some(entry) => {
                            entry.cursor = None;
                            if option == FREE_UNPREPARE {
                                entry.sql = None;
                            }
                            true
                        }
                        None => false,
                    },
                    _ => {
                        self.fail(failure_message(format!("bad free option {option}")))
                            .await?;
                        return Ok(Flow::Continue);
                    }
                };
                if known {
                    self.ok().await?;
                } else {
                    self.fail(failure(codes::BAD_REQ_HANDLE)).await?;
                }
            }
            Request::SetCursor { statement, .. } => match self.prepared(statement) {
                Ok(_) => self.ok().await?,
                Err(status) => self.fail(status).await?,
            },
            Request::InfoSql {
                statement, items, ..
            } => match self.prepared(statement) {
                Ok((_, mock)) => {
                    let mut builder = InfoBuilder::new();
                    for &item in items.iter() {
                        builder = match item {
                            INFO_SQL_STMT_TYPE => {
                                builder.int(item, mock.statement_type.to_u32() as i32)
                            }
                            INFO_SQL_GET_PLAN => builder.string(item, &format!("\n{}", mock.plan)),
                            _ => builder,
                        };
                    }
                    self.reply(GenericResponse {
                        data: builder.finish(),
                        ..GenericResponse::ok()
                    })
                    .await?;
                }
                Err(status) => self.fail(status).await?,
            },
            Request::BatchCreate { statement, .. } => match self.statements.get_mut(&statement) {
                Some(entry) => {
                    entry.batch.clear();
                    self.ok().await?;
                }
                None => self.fail(failure(codes::BAD_REQ_HANDLE)).await?,
            },
            Request::BatchMsg { statement, rows } => match self.statements.get_mut(&statement) {
                Some(entry) => {
                    entry.batch.extend(rows);
                    self.ok().await?;
                }
                None => self.fail(failure(codes::BAD_REQ_HANDLE)).await?,
            },
            Request::BatchExec { statement, .. } => self.execute_batch(statement).await?,
            Request::BatchRelease { statement } => {
                if let Some(entry) = self.statements.get_mut(&statement) {
                    entry.batch.clear();
                }
                self.ok().await?;
            }
            Request::CreateBlob { bpb, .. } => {
                let params = ParameterBuffer::parse(&bpb)?;
                let stream = params
                    .get(bpb::TYPE)
                    .is_some_and(|item| item.as_int() == i64::from(bpb::TYPE_STREAM));
                let id = self.shared.next_blob_id.fetch_add(1, Ordering::SeqCst);
                let handle = self.allocate();
                self.blobs.insert(
                    handle,
                    OpenBlob {
                        id,
                        blob: MockBlob {
                            segments: Vec::new(),
                            stream,
                        },
                        position: 0,
                        output: true,
                    },
                );
                self.reply(GenericResponse {
                    handle,
                    blob_id: id,
                    ..GenericResponse::ok()
                })
                .await?;
            }
            Request::OpenBlob { blob_id, .. } => {
                let stored = self.shared.blobs.lock().get(&blob_id).cloned();
                let Some(blob) = stored else {
                    self.fail(failure(codes::BAD_SEGSTR_ID)).await?;
                    return Ok(Flow::Continue);
                };
                let handle = self.allocate();
                let data = blob.info(&[INFO_BLOB_TYPE, INFO_BLOB_TOTAL_LENGTH]);
                self.blobs.insert(
                    handle,
                    OpenBlob {
                        id: blob_id,
                        blob,
                        position: 0,
                        output: false,
                    },
                );
                self.reply(GenericResponse {
                    handle,
                    blob_id,
                    data,
                    ..GenericResponse::ok()
                })
                .await?;
            }
            Request::GetSegment { blob, max_length } => match self.blobs.get_mut(&blob) {
                Some(open) if open.output => self.fail(failure(codes::SEGSTR_NO_READ)).await?,
                Some(open) => {
                    let (data, state) = open.read(max_length as usize);
                    self.reply(GenericResponse {
                        handle: state,
                        data,
                        ..GenericResponse::ok()
                    })
                    .await?;
                }
                None => self.fail(failure(codes::BAD_SEGSTR_HANDLE)).await?,
            },
            Request::PutSegment { blob, segment } => {
                self.write_segments(blob, vec![segment]).await?;
            }
            Request::BatchSegments { blob, data } => {
                let pieces = segment::unpack(&data)?;
                self.write_segments(blob, pieces).await?;
            }
            Request::SeekBlob { blob, mode, offset } => match self.blobs.get_mut(&blob) {
                Some(open) if open.output || !open.blob.stream => {
                    self.fail(failure(codes::BAD_SEGSTR_TYPE)).await?;
                }
                Some(open) => {
                    let position = open.seek(mode, offset);
                    self.reply(GenericResponse {
                        blob_id: position as u64,
                        ..GenericResponse::ok()
                    })
                    .await?;
                }
                None => self.fail(failure(codes::BAD_SEGSTR_HANDLE)).await?,
            },
            Request::InfoBlob { blob, items, .. } => match self.blobs.get(&blob) {
                Some(open) => {
                    let data = open.blob.info(&items);
                    self.reply(GenericResponse {
                        data,
                        ..GenericResponse::ok()
                    })
                    .await?;
                }
                None => self.fail(failure(codes::BAD_SEGSTR_HANDLE)).await?,
            },
            Request::CloseBlob { blob } => match self.blobs.remove(&blob) {
                Some(open) => {
                    if open.output {
                        tracing::debug!(blob_id = open.id, length = open.blob.len(), "blob stored");
                        self.shared.blobs.lock().insert(open.id, open.blob);
                    }
                    self.ok().await?;
                }
                None => self.fail(failure(codes::BAD_SEGSTR_HANDLE)).await?,
            },
            Request::CancelBlob { blob } => match self.blobs.remove(&blob) {
                Some(_) => self.ok().await?,
                None => self.fail(failure(codes::BAD_SEGSTR_HANDLE)).await?,
            },
            Request::ConnectRequest { .. } => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(serve_events(listener, rx));
                self.events = Some(tx);
                tracing::debug!(port = port, "event listener started");
                self.reply(GenericResponse {
                    data: Bytes::copy_from_slice(&port.to_be_bytes()),
                    ..GenericResponse::ok()
                })
                .await?;
            }
            Request::QueEvents {
                database,
                epb,
                local_id,
            } => self.queue_events(database, epb, local_id).await?,
            Request::CancelEvents { event_id, .. } => {
                self.shared
                    .events
                    .lock()
                    .registrations
                    .retain(|registration| registration.event_id != event_id);
                self.ok().await?;
            }
            Request::Cancel { kind } => match CancelKind::from_code(kind) {
                Some(CancelKind::Abort) => return Ok(Flow::Close),
                Some(CancelKind::Disable) => self.cancel_enabled = false,
                Some(CancelKind::Enable) => self.cancel_enabled = true,
                // Nothing is running.
                _ => {}
            },
            Request::Dummy => self.ok().await?,
            Request::Disconnect => return Ok(Flow::Close),
            other => {
                tracing::debug!("Unsupported operation: {:?}", other.operation());
                self.fail(failure_message(format!(
                    "unsupported operation {:?}",
                    other.operation()
                )))
                .await?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Statement text and canned behaviour of a prepared handle.
    fn prepared(&self, handle: u32) -> std::result::Result<(String, MockStatement), StatusVector> {
        let entry = self
            .statements
            .get(&handle)
            .ok_or_else(|| failure(codes::BAD_REQ_HANDLE))?;
        let sql = entry
            .sql
            .clone()
            .ok_or_else(|| failure(codes::UNPREPARED_STMT))?;
        let statement = self
            .shared
            .config
            .statements
            .get(&sql)
            .cloned()
            .ok_or_else(|| failure(codes::DSQL_ERROR))?;
        Ok((sql, statement))
    }

    async fn prepare(&mut self, handle: u32, sql: String) -> Result<()> {
        if !self.statements.contains_key(&handle) {
            return self.fail(failure(codes::BAD_REQ_HANDLE)).await;
        }
        let Some(statement) = self.shared.config.statements.get(&sql).cloned() else {
            let mut status = failure(codes::DSQL_ERROR);
            status.push(StatusEntry::error(codes::SQLERR).with_number(-204));
            return self.fail(status).await;
        };
        if let Some(status) = statement.prepare_error {
            return self.fail(status).await;
        }

        let mut data = BytesMut::new();
        statement.description().encode(&mut data);
        if let Some(entry) = self.statements.get_mut(&handle) {
            entry.sql = Some(sql);
            entry.cursor = None;
            entry.batch.clear();
        }
        self.reply(GenericResponse {
            data: data.freeze(),
            ..GenericResponse::ok()
        })
        .await
    }

    async fn execute(&mut self, request: ExecuteRequest, singleton: bool) -> Result<()> {
        let (sql, statement) = match self.prepared(request.statement) {
            Ok(prepared) => prepared,
            Err(status) => return self.fail(status).await,
        };
        self.shared
            .stats
            .timeouts
            .lock()
            .push(request.timeout_ms);
        if !self.transactions.contains(&request.transaction) {
            return self.fail(failure(codes::BAD_TRANS_HANDLE)).await;
        }
        let parameters = request.parameters.unwrap_or_default();
        if let Some(status) = statement.failure_for(&parameters) {
            return self.fail(status).await;
        }
        self.shared.record_execution(&sql);

        if statement.statement_type.has_cursor() {
            if let Some(entry) = self.statements.get_mut(&request.statement) {
                entry.cursor = Some(statement.rows.iter().cloned().collect());
                entry.transaction = request.transaction;
                entry.max_inline_blob_size = request.max_inline_blob_size;
            }
            self.ok().await
        } else if singleton {
            self.send(Response::Sql(statement.rows.first().cloned()))
                .await?;
            self.ok().await
        } else {
            self.reply(GenericResponse {
                data: Bytes::copy_from_slice(&statement.affected.to_be_bytes()),
                ..GenericResponse::ok()
            })
            .await
        }
    }

    async fn fetch(&mut self, handle: u32, count: u32) -> Result<Flow> {
        self.shared.stats.fetches.fetch_add(1, Ordering::SeqCst);
        let statement = match self.prepared(handle) {
            Ok((_, statement)) => statement,
            Err(status) => {
                self.fail(status).await?;
                return Ok(Flow::Continue);
            }
        };
        let open = self
            .statements
            .get(&handle)
            .is_some_and(|entry| entry.cursor.is_some());
        if !open {
            self.fail(failure(codes::DSQL_CURSOR_ERR)).await?;
            return Ok(Flow::Continue);
        }

        if let Some(delay) = statement.fetch_delay {
            match self.wait(delay).await? {
                Interrupt::Elapsed => {}
                Interrupt::Cancelled => {
                    self.shared.stats.cancels.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(statement = handle, "fetch cancelled");
                    self.fail(failure(codes::CANCELLED)).await?;
                    return Ok(Flow::Continue);
                }
                Interrupt::Closed => return Ok(Flow::Close),
            }
        }

        let (rows, transaction, max_inline) = match self.statements.get_mut(&handle) {
            Some(SessionStatement {
                cursor: Some(cursor),
                transaction,
                max_inline_blob_size,
                ..
            }) => {
                let take = cursor.len().min(count as usize);
                let rows: Vec<RowData> = cursor.drain(..take).collect();
                (rows, *transaction, *max_inline_blob_size)
            }
            _ => (Vec::new(), 0, 0),
        };
        let status = if rows.len() < count as usize {
            FetchStatus::Eof
        } else {
            FetchStatus::More
        };

        if max_inline > 0 {
            for blob in self.inline_blobs(&statement.fields, &rows, transaction, max_inline) {
                self.stream
                    .feed(Response::InlineBlob(blob).to_bytes())
                    .await?;
            }
        }
        self.send(Response::Fetch(FetchResponse { status, rows }))
            .await?;
        Ok(Flow::Continue)
    }

    /// Blobs referenced by `rows` small enough to send along with them.
    fn inline_blobs(
        &mut self,
        fields: &[FieldDescriptor],
        rows: &[RowData],
        transaction: u32,
        max_inline: u32,
    ) -> Vec<InlineBlob> {
        let mut inline = Vec::new();
        let store = self.shared.blobs.lock();
        for row in rows {
            for (field, value) in fields.iter().zip(&row.fields) {
                let Some(value) = value else { continue };
                let Ok(raw) = <[u8; 8]>::try_from(value.as_ref()) else {
                    continue;
                };
                if !field.is_blob() {
                    continue;
                }
                let id = u64::from_be_bytes(raw);
                let Some(blob) = store.get(&id) else { continue };
                if blob.len() > max_inline as usize || !self.sent_inline.insert((transaction, id)) {
                    continue;
                }
                inline.push(InlineBlob {
                    transaction,
                    blob_id: id,
                    stream: blob.stream,
                    segment_count: blob.segments.len() as u32,
                    data: blob.data(),
                });
            }
        }
        inline
    }

    async fn execute_batch(&mut self, handle: u32) -> Result<()> {
        let (sql, statement) = match self.prepared(handle) {
            Ok(prepared) => prepared,
            Err(status) => return self.fail(status).await,
        };
        let rows = self
            .statements
            .get_mut(&handle)
            .map(|entry| std::mem::take(&mut entry.batch))
            .unwrap_or_default();

        let mut completion = BatchCompletion {
            statement: handle,
            ..BatchCompletion::default()
        };
        for (index, row) in rows.iter().enumerate() {
            if let Some(status) = statement.failure_for(row) {
                completion.errors.push((index as u32, status));
                break;
            }
            self.shared.record_execution(&sql);
            completion.counts.push(statement.affected);
        }
        tracing::debug!(
            statement = handle,
            executed = completion.counts.len(),
            failed = completion.errors.len(),
            "batch executed"
        );
        self.send(Response::BatchCompletion(completion)).await
    }

    async fn write_segments(&mut self, handle: u32, pieces: Vec<Bytes>) -> Result<()> {
        match self.blobs.get_mut(&handle) {
            Some(open) if open.output => {
                open.blob.segments.extend(pieces);
                self.ok().await
            }
            Some(_) => self.fail(failure(codes::SEGSTR_NO_WRITE)).await,
            None => self.fail(failure(codes::BAD_SEGSTR_HANDLE)).await,
        }
    }

    async fn queue_events(&mut self, database: u32, epb: Bytes, local_id: u32) -> Result<()> {
        let Some(notify) = self.events.clone() else {
            return self.fail(failure_message("no event connection")).await;
        };
        let buffer = match EventBuffer::parse(&epb) {
            Ok(buffer) => buffer,
            Err(e) => return self.fail(failure_message(e.to_string())).await,
        };
        let event_id = self.shared.next_event_id.fetch_add(1, Ordering::SeqCst);
        let names: Vec<String> = buffer.events.iter().map(|(name, _)| name.clone()).collect();

        let immediate = {
            let mut table = self.shared.events.lock();
            let current = table.current(&names);
            if current == buffer {
                table.registrations.push(Registration {
                    session: self.id,
                    event_id,
                    database,
                    local_id,
                    names,
                    notify: notify.clone(),
                });
                None
            } else {
                Some(current)
            }
        };

        if let Some(current) = immediate {
            // Counts moved since the client last looked: notify right away.
            let message = Response::Event(EventMessage {
                database,
                epb: current.to_bytes()?,
                local_id,
            });
            let _ = notify.send(message.to_bytes());
        }
        tracing::debug!(event_id = event_id, local_id = local_id, "events queued");
        self.reply(GenericResponse::with_handle(event_id)).await
    }
}

/// Serve the auxiliary connection that carries event notifications.
async fn serve_events(listener: TcpListener, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    let stream = match listener.accept().await {
        Ok((stream, _)) => stream,
        Err(e) => {
            tracing::debug!("Event accept error: {}", e);
            return;
        }
    };
    let mut frames = FrameStream::new(stream);
    while let Some(message) = rx.recv().await {
        if let Err(e) = frames.send(message).await {
            tracing::debug!("Event delivery error: {}", e);
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fb_codec::Connection;
    use fb_protocol::ProtocolOffer;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockServer::builder().build().await.unwrap();

        assert!(server.port() > 0);
        assert_eq!(server.host(), "127.0.0.1");
        assert_eq!(server.connection_count().await, 0);
    }

    async fn negotiate(server: &MockServer, offered: &[ProtocolRevision]) -> Response {
        let stream = TcpStream::connect(server.addr()).await.unwrap();
        let mut conn = Connection::new(stream);
        conn.call(&Request::Connect {
            database: "test.fdb".into(),
            user: "SYSDBA".into(),
            offers: offered.iter().copied().map(ProtocolOffer::new).collect(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_accepts_highest_common_revision() {
        let server = MockServer::builder()
            .with_revisions(vec![
                ProtocolRevision::V10,
                ProtocolRevision::V13,
                ProtocolRevision::V15,
            ])
            .build()
            .await
            .unwrap();
        let offered = [
            ProtocolRevision::V16,
            ProtocolRevision::V10,
            ProtocolRevision::V15,
            ProtocolRevision::V13,
        ];
        match negotiate(&server, &offered).await {
            Response::Accept(accept) => assert_eq!(accept.revision, ProtocolRevision::V15),
            other => panic!("expected accept, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_without_common_revision() {
        let server = MockServer::builder()
            .with_revisions(vec![ProtocolRevision::V19])
            .build()
            .await
            .unwrap();
        let response = negotiate(&server, &[ProtocolRevision::V10]).await;
        assert_eq!(response, Response::Reject);
    }

    #[test]
    fn test_segmented_reads_stop_at_segment_boundaries() {
        let mut open = OpenBlob {
            id: 1,
            blob: MockBlob::segmented(vec![
                Bytes::from_static(b"hello"),
                Bytes::from_static(b"world!"),
            ]),
            position: 0,
            output: false,
        };

        let (data, state) = open.read(3);
        assert_eq!(segment::unpack(&data).unwrap(), vec![Bytes::from_static(b"hel")]);
        assert_eq!(state, SEGMENT_PARTIAL);

        let (data, state) = open.read(100);
        assert_eq!(segment::unpack(&data).unwrap(), vec![Bytes::from_static(b"lo")]);
        assert_eq!(state, SEGMENT_COMPLETE);

        let (data, state) = open.read(100);
        assert_eq!(segment::unpack(&data).unwrap(), vec![Bytes::from_static(b"world!")]);
        assert_eq!(state, SEGMENT_EOF);

        let (data, state) = open.read(100);
        assert!(data.is_empty());
        assert_eq!(state, SEGMENT_EOF);
    }

    #[test]
    fn test_stream_seek_clamps() {
        let mut open = OpenBlob {
            id: 1,
            blob: MockBlob::stream(Bytes::from_static(b"0123456789")),
            position: 0,
            output: false,
        };
        assert_eq!(open.seek(SEEK_FROM_END, -3), 7);
        let (data, state) = open.read(10);
        assert_eq!(segment::unpack(&data).unwrap(), vec![Bytes::from_static(b"789")]);
        assert_eq!(state, SEGMENT_EOF);
        assert_eq!(open.seek(SEEK_RELATIVE, -100), 0);
        assert_eq!(open.seek(fb_protocol::segment::SEEK_ABSOLUTE, 100), 10);
    }

    #[test]
    fn test_failing_value_matches_parameters() {
        let statement = MockStatement::insert(1)
            .failing_on(Bytes::from_static(b"dup"), StatusVector::error(codes::NO_DUP));
        let ok = RowData::new(vec![Some(Bytes::from_static(b"fresh"))]);
        let dup = RowData::new(vec![None, Some(Bytes::from_static(b"dup"))]);
        assert!(statement.failure_for(&ok).is_none());
        assert_eq!(
            statement.failure_for(&dup).and_then(|s| s.error_code()),
            Some(codes::NO_DUP)
        );
    }

    #[test]
    fn test_blob_info_items() {
        let blob = MockBlob::segmented(vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cde")]);
        let items = fb_protocol::info::parse_info(&blob.info(&[
            INFO_BLOB_TOTAL_LENGTH,
            INFO_BLOB_NUM_SEGMENTS,
            INFO_BLOB_MAX_SEGMENT,
            INFO_BLOB_TYPE,
        ]))
        .unwrap();
        let value = |code| {
            fb_protocol::info::find_item(&items, code)
                .unwrap()
                .as_integer()
        };
        assert_eq!(value(INFO_BLOB_TOTAL_LENGTH), 5);
        assert_eq!(value(INFO_BLOB_NUM_SEGMENTS), 2);
        assert_eq!(value(INFO_BLOB_MAX_SEGMENT), 3);
        assert_eq!(value(INFO_BLOB_TYPE), 0);
    }
}
