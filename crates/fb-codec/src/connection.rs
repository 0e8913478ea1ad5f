//! Split I/O connection.
//!
//! The transport is split into separate read and write halves so a cancel
//! request can be sent while another task is blocked reading a response.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fb_protocol::{CancelKind, Request, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::error::CodecError;
use crate::framed::{FrameReader, FrameWriter};

/// A wire connection with split I/O.
///
/// Requests are written as single frames. Responses are read in order; keep
/// alive (`op_dummy`) frames are skipped.
///
/// # Deferred requests
///
/// From protocol revision 11 a few requests (statement close and drop) may
/// be sent without waiting for their answers. [`Connection::send_deferred`]
/// buffers such a request; its response is read ahead of the next regular
/// response and kept for [`Connection::take_deferred_responses`].
///
/// # Example
///
/// ```rust,ignore
/// use fb_codec::Connection;
/// use fb_protocol::{CancelKind, Request};
///
/// let stream = TcpStream::connect("localhost:3050").await?;
/// let mut conn = Connection::new(stream);
///
/// let cancel = conn.cancel_handle();
/// tokio::spawn(async move {
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     cancel.cancel(CancelKind::Raise).await
/// });
///
/// let response = conn.call(&Request::Dummy).await?;
/// ```
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: FrameReader<ReadHalf<T>>,
    /// Shared with cancel handles.
    writer: Arc<Mutex<FrameWriter<WriteHalf<T>>>>,
    read_timeout: Option<Duration>,
    /// Responses still owed for deferred requests.
    deferred: usize,
    deferred_responses: Vec<Response>,
    closed: Arc<AtomicBool>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a connection from a transport.
    ///
    /// The transport is immediately split into read and write halves.
    pub fn new(transport: T) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);

        Self {
            reader: FrameReader::new(read_half),
            writer: Arc::new(Mutex::new(FrameWriter::new(write_half))),
            read_timeout: None,
            deferred: 0,
            deferred_responses: Vec::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Limit how long a single response read may block.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Configured read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Get a handle for cancelling operations on this connection.
    ///
    /// The handle can be cloned and sent to other tasks.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle<T> {
        CancelHandle {
            writer: Arc::clone(&self.writer),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Whether the connection was closed locally, aborted or lost.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of deferred requests whose responses are still unread.
    #[must_use]
    pub fn pending_deferred(&self) -> usize {
        self.deferred
    }

    /// Take the responses collected for deferred requests.
    pub fn take_deferred_responses(&mut self) -> Vec<Response> {
        std::mem::take(&mut self.deferred_responses)
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send a request and flush it.
    pub async fn send(&mut self, request: &Request) -> Result<(), CodecError> {
        self.ensure_open()?;
        tracing::trace!(op = ?request.operation(), "sending request");
        let mut writer = self.writer.lock().await;
        writer.send(request.to_bytes()).await
    }

    /// Buffer a request whose response is read lazily.
    ///
    /// The request goes out with the next flushed request.
    pub async fn send_deferred(&mut self, request: &Request) -> Result<(), CodecError> {
        self.ensure_open()?;
        tracing::trace!(op = ?request.operation(), "deferring request");
        let mut writer = self.writer.lock().await;
        writer.feed(request.to_bytes()).await?;
        self.deferred += 1;
        Ok(())
    }

    /// Flush buffered requests.
    pub async fn flush(&mut self) -> Result<(), CodecError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await
    }

    /// Switch both directions to zlib compression.
    ///
    /// Call right after the handshake accepted compression, before any
    /// further request is sent.
    pub async fn enable_compression(&mut self) {
        self.reader.enable_compression();
        self.writer.lock().await.enable_compression();
    }

    /// Read the next response.
    ///
    /// Outstanding deferred responses are read first. The future is cancel
    /// safe: dropping it loses no frame.
    pub async fn read_response(&mut self) -> Result<Response, CodecError> {
        while self.deferred > 0 {
            let response = self.read_one().await?;
            self.deferred -= 1;
            self.deferred_responses.push(response);
        }
        self.read_one().await
    }

    /// Send a request and read its response.
    pub async fn call(&mut self, request: &Request) -> Result<Response, CodecError> {
        self.send(request).await?;
        self.read_response().await
    }

    /// Send `op_disconnect` and shut the transport down.
    ///
    /// Errors are ignored; the connection is closed afterwards either way.
    pub async fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.send(Request::Disconnect.to_bytes()).await {
            tracing::debug!(error = %e, "disconnect not delivered");
        }
        if let Err(e) = writer.close().await {
            tracing::debug!(error = %e, "shutdown failed");
        }
    }

    async fn read_one(&mut self) -> Result<Response, CodecError> {
        loop {
            let next = match self.read_timeout {
                Some(limit) => tokio::time::timeout(limit, self.reader.next())
                    .await
                    .map_err(|_| CodecError::ReadTimeout(limit))?,
                None => self.reader.next().await,
            };

            let mut frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    self.closed.store(true, Ordering::Release);
                    return Err(e);
                }
                None => {
                    self.closed.store(true, Ordering::Release);
                    return Err(CodecError::ConnectionClosed);
                }
            };

            match Response::decode(&mut frame)? {
                Response::Dummy => {
                    tracing::trace!("skipping keep-alive");
                }
                response => {
                    tracing::trace!(op = ?response.operation(), "received response");
                    return Ok(response);
                }
            }
        }
    }

    fn ensure_open(&self) -> Result<(), CodecError> {
        if self.is_closed() {
            return Err(CodecError::ConnectionClosed);
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("deferred", &self.deferred)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

/// Handle for cancelling operations on a connection.
///
/// This can be cloned and sent to other tasks.
pub struct CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    writer: Arc<Mutex<FrameWriter<WriteHalf<T>>>>,
    closed: Arc<AtomicBool>,
}

impl<T> CancelHandle<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send an `op_cancel` request.
    ///
    /// [`CancelKind::Abort`] also shuts the transport down and marks the
    /// connection closed.
    pub async fn cancel(&self, kind: CancelKind) -> Result<(), CodecError> {
        if self.is_closed() {
            return Err(CodecError::ConnectionClosed);
        }

        tracing::debug!(?kind, "sending cancel request");

        let mut writer = self.writer.lock().await;
        writer
            .send(Request::Cancel { kind: kind.code() }.to_bytes())
            .await?;

        if kind == CancelKind::Abort {
            self.closed.store(true, Ordering::Release);
            writer.close().await?;
        }
        Ok(())
    }

    /// Abort the connection.
    pub async fn abort(&self) -> Result<(), CodecError> {
        self.cancel(CancelKind::Abort).await
    }

    /// Whether the connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Clone for CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T> std::fmt::Debug for CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::framed::FrameStream;
    use fb_protocol::{GenericResponse, StatusVector, codes};
    use tokio::io::DuplexStream;

    async fn next_request(server: &mut FrameStream<DuplexStream>) -> Request {
        let mut frame = server.next().await.unwrap().unwrap();
        Request::decode(&mut frame).unwrap()
    }

    async fn reply(server: &mut FrameStream<DuplexStream>, response: Response) {
        server.send(response.to_bytes()).await.unwrap();
    }

    fn pair() -> (Connection<DuplexStream>, FrameStream<DuplexStream>) {
        let (client, server) = tokio::io::duplex(4096);
        (Connection::new(client), FrameStream::new(server))
    }

    #[tokio::test]
    async fn test_call() {
        let (mut conn, mut server) = pair();

        let server_task = tokio::spawn(async move {
            assert_eq!(
                next_request(&mut server).await,
                Request::AllocateStatement { database: 1 }
            );
            reply(&mut server, Response::Dummy).await;
            reply(&mut server, Response::Generic(GenericResponse::with_handle(5))).await;
            server
        });

        let response = conn
            .call(&Request::AllocateStatement { database: 1 })
            .await
            .unwrap();
        assert!(matches!(response, Response::Generic(r) if r.handle == 5));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_deferred_responses_are_read_first() {
        let (mut conn, mut server) = pair();

        let server_task = tokio::spawn(async move {
            assert!(matches!(
                next_request(&mut server).await,
                Request::FreeStatement { statement: 3, .. }
            ));
            assert!(matches!(next_request(&mut server).await, Request::Commit { .. }));
            reply(
                &mut server,
                Response::Generic(GenericResponse::failed(StatusVector::error(
                    codes::BAD_STMT_HANDLE,
                ))),
            )
            .await;
            reply(&mut server, Response::Generic(GenericResponse::ok())).await;
            server
        });

        conn.send_deferred(&Request::FreeStatement {
            statement: 3,
            option: 2,
        })
        .await
        .unwrap();
        assert_eq!(conn.pending_deferred(), 1);

        let response = conn.call(&Request::Commit { transaction: 1 }).await.unwrap();
        assert!(matches!(response, Response::Generic(r) if !r.status.is_error()));
        assert_eq!(conn.pending_deferred(), 0);

        let deferred = conn.take_deferred_responses();
        assert_eq!(deferred.len(), 1);
        assert!(matches!(&deferred[0], Response::Generic(r) if r.status.is_error()));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_while_reading() {
        let (mut conn, mut server) = pair();
        let cancel = conn.cancel_handle();

        let server_task = tokio::spawn(async move {
            assert!(matches!(next_request(&mut server).await, Request::Execute(_)));
            assert_eq!(
                next_request(&mut server).await,
                Request::Cancel {
                    kind: CancelKind::Raise.code()
                }
            );
            reply(
                &mut server,
                Response::Generic(GenericResponse::failed(StatusVector::error(
                    codes::CANCELLED,
                ))),
            )
            .await;
            server
        });

        conn.send(&Request::Execute(Default::default())).await.unwrap();
        let reading = tokio::spawn(async move { conn.read_response().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel(CancelKind::Raise).await.unwrap();

        let response = reading.await.unwrap().unwrap();
        assert!(matches!(response, Response::Generic(r) if r.status.contains(codes::CANCELLED)));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (mut conn, _server) = pair();
        conn.set_read_timeout(Some(Duration::from_millis(20)));

        let err = conn.read_response().await.unwrap_err();
        assert!(matches!(err, CodecError::ReadTimeout(_)));
        assert!(!err.is_fatal());
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_peer_close() {
        let (mut conn, server) = pair();
        drop(server);

        let err = conn.read_response().await.unwrap_err();
        assert!(matches!(err, CodecError::ConnectionClosed));
        assert!(conn.is_closed());
        assert!(matches!(
            conn.send(&Request::Dummy).await,
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_abort_closes() {
        let (conn, mut server) = pair();
        let cancel = conn.cancel_handle();

        cancel.abort().await.unwrap();
        assert!(conn.is_closed());
        assert_eq!(
            next_request(&mut server).await,
            Request::Cancel {
                kind: CancelKind::Abort.code()
            }
        );
        assert!(server.next().await.is_none());
        assert!(cancel.cancel(CancelKind::Raise).await.is_err());
    }

    #[tokio::test]
    async fn test_compressed_call_and_cancel() {
        let (mut conn, mut server) = pair();
        conn.enable_compression().await;
        server.enable_compression();
        let cancel = conn.cancel_handle();

        let server_task = tokio::spawn(async move {
            assert_eq!(next_request(&mut server).await, Request::Dummy);
            assert_eq!(
                next_request(&mut server).await,
                Request::Cancel {
                    kind: CancelKind::Raise.code()
                }
            );
            reply(&mut server, Response::Generic(GenericResponse::with_handle(9))).await;
            server
        });

        conn.send(&Request::Dummy).await.unwrap();
        cancel.cancel(CancelKind::Raise).await.unwrap();
        let response = conn.read_response().await.unwrap();
        assert!(matches!(response, Response::Generic(r) if r.handle == 9));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_exact_wire_bytes() {
        let mock = tokio_test::io::Builder::new()
            .write(&[0, 0, 0, 4, 0, 0, 0, 71])
            .read(&[0, 0, 0, 4, 0, 0, 0, 2])
            .build();
        let mut conn = Connection::new(mock);

        let response = conn.call(&Request::Dummy).await.unwrap();
        assert_eq!(response, Response::Exit);
    }
}
