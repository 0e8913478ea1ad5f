//! Asynchronous event notification.
//!
//! Events arrive on an auxiliary connection the server opens on request.
//! A reader task owns that socket and forwards every notification into a
//! queue; a dispatcher task drains the queue, updates the handle's counters
//! and invokes its callback. Neither task touches the attachment's
//! serialization lock, so callbacks may run while a request is in flight.
//! Callbacks run on the dispatcher task and must not block.
//!
//! Registrations are one-shot: after a notification the handle is no longer
//! queued and has to be queued again to hear about later events.
//!
//! ```rust,ignore
//! let handle = db.create_event_handle("ORDER_PLACED", |notice| {
//!     println!("{} fired {} time(s)", notice.name, notice.delta);
//! })?;
//! db.queue_event(&handle).await?;
//! // ... after the callback ran
//! let fired = db.count_events(&handle);
//! db.queue_event(&handle).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use fb_codec::FrameReader;
use fb_protocol::{EventBuffer, EventMessage, ProtocolError, Request, Response};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::attachment::Attachment;
use crate::error::{Error, Result};

static NEXT_LOCAL_ID: AtomicU32 = AtomicU32::new(1);

/// A delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNotice {
    /// Event name.
    pub name: String,
    /// Server-side count after the notification.
    pub count: u32,
    /// Occurrences since the count the handle was queued with.
    pub delta: u32,
}

type EventCallback = Arc<dyn Fn(&EventNotice) + Send + Sync>;

#[derive(Debug, Default)]
struct EventState {
    queued: bool,
    event_id: u32,
    /// Count the next registration is sent with.
    event_count: u32,
    /// Count of the latest notification.
    received_count: u32,
}

struct EventHandleInner {
    name: String,
    local_id: u32,
    callback: EventCallback,
    state: parking_lot::Mutex<EventState>,
}

/// Interest in one named event.
#[derive(Clone)]
pub struct EventHandle {
    inner: Arc<EventHandleInner>,
}

impl EventHandle {
    fn new(name: String, callback: EventCallback) -> Self {
        Self {
            inner: Arc::new(EventHandleInner {
                name,
                local_id: NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed),
                callback,
                state: parking_lot::Mutex::new(EventState::default()),
            }),
        }
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Client-side registration id.
    #[must_use]
    pub fn local_id(&self) -> u32 {
        self.inner.local_id
    }

    /// Server-side registration id of the current registration.
    #[must_use]
    pub fn event_id(&self) -> u32 {
        self.inner.state.lock().event_id
    }

    /// Whether a registration is outstanding.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.inner.state.lock().queued
    }

    /// Count as of the last [`Attachment::count_events`].
    #[must_use]
    pub fn event_count(&self) -> u32 {
        self.inner.state.lock().event_count
    }

    fn deliver(&self, count: u32) {
        let notice = {
            let mut state = self.inner.state.lock();
            state.queued = false;
            state.received_count = count;
            EventNotice {
                name: self.inner.name.clone(),
                count,
                delta: count.saturating_sub(state.event_count),
            }
        };
        tracing::debug!(event = %notice.name, count = notice.count, delta = notice.delta, "event notification");
        (self.inner.callback)(&notice);
    }
}

impl std::fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandle")
            .field("name", &self.inner.name)
            .field("local_id", &self.inner.local_id)
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}

type Registry = Arc<parking_lot::Mutex<HashMap<u32, EventHandle>>>;

/// The auxiliary connection and its tasks.
pub(crate) struct EventChannel {
    registry: Registry,
    reader: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl EventChannel {
    fn start(stream: TcpStream) -> Self {
        let registry: Registry = Arc::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_notifications(stream, tx));
        let dispatcher = tokio::spawn(dispatch(rx, Arc::clone(&registry)));
        Self {
            registry,
            reader,
            dispatcher,
        }
    }

    fn register(&self, handle: &EventHandle) {
        self.registry
            .lock()
            .insert(handle.local_id(), handle.clone());
    }

    fn unregister(&self, handle: &EventHandle) {
        self.registry.lock().remove(&handle.local_id());
    }

    pub(crate) fn close(self) {
        self.reader.abort();
        self.dispatcher.abort();
        tracing::debug!("event channel closed");
    }
}

async fn read_notifications(stream: TcpStream, tx: mpsc::UnboundedSender<EventMessage>) {
    let mut reader = FrameReader::new(stream);
    while let Some(frame) = reader.next().await {
        let mut frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "event connection failed");
                break;
            }
        };
        match Response::decode(&mut frame) {
            Ok(Response::Event(message)) => {
                if tx.send(message).is_err() {
                    break;
                }
            }
            Ok(Response::Exit) => break,
            Ok(Response::Dummy) => {}
            Ok(other) => {
                tracing::warn!(op = ?other.operation(), "unexpected message on event connection");
            }
            Err(e) => {
                tracing::warn!(error = %e, "undecodable event message");
                break;
            }
        }
    }
    tracing::debug!("event reader finished");
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<EventMessage>, registry: Registry) {
    while let Some(message) = rx.recv().await {
        // One-shot: the registration ends with its notification.
        let Some(handle) = registry.lock().remove(&message.local_id) else {
            tracing::debug!(local_id = message.local_id, "notification for unknown registration");
            continue;
        };
        let count = match EventBuffer::parse(&message.epb) {
            Ok(buffer) => buffer.count_of(handle.name()).unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, "malformed event buffer");
                handle.inner.state.lock().queued = false;
                continue;
            }
        };
        handle.deliver(count);
    }
}

impl Attachment {
    /// Create a handle for the event `name`; `callback` runs for each
    /// notification.
    pub fn create_event_handle<F>(&self, name: impl Into<String>, callback: F) -> Result<EventHandle>
    where
        F: Fn(&EventNotice) + Send + Sync + 'static,
    {
        self.ensure_attached()?;
        let name = name.into();
        if name.is_empty() || name.len() > u8::MAX as usize {
            return Err(Error::Protocol(ProtocolError::InvalidField("event name")));
        }
        Ok(EventHandle::new(name, Arc::new(callback)))
    }

    /// Register interest in the handle's event.
    ///
    /// Queuing a handle that is already queued does nothing. The first
    /// registration may be answered immediately with the current count.
    pub async fn queue_event(&self, handle: &EventHandle) -> Result<()> {
        self.ensure_attached()?;
        let count = {
            let mut state = handle.inner.state.lock();
            if state.queued {
                return Ok(());
            }
            state.queued = true;
            state.event_count
        };

        match self.register_event(handle, count).await {
            Ok(event_id) => {
                handle.inner.state.lock().event_id = event_id;
                tracing::debug!(event = handle.name(), event_id = event_id, "event queued");
                Ok(())
            }
            Err(e) => {
                handle.inner.state.lock().queued = false;
                if let Some(channel) = self.event_channel().as_ref() {
                    channel.unregister(handle);
                }
                Err(e)
            }
        }
    }

    async fn register_event(&self, handle: &EventHandle, count: u32) -> Result<u32> {
        let epb = EventBuffer::single(handle.name(), count).to_bytes()?;
        let mut exchange = self.lock().await?;

        let open = self.event_channel().is_some();
        if !open {
            let response = exchange
                .call(&Request::ConnectRequest {
                    database: self.handle(),
                })
                .await?;
            let port = match response.data.as_ref() {
                [high, low, ..] => u16::from_be_bytes([*high, *low]),
                _ => return Err(Error::Protocol(ProtocolError::InvalidField("event port"))),
            };
            let addr = format!("{}:{}", self.config().host, port);
            let stream = tokio::time::timeout(
                self.config().timeouts.connect_timeout,
                TcpStream::connect(&addr),
            )
            .await
            .map_err(|_| Error::ConnectTimeout)??;
            stream.set_nodelay(true)?;
            tracing::info!(addr = %addr, "event connection established");
            *self.event_channel() = Some(EventChannel::start(stream));
        }

        if let Some(channel) = self.event_channel().as_ref() {
            channel.register(handle);
        }
        let response = exchange
            .call(&Request::QueEvents {
                database: self.handle(),
                epb,
                local_id: handle.local_id(),
            })
            .await?;
        Ok(response.handle)
    }

    /// Withdraw the handle's registration. Does nothing when not queued.
    pub async fn cancel_event(&self, handle: &EventHandle) -> Result<()> {
        let event_id = {
            let state = handle.inner.state.lock();
            if !state.queued {
                return Ok(());
            }
            state.event_id
        };
        let mut exchange = self.lock().await?;
        exchange
            .call(&Request::CancelEvents {
                database: self.handle(),
                event_id,
            })
            .await?;
        drop(exchange);

        if let Some(channel) = self.event_channel().as_ref() {
            channel.unregister(handle);
        }
        handle.inner.state.lock().queued = false;
        tracing::debug!(event = handle.name(), event_id = event_id, "event cancelled");
        Ok(())
    }

    /// Apply the latest notification to the handle; returns the number of
    /// occurrences since the previous call.
    pub fn count_events(&self, handle: &EventHandle) -> u32 {
        let mut state = handle.inner.state.lock();
        let delta = state.received_count.saturating_sub(state.event_count);
        state.event_count = state.received_count;
        delta
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_handle(name: &str) -> (EventHandle, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let handle = EventHandle::new(
            name.to_string(),
            Arc::new(move |_: &EventNotice| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (handle, calls)
    }

    #[test]
    fn test_local_ids_are_unique() {
        let (a, _) = counting_handle("A");
        let (b, _) = counting_handle("A");
        assert_ne!(a.local_id(), b.local_id());
    }

    #[test]
    fn test_delivery_ends_registration() {
        let (handle, calls) = counting_handle("ORDER_PLACED");
        handle.inner.state.lock().queued = true;
        handle.deliver(3);
        assert!(!handle.is_queued());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.inner.state.lock().received_count, 3);
        assert_eq!(handle.event_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_uses_registry() {
        let (handle, calls) = counting_handle("ORDER_PLACED");
        let registry: Registry = Arc::default();
        registry.lock().insert(handle.local_id(), handle.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(EventMessage {
            database: 1,
            epb: EventBuffer::single("ORDER_PLACED", 2).to_bytes().unwrap(),
            local_id: handle.local_id(),
        })
        .unwrap();
        // Second notification for the same registration is dropped.
        tx.send(EventMessage {
            database: 1,
            epb: EventBuffer::single("ORDER_PLACED", 5).to_bytes().unwrap(),
            local_id: handle.local_id(),
        })
        .unwrap();
        drop(tx);

        dispatch(rx, Arc::clone(&registry)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.lock().is_empty());
        assert_eq!(handle.inner.state.lock().received_count, 2);
    }
}
