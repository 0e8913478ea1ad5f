//! Service manager attachments.
//!
//! The service manager runs administrative tasks (backup, statistics, user
//! management) on the server. A [`ServiceAttachment`] negotiates the
//! protocol like a database attachment and follows the same lifecycle rules.

use bytes::Bytes;
use fb_codec::Connection;
use fb_protocol::info::{self, INFO_END, INFO_SVC_LINE, INFO_SVC_SERVER_VERSION};
use fb_protocol::pb::{self, spb};
use fb_protocol::{NegotiatedProtocol, ParameterBuffer, Request, codes};
use tokio::net::TcpStream;

use crate::attachment::{AttachmentState, connect, expect_generic};
use crate::config::Config;
use crate::error::{Error, Result};

/// Name of the service manager endpoint.
pub const SERVICE_MANAGER: &str = "service_mgr";

const DEFAULT_QUERY_SIZE: u32 = 1024;

#[derive(Debug, Default)]
struct ServiceState {
    lifecycle: AttachmentState,
    handle: u32,
    protocol: Option<NegotiatedProtocol>,
}

/// A session with the service manager.
pub struct ServiceAttachment {
    config: Config,
    channel: tokio::sync::Mutex<Option<Connection<TcpStream>>>,
    state: parking_lot::Mutex<ServiceState>,
}

impl ServiceAttachment {
    /// Create an unattached service attachment; `config.database` is not
    /// used and may be empty.
    pub fn new(config: Config) -> Result<Self> {
        if config.port == 0 {
            return Err(Error::Config("port must not be zero".into()));
        }
        if config.protocol_revisions.is_empty() {
            return Err(Error::Config(
                "at least one protocol revision must be offered".into(),
            ));
        }
        Ok(Self {
            config,
            channel: tokio::sync::Mutex::new(None),
            state: parking_lot::Mutex::new(ServiceState::default()),
        })
    }

    /// Connect and attach to the service manager.
    pub async fn attach(&self) -> Result<()> {
        let mut slot = self.channel.lock().await;
        self.ensure_state(AttachmentState::Unattached)?;

        let (mut conn, protocol) = connect(&self.config, SERVICE_MANAGER).await?;
        let spb = ParameterBuffer::new(pb::SPB_VERSION)
            .string(spb::USER_NAME, &self.config.user)
            .string(spb::PASSWORD, &self.config.password)
            .to_bytes()?;
        let response = conn
            .call(&Request::ServiceAttach {
                service: SERVICE_MANAGER.to_string(),
                spb,
            })
            .await?;
        let response = match expect_generic(response) {
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

        tracing::info!(handle = response.handle, revision = %protocol.revision, "service attached");
        {
            let mut state = self.state.lock();
            state.lifecycle = AttachmentState::Attached;
            state.handle = response.handle;
            state.protocol = Some(protocol);
        }
        *slot = Some(conn);
        Ok(())
    }

    /// Start a service action described by a service parameter buffer.
    pub async fn start(&self, spb: Bytes) -> Result<()> {
        let handle = self.handle();
        self.call(Request::ServiceStart {
            service: handle,
            spb,
        })
        .await?;
        tracing::debug!(service = handle, "service action started");
        Ok(())
    }

    /// Query the service; returns the raw info clumplets.
    pub async fn query(&self, items: &[u8], max_length: u32) -> Result<Bytes> {
        let response = self
            .call(Request::ServiceInfo {
                service: self.handle(),
                items: Bytes::copy_from_slice(items),
                buffer_length: max_length,
            })
            .await?;
        Ok(response)
    }

    /// Server version reported by the service manager.
    pub async fn server_version(&self) -> Result<Option<String>> {
        let data = self
            .query(&[INFO_SVC_SERVER_VERSION, INFO_END], DEFAULT_QUERY_SIZE)
            .await?;
        let items = info::parse_info(&data)?;
        Ok(info::find_item(&items, INFO_SVC_SERVER_VERSION).map(|item| item.as_string()))
    }

    /// Next line of output of the running action; `None` once it is done.
    pub async fn next_line(&self) -> Result<Option<String>> {
        let data = self
            .query(&[INFO_SVC_LINE, INFO_END], DEFAULT_QUERY_SIZE)
            .await?;
        let items = info::parse_info(&data)?;
        Ok(info::find_item(&items, INFO_SVC_LINE)
            .map(|item| item.as_string())
            .filter(|line| !line.is_empty()))
    }

    /// Detach from the service manager.
    pub async fn detach(&self) -> Result<()> {
        let mut slot = self.channel.lock().await;
        self.ensure_state(AttachmentState::Attached)?;
        let handle = self.handle();

        let result = match slot.as_mut() {
            Some(conn) => match conn.call(&Request::ServiceDetach { service: handle }).await {
                Ok(response) => expect_generic(response).and_then(|r| {
                    if r.status.is_error() {
                        Err(Error::from_status(r.status))
                    } else {
                        Ok(())
                    }
                }),
                Err(e) => Err(e.into()),
            },
            None => Err(Error::ConnectionClosed),
        };
        if let Some(mut conn) = slot.take() {
            conn.close().await;
        }
        self.state.lock().lifecycle = AttachmentState::Detached;
        tracing::info!(handle = handle, "service detached");
        result
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AttachmentState {
        self.state.lock().lifecycle
    }

    /// Server-assigned handle, 0 until attached.
    #[must_use]
    pub fn handle(&self) -> u32 {
        self.state.lock().handle
    }

    /// Negotiated protocol, once attached.
    #[must_use]
    pub fn protocol(&self) -> Option<NegotiatedProtocol> {
        self.state.lock().protocol
    }

    async fn call(&self, request: Request) -> Result<Bytes> {
        let mut slot = self.channel.lock().await;
        self.ensure_state(AttachmentState::Attached)?;
        let conn = slot.as_mut().ok_or(Error::ConnectionClosed)?;
        tracing::debug!(op = ?request.operation(), "service request");
        let response = match conn.call(&request).await {
            Ok(response) => expect_generic(response)?,
            Err(e) => {
                if e.is_fatal() {
                    self.state.lock().lifecycle = AttachmentState::Detached;
                }
                return Err(e.into());
            }
        };
        if response.status.is_error() {
            return Err(Error::from_status(response.status));
        }
        Ok(response.data)
    }

    fn ensure_state(&self, expected: AttachmentState) -> Result<()> {
        let current = self.state();
        if current == expected {
            return Ok(());
        }
        let message = match current {
            AttachmentState::Unattached => "service not attached",
            AttachmentState::Attached => "service already attached",
            AttachmentState::Detached => "service attachment is detached",
        };
        Err(Error::InvalidState {
            code: codes::BAD_SVC_HANDLE,
            message: message.into(),
        })
    }
}

impl std::fmt::Debug for ServiceAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ServiceAttachment")
            .field("host", &self.config.host)
            .field("state", &state.lifecycle)
            .field("handle", &state.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_use_before_attach_is_state_error() {
        let service = ServiceAttachment::new(Config::new()).unwrap();
        assert_eq!(service.state(), AttachmentState::Unattached);
        let err = service.query(&[INFO_END], 16).await.unwrap_err();
        assert!(err.is_state());
        assert_eq!(err.error_code(), Some(codes::BAD_SVC_HANDLE));
        assert!(service.detach().await.unwrap_err().is_state());
    }

    #[test]
    fn test_rejects_zero_port() {
        assert!(ServiceAttachment::new(Config::new().port(0)).is_err());
    }
}
