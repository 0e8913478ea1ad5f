//! Transaction support.
//!
//! A transaction is started from an [`Attachment`] with a
//! [`TransactionConfig`], which is serialized into a transaction parameter
//! buffer (TPB).
//!
//! ```text
//! Active --commit()/rollback()--> Committed/RolledBack (terminal)
//! Active --commit_retaining()/rollback_retaining()--> Active
//! Active --prepare()--> Prepared --commit()/rollback()--> terminal
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fb_protocol::info::{self, INFO_END, INFO_TRA_ID};
use fb_protocol::pb::{self, tpb};
use fb_protocol::{InlineBlob, ParameterBuffer, ProtocolError, Request, codes};

use crate::attachment::Attachment;
use crate::error::{Error, Result};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IsolationLevel {
    /// Snapshot of the database at transaction start.
    Concurrency,
    /// Snapshot with table-level locks on everything read.
    Consistency,
    /// Sees changes committed by other transactions.
    ReadCommitted {
        /// Read the latest committed record version instead of waiting for
        /// uncommitted ones.
        record_version: bool,
    },
    /// Read committed with statement-level read consistency.
    ReadCommittedReadConsistency,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        Self::ReadCommitted {
            record_version: true,
        }
    }
}

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Reads and writes.
    #[default]
    ReadWrite,
    /// Reads only.
    ReadOnly,
}

/// Behavior on lock conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWait {
    /// Wait for the conflicting transaction, optionally bounded.
    Wait {
        /// Longest wait; `None` waits indefinitely.
        lock_timeout: Option<Duration>,
    },
    /// Fail immediately.
    NoWait,
}

impl Default for LockWait {
    fn default() -> Self {
        Self::Wait { lock_timeout: None }
    }
}

/// Transaction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionConfig {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Access mode.
    pub access: AccessMode,
    /// Lock wait policy.
    pub lock_wait: LockWait,
}

impl TransactionConfig {
    /// Create a configuration with defaults: read committed with record
    /// versions, read-write, wait.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    #[must_use]
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Set the access mode.
    #[must_use]
    pub fn access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    /// Make the transaction read-only.
    #[must_use]
    pub fn read_only(self) -> Self {
        self.access(AccessMode::ReadOnly)
    }

    /// Set the lock wait policy.
    #[must_use]
    pub fn lock_wait(mut self, lock_wait: LockWait) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    /// Serialize into a transaction parameter buffer.
    pub fn to_tpb(&self) -> Result<Bytes> {
        let mut buffer = ParameterBuffer::new(pb::TPB_VERSION);
        buffer = match self.isolation {
            IsolationLevel::Concurrency => buffer.flag(tpb::CONCURRENCY),
            IsolationLevel::Consistency => buffer.flag(tpb::CONSISTENCY),
            IsolationLevel::ReadCommitted { record_version } => buffer
                .flag(tpb::READ_COMMITTED)
                .flag(if record_version {
                    tpb::REC_VERSION
                } else {
                    tpb::NO_REC_VERSION
                }),
            IsolationLevel::ReadCommittedReadConsistency => buffer
                .flag(tpb::READ_COMMITTED)
                .flag(tpb::READ_CONSISTENCY),
        };
        buffer = match self.access {
            AccessMode::ReadWrite => buffer.flag(tpb::WRITE),
            AccessMode::ReadOnly => buffer.flag(tpb::READ),
        };
        buffer = match self.lock_wait {
            LockWait::Wait { lock_timeout } => {
                let buffer = buffer.flag(tpb::WAIT);
                match lock_timeout {
                    Some(timeout) => {
                        let seconds = i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX);
                        buffer.int(tpb::LOCK_TIMEOUT, seconds)
                    }
                    None => buffer,
                }
            }
            LockWait::NoWait => buffer.flag(tpb::NOWAIT),
        };
        Ok(buffer.to_bytes()?)
    }
}

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Started and usable.
    Active,
    /// Prepared for two-phase commit; only commit or rollback remain.
    Prepared,
    /// Committed.
    Committed,
    /// Rolled back.
    RolledBack,
}

impl TransactionState {
    /// Whether the transaction has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

struct TransactionInner {
    attachment: Attachment,
    handle: u32,
    state: parking_lot::Mutex<TransactionState>,
    /// Blobs delivered inline with fetched rows, by blob id.
    inline_blobs: parking_lot::Mutex<HashMap<u64, InlineBlob>>,
}

/// A database transaction.
///
/// Cloning is cheap; statements and blobs hold clones. Once committed or
/// rolled back every clone fails further use with `isc_bad_trans_handle`.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    pub(crate) fn new(attachment: Attachment, handle: u32, state: TransactionState) -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                attachment,
                handle,
                state: parking_lot::Mutex::new(state),
                inline_blobs: parking_lot::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Server-assigned handle.
    #[must_use]
    pub fn handle(&self) -> u32 {
        self.inner.handle
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        *self.inner.state.lock()
    }

    /// Whether statements may run in this transaction.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// The attachment this transaction belongs to.
    #[must_use]
    pub fn attachment(&self) -> &Attachment {
        &self.inner.attachment
    }

    /// Commit and end the transaction.
    pub async fn commit(&self) -> Result<()> {
        self.finish(
            Request::Commit {
                transaction: self.handle(),
            },
            TransactionState::Committed,
        )
        .await
    }

    /// Roll back and end the transaction.
    pub async fn rollback(&self) -> Result<()> {
        self.finish(
            Request::Rollback {
                transaction: self.handle(),
            },
            TransactionState::RolledBack,
        )
        .await
    }

    /// Commit, keeping the transaction context open.
    pub async fn commit_retaining(&self) -> Result<()> {
        self.ensure_active()?;
        let mut exchange = self.inner.attachment.lock().await?;
        exchange
            .call(&Request::CommitRetaining {
                transaction: self.handle(),
            })
            .await?;
        drop(exchange);
        self.inner.inline_blobs.lock().clear();
        tracing::debug!(transaction = self.handle(), "committed (retaining)");
        Ok(())
    }

    /// Roll back, keeping the transaction context open.
    pub async fn rollback_retaining(&self) -> Result<()> {
        self.ensure_active()?;
        let mut exchange = self.inner.attachment.lock().await?;
        exchange
            .call(&Request::RollbackRetaining {
                transaction: self.handle(),
            })
            .await?;
        drop(exchange);
        self.inner.inline_blobs.lock().clear();
        tracing::debug!(transaction = self.handle(), "rolled back (retaining)");
        Ok(())
    }

    /// First phase of a two-phase commit.
    ///
    /// `message` is stored with the limbo transaction for recovery tools.
    pub async fn prepare(&self, message: Option<&[u8]>) -> Result<()> {
        self.ensure_active()?;
        let mut exchange = self.inner.attachment.lock().await?;
        exchange
            .call(&Request::Prepare {
                transaction: self.handle(),
                message: message.map(Bytes::copy_from_slice).unwrap_or_default(),
            })
            .await?;
        drop(exchange);
        *self.inner.state.lock() = TransactionState::Prepared;
        tracing::debug!(transaction = self.handle(), "prepared for two-phase commit");
        Ok(())
    }

    /// Query transaction information; returns the raw info clumplets.
    pub async fn transaction_info(&self, items: &[u8], max_length: u32) -> Result<Bytes> {
        self.ensure_open()?;
        let mut exchange = self.inner.attachment.lock().await?;
        let response = exchange
            .call(&Request::InfoTransaction {
                transaction: self.handle(),
                items: Bytes::copy_from_slice(items),
                buffer_length: max_length,
            })
            .await?;
        Ok(response.data)
    }

    /// Server-side transaction id, as used by [`Attachment::reconnect_transaction`].
    pub async fn transaction_id(&self) -> Result<u32> {
        let data = self.transaction_info(&[INFO_TRA_ID, INFO_END], 32).await?;
        let items = info::parse_info(&data)?;
        let item = info::find_item(&items, INFO_TRA_ID)
            .ok_or(ProtocolError::InvalidField("transaction id"))?;
        Ok(item.as_integer() as u32)
    }

    async fn finish(&self, request: Request, target: TransactionState) -> Result<()> {
        self.ensure_open()?;
        let mut exchange = self.inner.attachment.lock().await?;
        exchange.call(&request).await?;
        drop(exchange);

        *self.inner.state.lock() = target;
        self.inner.inline_blobs.lock().clear();
        self.inner.attachment.transaction_ended();
        tracing::debug!(transaction = self.handle(), state = ?target, "transaction ended");
        Ok(())
    }

    /// Fail unless statements and blobs may use the transaction.
    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.state() {
            TransactionState::Active => Ok(()),
            TransactionState::Prepared => Err(Error::state_with(
                codes::TRA_STATE,
                &[self.handle().to_string()],
            )),
            _ => Err(Error::state(codes::BAD_TRANS_HANDLE)),
        }
    }

    /// Fail once the transaction has ended.
    fn ensure_open(&self) -> Result<()> {
        if self.state().is_terminal() {
            return Err(Error::state(codes::BAD_TRANS_HANDLE));
        }
        Ok(())
    }

    pub(crate) fn cache_inline_blob(&self, blob: InlineBlob) {
        tracing::debug!(
            transaction = self.handle(),
            blob_id = blob.blob_id,
            length = blob.data.len(),
            "inline blob received"
        );
        self.inner.inline_blobs.lock().insert(blob.blob_id, blob);
    }

    pub(crate) fn inline_blob(&self, id: crate::blob::BlobId) -> Option<InlineBlob> {
        self.inner.inline_blobs.lock().get(&id.value()).cloned()
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("handle", &self.inner.handle)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn flags(config: TransactionConfig) -> Vec<u8> {
        let raw = config.to_tpb().unwrap();
        ParameterBuffer::parse(&raw)
            .unwrap()
            .items()
            .iter()
            .map(|item| item.tag)
            .collect()
    }

    #[test]
    fn test_default_tpb() {
        let raw = TransactionConfig::default().to_tpb().unwrap();
        assert_eq!(raw[0], pb::TPB_VERSION);
        assert_eq!(
            flags(TransactionConfig::default()),
            vec![tpb::READ_COMMITTED, tpb::REC_VERSION, tpb::WRITE, tpb::WAIT]
        );
    }

    #[test]
    fn test_snapshot_read_only_nowait() {
        let config = TransactionConfig::new()
            .isolation(IsolationLevel::Concurrency)
            .read_only()
            .lock_wait(LockWait::NoWait);
        assert_eq!(
            flags(config),
            vec![tpb::CONCURRENCY, tpb::READ, tpb::NOWAIT]
        );
    }

    #[test]
    fn test_lock_timeout() {
        let config = TransactionConfig::new()
            .isolation(IsolationLevel::ReadCommitted {
                record_version: false,
            })
            .lock_wait(LockWait::Wait {
                lock_timeout: Some(Duration::from_secs(5)),
            });
        let raw = config.to_tpb().unwrap();
        let parsed = ParameterBuffer::parse(&raw).unwrap();
        assert!(parsed.has(tpb::NO_REC_VERSION));
        assert_eq!(parsed.get(tpb::LOCK_TIMEOUT).unwrap().as_int(), 5);
    }

    #[test]
    fn test_read_consistency() {
        let config =
            TransactionConfig::new().isolation(IsolationLevel::ReadCommittedReadConsistency);
        assert_eq!(
            flags(config),
            vec![tpb::READ_COMMITTED, tpb::READ_CONSISTENCY, tpb::WRITE, tpb::WAIT]
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::RolledBack.is_terminal());
        assert!(!TransactionState::Prepared.is_terminal());
    }
}
