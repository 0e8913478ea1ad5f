//! Blob channel.
//!
//! A [`Blob`] is either an output blob, written once and identified by the id
//! the server assigns, or an input blob read from an existing id. The storage
//! kind of a blob (segmented or stream) is fixed when it is written and only
//! stream blobs support [`Blob::seek`].
//!
//! ```text
//! output: New --open--> Open --put_segment*--> Open --close--> Closed (id assigned)
//!                                                   --cancel--> Cancelled
//! input:  New --open--> Open --get_segment*/seek/length--> Open --close--> Closed --open--> Open
//! ```
//!
//! Small blobs may arrive inline with fetched rows; an input blob created for
//! such an id serves every read from the cached content without any round
//! trip.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let id = db.write_blob(&tx, b"hello", BlobConfig::stream()).await?;
//!
//! let mut blob = db.create_blob_for_input(&tx, id);
//! blob.open().await?;
//! blob.seek(1, SeekMode::Absolute).await?;
//! assert_eq!(blob.get_segment(4).await?, b"ello");
//! blob.close().await?;
//! ```

use bytes::{Bytes, BytesMut};
use fb_protocol::info::{
    self, INFO_BLOB_MAX_SEGMENT, INFO_BLOB_NUM_SEGMENTS, INFO_BLOB_TOTAL_LENGTH, INFO_BLOB_TYPE,
    INFO_END,
};
use fb_protocol::pb::{self, bpb};
use fb_protocol::segment::{self, MAX_SEGMENT_SIZE, SEGMENT_EOF};
use fb_protocol::{InfoBuilder, InlineBlob, ParameterBuffer, ProtocolError, Request, codes};

use crate::attachment::Attachment;
use crate::error::{Error, Result};
use crate::transaction::Transaction;

/// Segments sent per `op_batch_segments` message.
const SEGMENTS_PER_MESSAGE: usize = 16;

/// Blob id as stored in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlobId(u64);

impl BlobId {
    /// Create from the 64-bit value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Create from the quad halves.
    #[must_use]
    pub const fn from_quad(high: u32, low: u32) -> Self {
        Self(((high as u64) << 32) | low as u64)
    }

    /// 64-bit value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// High half of the quad.
    #[must_use]
    pub const fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Low half of the quad.
    #[must_use]
    pub const fn low(self) -> u32 {
        self.0 as u32
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.high(), self.low())
    }
}

/// Server-side storage of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlobStorage {
    /// Sequence of length-prefixed segments; no random access.
    #[default]
    Segmented,
    /// Contiguous bytes; supports seek.
    Stream,
}

impl BlobStorage {
    fn from_info(value: i64) -> Self {
        if value == i64::from(bpb::TYPE_STREAM) {
            Self::Stream
        } else {
            Self::Segmented
        }
    }
}

/// Parameters for new output blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlobConfig {
    /// Requested storage kind.
    pub storage: BlobStorage,
}

impl BlobConfig {
    /// Segmented storage.
    #[must_use]
    pub fn segmented() -> Self {
        Self {
            storage: BlobStorage::Segmented,
        }
    }

    /// Stream storage.
    #[must_use]
    pub fn stream() -> Self {
        Self {
            storage: BlobStorage::Stream,
        }
    }

    /// Serialize into a blob parameter buffer.
    pub fn to_bpb(&self) -> Result<Bytes> {
        let kind = match self.storage {
            BlobStorage::Segmented => bpb::TYPE_SEGMENTED,
            BlobStorage::Stream => bpb::TYPE_STREAM,
        };
        Ok(ParameterBuffer::new(pb::BPB_VERSION)
            .byte(bpb::TYPE, kind)
            .to_bytes()?)
    }
}

/// Origin of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// From the start.
    Absolute,
    /// From the current position.
    Relative,
    /// From the end.
    FromEnd,
}

impl SeekMode {
    fn code(self) -> u32 {
        match self {
            Self::Absolute => segment::SEEK_ABSOLUTE,
            Self::Relative => segment::SEEK_RELATIVE,
            Self::FromEnd => segment::SEEK_FROM_END,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlobState {
    New,
    Open { handle: u32 },
    Closed,
    Cancelled,
}

#[derive(Debug)]
enum BlobKind {
    Output {
        config: BlobConfig,
        id: Option<BlobId>,
    },
    Input {
        id: BlobId,
        storage: Option<BlobStorage>,
        length: Option<u64>,
    },
    Inline(InlineBlob),
}

/// An open or openable blob.
#[derive(Debug)]
pub struct Blob {
    attachment: Attachment,
    transaction: Transaction,
    kind: BlobKind,
    state: BlobState,
    eof: bool,
    position: u64,
}

impl Blob {
    pub(crate) fn output(attachment: Attachment, transaction: Transaction, config: BlobConfig) -> Self {
        Self::with_kind(attachment, transaction, BlobKind::Output { config, id: None })
    }

    pub(crate) fn input(attachment: Attachment, transaction: Transaction, id: BlobId) -> Self {
        Self::with_kind(
            attachment,
            transaction,
            BlobKind::Input {
                id,
                storage: None,
                length: None,
            },
        )
    }

    pub(crate) fn inline(attachment: Attachment, transaction: Transaction, blob: InlineBlob) -> Self {
        Self::with_kind(attachment, transaction, BlobKind::Inline(blob))
    }

    fn with_kind(attachment: Attachment, transaction: Transaction, kind: BlobKind) -> Self {
        Self {
            attachment,
            transaction,
            kind,
            state: BlobState::New,
            eof: true,
            position: 0,
        }
    }

    /// Whether this blob is written rather than read.
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self.kind, BlobKind::Output { .. })
    }

    /// Whether the content is served from a copy delivered with a fetch.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self.kind, BlobKind::Inline(_))
    }

    /// Whether the blob is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, BlobState::Open { .. })
    }

    /// Whether no more data can be read or written.
    ///
    /// True before open and after close or cancel; for input blobs also
    /// once all content has been read.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Blob id.
    ///
    /// For output blobs the id is only available after a successful
    /// [`Blob::close`].
    #[must_use]
    pub fn id(&self) -> Option<BlobId> {
        match &self.kind {
            BlobKind::Output { id, .. } => match self.state {
                BlobState::Closed => *id,
                _ => None,
            },
            BlobKind::Input { id, .. } => Some(*id),
            BlobKind::Inline(blob) => Some(BlobId::new(blob.blob_id)),
        }
    }

    /// Storage kind, once known.
    #[must_use]
    pub fn storage(&self) -> Option<BlobStorage> {
        match &self.kind {
            BlobKind::Output { config, .. } => Some(config.storage),
            BlobKind::Input { storage, .. } => *storage,
            BlobKind::Inline(blob) => Some(if blob.stream {
                BlobStorage::Stream
            } else {
                BlobStorage::Segmented
            }),
        }
    }

    /// Read position in bytes.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Open the blob.
    ///
    /// Output blobs are created on the server and may be opened once.
    /// Input blobs may be reopened after close, restarting at position 0.
    pub async fn open(&mut self) -> Result<()> {
        self.transaction.ensure_active()?;
        match (&self.kind, self.state) {
            (BlobKind::Output { .. }, BlobState::New) => {}
            (BlobKind::Output { .. }, _) => return Err(Error::state(codes::SEGSTR_NO_OP)),
            (_, BlobState::Open { .. }) => return Err(Error::state(codes::NO_SEGSTR_CLOSE)),
            (BlobKind::Inline(blob), _) => {
                self.attachment.ensure_attached()?;
                tracing::debug!(blob_id = blob.blob_id, "inline blob opened");
                self.state = BlobState::Open { handle: 0 };
                self.position = 0;
                self.eof = false;
                return Ok(());
            }
            (BlobKind::Input { .. }, _) => {}
        }

        let transaction = self.transaction.handle();
        let mut exchange = self.attachment.lock().await?;
        let handle = match &mut self.kind {
            BlobKind::Output { config, id } => {
                let response = exchange
                    .call(&Request::CreateBlob {
                        transaction,
                        bpb: config.to_bpb()?,
                    })
                    .await?;
                *id = Some(BlobId::new(response.blob_id));
                tracing::debug!(blob = response.handle, storage = ?config.storage, "output blob created");
                response.handle
            }
            BlobKind::Input {
                id,
                storage,
                length,
            } => {
                let response = exchange
                    .call(&Request::OpenBlob {
                        transaction,
                        blob_id: id.value(),
                        bpb: Bytes::new(),
                    })
                    .await?;
                if let Ok(items) = info::parse_info(&response.data) {
                    *storage = info::find_item(&items, INFO_BLOB_TYPE)
                        .map(|item| BlobStorage::from_info(item.as_integer()));
                    *length = info::find_item(&items, INFO_BLOB_TOTAL_LENGTH)
                        .map(|item| item.as_integer() as u64);
                }
                tracing::debug!(blob = response.handle, blob_id = %id, storage = ?storage, "input blob opened");
                response.handle
            }
            BlobKind::Inline(_) => 0,
        };
        drop(exchange);

        self.state = BlobState::Open { handle };
        self.position = 0;
        self.eof = false;
        Ok(())
    }

    /// Read up to `max_length` bytes.
    ///
    /// Returns fewer bytes at a segment boundary or the end of the blob; an
    /// empty result with [`Blob::is_eof`] set means the blob is exhausted.
    pub async fn get_segment(&mut self, max_length: usize) -> Result<Bytes> {
        if self.is_output() {
            return Err(Error::state(codes::SEGSTR_NO_READ));
        }
        let handle = self.open_handle()?;
        self.transaction.ensure_active()?;
        if self.eof || max_length == 0 {
            return Ok(Bytes::new());
        }

        if let BlobKind::Inline(blob) = &self.kind {
            self.attachment.ensure_attached()?;
            let start = (self.position as usize).min(blob.data.len());
            let end = start
                .saturating_add(max_length.min(MAX_SEGMENT_SIZE))
                .min(blob.data.len());
            let data = blob.data.slice(start..end);
            self.position = end as u64;
            self.eof = end == blob.data.len();
            return Ok(data);
        }

        let max_length = u32::try_from(max_length).unwrap_or(u32::MAX);
        let mut exchange = self.attachment.lock().await?;
        let response = exchange
            .call(&Request::GetSegment {
                blob: handle,
                max_length,
            })
            .await?;
        drop(exchange);

        let pieces = segment::unpack(&response.data)?;
        let data = match pieces.len() {
            0 => Bytes::new(),
            1 => pieces.into_iter().next().unwrap_or_default(),
            _ => {
                let mut buf = BytesMut::new();
                for piece in pieces {
                    buf.extend_from_slice(&piece);
                }
                buf.freeze()
            }
        };
        self.position += data.len() as u64;
        if response.handle == SEGMENT_EOF {
            self.eof = true;
        }
        Ok(data)
    }

    /// Append `data`.
    ///
    /// The data is split into segments of at most 65535 bytes which are
    /// sent together.
    pub async fn put_segment(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_output() {
            return Err(Error::state(codes::SEGSTR_NO_WRITE));
        }
        let handle = self.open_handle()?;
        self.transaction.ensure_active()?;
        if data.is_empty() {
            return Ok(());
        }

        let mut exchange = self.attachment.lock().await?;
        for chunk in data.chunks(MAX_SEGMENT_SIZE * SEGMENTS_PER_MESSAGE) {
            exchange
                .call(&Request::BatchSegments {
                    blob: handle,
                    data: segment::pack(chunk),
                })
                .await?;
        }
        drop(exchange);
        self.position += data.len() as u64;
        Ok(())
    }

    /// Move the read position; returns the new position.
    ///
    /// Only stream blobs can seek; segmented blobs fail with
    /// `isc_bad_segstr_type` and stay usable.
    pub async fn seek(&mut self, offset: i64, mode: SeekMode) -> Result<u64> {
        if self.is_output() {
            return Err(Error::state(codes::SEGSTR_NO_OP));
        }
        let handle = self.open_handle()?;
        self.transaction.ensure_active()?;

        if let BlobKind::Inline(blob) = &self.kind {
            if !blob.stream {
                return Err(Error::state(codes::BAD_SEGSTR_TYPE));
            }
            let len = blob.data.len() as i64;
            let base = match mode {
                SeekMode::Absolute => 0,
                SeekMode::Relative => self.position as i64,
                SeekMode::FromEnd => len,
            };
            let target = base.saturating_add(offset).clamp(0, len);
            self.position = target as u64;
            self.eof = false;
            return Ok(self.position);
        }

        let mut exchange = self.attachment.lock().await?;
        let response = exchange
            .call(&Request::SeekBlob {
                blob: handle,
                mode: mode.code(),
                offset,
            })
            .await?;
        drop(exchange);
        self.position = response.blob_id;
        self.eof = false;
        Ok(self.position)
    }

    /// Total length in bytes.
    pub async fn length(&mut self) -> Result<u64> {
        if let BlobKind::Inline(blob) = &self.kind {
            self.open_handle()?;
            return Ok(blob.data.len() as u64);
        }
        let data = self
            .blob_info(&[INFO_BLOB_TOTAL_LENGTH, INFO_END], 32)
            .await?;
        let items = info::parse_info(&data)?;
        let item = info::find_item(&items, INFO_BLOB_TOTAL_LENGTH)
            .ok_or(ProtocolError::InvalidField("blob length"))?;
        let length = item.as_integer() as u64;
        if let BlobKind::Input { length: cached, .. } = &mut self.kind {
            *cached = Some(length);
        }
        Ok(length)
    }

    /// Query blob information; returns the raw info clumplets.
    pub async fn blob_info(&mut self, items: &[u8], max_length: u32) -> Result<Bytes> {
        let handle = self.open_handle()?;
        self.transaction.ensure_active()?;

        if let BlobKind::Inline(blob) = &self.kind {
            return Ok(inline_info(blob, items));
        }

        let mut exchange = self.attachment.lock().await?;
        let response = exchange
            .call(&Request::InfoBlob {
                blob: handle,
                items: Bytes::copy_from_slice(items),
                buffer_length: max_length,
            })
            .await?;
        Ok(response.data)
    }

    /// Close the blob. Closing a blob that is not open does nothing.
    ///
    /// Closing an output blob commits its content and makes its id
    /// available.
    pub async fn close(&mut self) -> Result<()> {
        let BlobState::Open { handle } = self.state else {
            return Ok(());
        };

        if !self.is_inline() {
            let mut exchange = self.attachment.lock().await?;
            exchange.call(&Request::CloseBlob { blob: handle }).await?;
        }
        self.state = BlobState::Closed;
        self.eof = true;
        tracing::debug!(blob = handle, id = ?self.id(), "blob closed");
        Ok(())
    }

    /// Discard the blob. Written content of an output blob is dropped and
    /// no id is assigned; an input blob is closed.
    pub async fn cancel(&mut self) -> Result<()> {
        if !self.is_output() {
            return self.close().await;
        }
        let BlobState::Open { handle } = self.state else {
            return Ok(());
        };
        let mut exchange = self.attachment.lock().await?;
        exchange.call(&Request::CancelBlob { blob: handle }).await?;
        drop(exchange);

        self.state = BlobState::Cancelled;
        self.eof = true;
        if let BlobKind::Output { id, .. } = &mut self.kind {
            *id = None;
        }
        tracing::debug!(blob = handle, "output blob cancelled");
        Ok(())
    }

    /// Read the whole blob, opening it if needed, and close it.
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        if !self.is_open() {
            self.open().await?;
        }
        let chunk = self.attachment.config().blob_buffer_size;
        let mut buf = BytesMut::new();
        while !self.eof {
            let data = self.get_segment(chunk).await?;
            buf.extend_from_slice(&data);
        }
        self.close().await?;
        Ok(buf.freeze())
    }

    fn open_handle(&self) -> Result<u32> {
        match self.state {
            BlobState::Open { handle } => Ok(handle),
            _ => Err(Error::state(codes::BAD_SEGSTR_HANDLE)),
        }
    }
}

fn inline_info(blob: &InlineBlob, items: &[u8]) -> Bytes {
    let mut builder = InfoBuilder::new();
    for &item in items {
        builder = match item {
            INFO_BLOB_NUM_SEGMENTS => builder.int(item, blob.segment_count as i32),
            INFO_BLOB_MAX_SEGMENT => {
                builder.int(item, blob.data.len().min(MAX_SEGMENT_SIZE) as i32)
            }
            INFO_BLOB_TOTAL_LENGTH => builder.long(item, blob.data.len() as i64),
            INFO_BLOB_TYPE => builder.int(item, i32::from(blob.stream)),
            _ => builder,
        };
    }
    builder.finish()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_id_quad() {
        let id = BlobId::from_quad(0x0000_0081, 0x0000_0002);
        assert_eq!(id.value(), 0x0000_0081_0000_0002);
        assert_eq!(id.high(), 0x81);
        assert_eq!(id.low(), 2);
        assert_eq!(id.to_string(), "129:2");
    }

    #[test]
    fn test_bpb() {
        let raw = BlobConfig::stream().to_bpb().unwrap();
        let parsed = ParameterBuffer::parse(&raw).unwrap();
        assert_eq!(parsed.version(), pb::BPB_VERSION);
        assert_eq!(
            parsed.get(bpb::TYPE).unwrap().as_int(),
            i64::from(bpb::TYPE_STREAM)
        );
        assert_eq!(BlobConfig::default().storage, BlobStorage::Segmented);
    }

    #[test]
    fn test_inline_info_matches_content() {
        let blob = InlineBlob {
            transaction: 1,
            blob_id: 9,
            stream: true,
            segment_count: 1,
            data: Bytes::from_static(b"inline content"),
        };
        let raw = inline_info(&blob, &[INFO_BLOB_TOTAL_LENGTH, INFO_BLOB_TYPE, INFO_END]);
        let items = info::parse_info(&raw).unwrap();
        assert_eq!(
            info::find_item(&items, INFO_BLOB_TOTAL_LENGTH)
                .unwrap()
                .as_integer(),
            14
        );
        assert_eq!(info::find_item(&items, INFO_BLOB_TYPE).unwrap().as_integer(), 1);
    }
}
