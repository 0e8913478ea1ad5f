//! Information request items and response clumplets.
//!
//! Info responses are a sequence of `item (u8)`, `length (u16 LE)`, `data`
//! entries terminated by [`INFO_END`]. Integers inside are little-endian
//! with variable width.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// End of an info buffer.
pub const INFO_END: u8 = 1;
/// The response buffer was too small.
pub const INFO_TRUNCATED: u8 = 2;
/// Request item unknown to the server.
pub const INFO_ERROR: u8 = 3;

/// Database page size.
pub const INFO_DB_PAGE_SIZE: u8 = 14;
/// Server implementation version string.
pub const INFO_DB_SERVER_VERSION: u8 = 103;
/// Database SQL dialect.
pub const INFO_DB_SQL_DIALECT: u8 = 62;

/// Number of segments in a blob.
pub const INFO_BLOB_NUM_SEGMENTS: u8 = 4;
/// Largest segment of a blob.
pub const INFO_BLOB_MAX_SEGMENT: u8 = 5;
/// Total blob length.
pub const INFO_BLOB_TOTAL_LENGTH: u8 = 6;
/// Blob storage kind: 0 segmented, 1 stream.
pub const INFO_BLOB_TYPE: u8 = 7;

/// Transaction id.
pub const INFO_TRA_ID: u8 = 4;

/// Statement type.
pub const INFO_SQL_STMT_TYPE: u8 = 21;
/// Execution plan.
pub const INFO_SQL_GET_PLAN: u8 = 22;
/// Affected record counts.
pub const INFO_SQL_RECORDS: u8 = 23;

/// Service manager version.
pub const INFO_SVC_SERVER_VERSION: u8 = 55;
/// Next line of service output.
pub const INFO_SVC_LINE: u8 = 62;

/// A single item of an info response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoItem {
    /// Item code.
    pub code: u8,
    /// Raw value.
    pub data: Bytes,
}

impl InfoItem {
    /// Value as a little-endian integer.
    #[must_use]
    pub fn as_integer(&self) -> i64 {
        vax_integer(&self.data)
    }

    /// Value as a UTF-8 string, lossy.
    #[must_use]
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Parse an info response buffer.
///
/// Parsing stops at [`INFO_END`]. A [`INFO_TRUNCATED`] marker is returned as
/// an item so the caller can retry with a larger buffer.
pub fn parse_info(buffer: &Bytes) -> Result<Vec<InfoItem>, ProtocolError> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < buffer.len() {
        let code = buffer[pos];
        pos += 1;
        if code == INFO_END {
            break;
        }
        if code == INFO_TRUNCATED {
            items.push(InfoItem {
                code,
                data: Bytes::new(),
            });
            break;
        }
        if pos + 2 > buffer.len() {
            return Err(ProtocolError::UnexpectedEof);
        }
        let len = u16::from_le_bytes([buffer[pos], buffer[pos + 1]]) as usize;
        pos += 2;
        if pos + len > buffer.len() {
            return Err(ProtocolError::UnexpectedEof);
        }
        items.push(InfoItem {
            code,
            data: buffer.slice(pos..pos + len),
        });
        pos += len;
    }
    Ok(items)
}

/// Find one item in a parsed response.
#[must_use]
pub fn find_item(items: &[InfoItem], code: u8) -> Option<&InfoItem> {
    items.iter().find(|item| item.code == code)
}

/// Decode a little-endian integer of 0 to 8 bytes.
#[must_use]
pub fn vax_integer(data: &[u8]) -> i64 {
    let len = data.len().min(8);
    if len == 0 {
        return 0;
    }
    let mut value: i64 = 0;
    for (shift, byte) in data[..len].iter().enumerate() {
        value |= i64::from(*byte) << (8 * shift);
    }
    // Sign-extend from the top byte actually present.
    let unused = 64 - 8 * len as u32;
    (value << unused) >> unused
}

/// Builder for info response buffers.
#[derive(Debug, Default)]
pub struct InfoBuilder {
    buf: BytesMut,
}

impl InfoBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes for `code`.
    #[must_use]
    pub fn bytes(mut self, code: u8, data: &[u8]) -> Self {
        self.buf.put_u8(code);
        self.buf.put_u16_le(data.len().min(u16::MAX as usize) as u16);
        self.buf.put_slice(&data[..data.len().min(u16::MAX as usize)]);
        self
    }

    /// Append a 4-byte little-endian integer.
    #[must_use]
    pub fn int(self, code: u8, value: i32) -> Self {
        self.bytes(code, &value.to_le_bytes())
    }

    /// Append an 8-byte little-endian integer.
    #[must_use]
    pub fn long(self, code: u8, value: i64) -> Self {
        self.bytes(code, &value.to_le_bytes())
    }

    /// Append a string.
    #[must_use]
    pub fn string(self, code: u8, value: &str) -> Self {
        self.bytes(code, value.as_bytes())
    }

    /// Terminate and return the buffer.
    #[must_use]
    pub fn finish(mut self) -> Bytes {
        self.buf.put_u8(INFO_END);
        self.buf.freeze()
    }
}
