//! Parameter buffers (database, transaction, blob, service and event).
//!
//! A parameter buffer is a version byte followed by `tag (u8)`,
//! `length (u8)`, `value` items. Flags are items with an empty value.
//! The event parameter buffer has its own layout, see [`EventBuffer`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Database parameter buffer version.
pub const DPB_VERSION: u8 = 1;
/// Transaction parameter buffer version.
pub const TPB_VERSION: u8 = 3;
/// Blob parameter buffer version.
pub const BPB_VERSION: u8 = 1;
/// Service parameter buffer version.
pub const SPB_VERSION: u8 = 2;
/// Event parameter buffer version.
pub const EPB_VERSION: u8 = 1;

/// Database parameter tags.
pub mod dpb {
    /// Page size of a new database.
    pub const PAGE_SIZE: u8 = 4;
    /// User name.
    pub const USER_NAME: u8 = 28;
    /// Password.
    pub const PASSWORD: u8 = 29;
    /// Connection character set.
    pub const LC_CTYPE: u8 = 48;
    /// SQL role.
    pub const SQL_ROLE_NAME: u8 = 60;
    /// SQL dialect.
    pub const SQL_DIALECT: u8 = 63;
    /// Client process name.
    pub const PROCESS_NAME: u8 = 74;
}

/// Transaction parameter tags.
pub mod tpb {
    /// Table stability.
    pub const CONSISTENCY: u8 = 1;
    /// Snapshot.
    pub const CONCURRENCY: u8 = 2;
    /// Wait on lock conflicts.
    pub const WAIT: u8 = 6;
    /// Fail immediately on lock conflicts.
    pub const NOWAIT: u8 = 7;
    /// Read-only access.
    pub const READ: u8 = 8;
    /// Read-write access.
    pub const WRITE: u8 = 9;
    /// Read committed.
    pub const READ_COMMITTED: u8 = 15;
    /// Read committed, see the latest committed version.
    pub const REC_VERSION: u8 = 17;
    /// Read committed, wait for uncommitted versions.
    pub const NO_REC_VERSION: u8 = 18;
    /// Lock wait timeout in seconds.
    pub const LOCK_TIMEOUT: u8 = 21;
    /// Read committed with statement-level read consistency.
    pub const READ_CONSISTENCY: u8 = 22;
}

/// Blob parameter tags.
pub mod bpb {
    /// Storage kind.
    pub const TYPE: u8 = 1;
    /// Segmented storage.
    pub const TYPE_SEGMENTED: u8 = 0;
    /// Stream storage.
    pub const TYPE_STREAM: u8 = 1;
}

/// Service parameter tags.
pub mod spb {
    /// User name.
    pub const USER_NAME: u8 = 28;
    /// Password.
    pub const PASSWORD: u8 = 29;
    /// Action to start.
    pub const ACTION: u8 = 1;
    /// Database the action applies to.
    pub const DBNAME: u8 = 106;
}

/// One item of a parameter buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterItem {
    /// Tag.
    pub tag: u8,
    /// Value, empty for flags.
    pub value: Bytes,
}

impl ParameterItem {
    /// Value as a UTF-8 string, lossy.
    #[must_use]
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    /// Value as a little-endian integer.
    #[must_use]
    pub fn as_int(&self) -> i64 {
        crate::info::vax_integer(&self.value)
    }
}

/// Builder and parser for tagged parameter buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBuffer {
    version: u8,
    items: Vec<ParameterItem>,
}

impl ParameterBuffer {
    /// Create an empty buffer of the given version.
    #[must_use]
    pub fn new(version: u8) -> Self {
        Self {
            version,
            items: Vec::new(),
        }
    }

    /// Add a flag.
    #[must_use]
    pub fn flag(mut self, tag: u8) -> Self {
        self.push(tag, Bytes::new());
        self
    }

    /// Add a string value.
    #[must_use]
    pub fn string(mut self, tag: u8, value: &str) -> Self {
        self.push(tag, Bytes::copy_from_slice(value.as_bytes()));
        self
    }

    /// Add a 4-byte little-endian integer.
    #[must_use]
    pub fn int(mut self, tag: u8, value: i32) -> Self {
        self.push(tag, Bytes::copy_from_slice(&value.to_le_bytes()));
        self
    }

    /// Add a single byte value.
    #[must_use]
    pub fn byte(mut self, tag: u8, value: u8) -> Self {
        self.push(tag, Bytes::copy_from_slice(&[value]));
        self
    }

    fn push(&mut self, tag: u8, value: Bytes) {
        self.items.push(ParameterItem { tag, value });
    }

    /// Version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[ParameterItem] {
        &self.items
    }

    /// First item with `tag`.
    #[must_use]
    pub fn get(&self, tag: u8) -> Option<&ParameterItem> {
        self.items.iter().find(|item| item.tag == tag)
    }

    /// Whether an item with `tag` is present.
    #[must_use]
    pub fn has(&self, tag: u8) -> bool {
        self.get(tag).is_some()
    }

    /// Serialize.
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(1 + self.items.len() * 4);
        buf.put_u8(self.version);
        for item in &self.items {
            if item.value.len() > u8::MAX as usize {
                return Err(ProtocolError::ValueTooLong(item.value.len()));
            }
            buf.put_u8(item.tag);
            buf.put_u8(item.value.len() as u8);
            buf.put_slice(&item.value);
        }
        Ok(buf.freeze())
    }

    /// Parse a serialized buffer.
    pub fn parse(raw: &Bytes) -> Result<Self, ProtocolError> {
        let Some(&version) = raw.first() else {
            return Err(ProtocolError::UnexpectedEof);
        };
        let mut items = Vec::new();
        let mut pos = 1;
        while pos < raw.len() {
            if pos + 2 > raw.len() {
                return Err(ProtocolError::UnexpectedEof);
            }
            let tag = raw[pos];
            let len = raw[pos + 1] as usize;
            pos += 2;
            if pos + len > raw.len() {
                return Err(ProtocolError::UnexpectedEof);
            }
            items.push(ParameterItem {
                tag,
                value: raw.slice(pos..pos + len),
            });
            pos += len;
        }
        Ok(Self { version, items })
    }
}

/// Event parameter buffer: event names with the counts last seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBuffer {
    /// `(name, count)` pairs.
    pub events: Vec<(String, u32)>,
}

impl EventBuffer {
    /// Buffer for a single event.
    #[must_use]
    pub fn single(name: impl Into<String>, count: u32) -> Self {
        Self {
            events: vec![(name.into(), count)],
        }
    }

    /// Serialize.
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        buf.put_u8(EPB_VERSION);
        for (name, count) in &self.events {
            if name.len() > u8::MAX as usize {
                return Err(ProtocolError::ValueTooLong(name.len()));
            }
            buf.put_u8(name.len() as u8);
            buf.put_slice(name.as_bytes());
            buf.put_u32_le(*count);
        }
        Ok(buf.freeze())
    }

    /// Parse a serialized buffer.
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.first() != Some(&EPB_VERSION) {
            return Err(ProtocolError::InvalidField("event buffer version"));
        }
        let mut events = Vec::new();
        let mut pos = 1;
        while pos < raw.len() {
            let len = raw[pos] as usize;
            pos += 1;
            if pos + len + 4 > raw.len() {
                return Err(ProtocolError::UnexpectedEof);
            }
            let name = std::str::from_utf8(&raw[pos..pos + len])
                .map_err(|_| ProtocolError::StringEncoding)?
                .to_string();
            pos += len;
            let count =
                u32::from_le_bytes([raw[pos], raw[pos + 1], raw[pos + 2], raw[pos + 3]]);
            pos += 4;
            events.push((name, count));
        }
        Ok(Self { events })
    }

    /// Count recorded for `name`.
    #[must_use]
    pub fn count_of(&self, name: &str) -> Option<u32> {
        self.events
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, count)| *count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dpb_layout() {
        let dpb = ParameterBuffer::new(DPB_VERSION)
            .string(dpb::USER_NAME, "SYSDBA")
            .int(dpb::SQL_DIALECT, 3);
        let raw = dpb.to_bytes().unwrap();
        assert_eq!(raw[0], DPB_VERSION);
        assert_eq!(&raw[1..3], &[dpb::USER_NAME, 6]);
        assert_eq!(&raw[3..9], b"SYSDBA");

        let parsed = ParameterBuffer::parse(&raw).unwrap();
        assert_eq!(parsed.get(dpb::USER_NAME).unwrap().as_string(), "SYSDBA");
        assert_eq!(parsed.get(dpb::SQL_DIALECT).unwrap().as_int(), 3);
    }

    #[test]
    fn test_tpb_flags() {
        let tpb = ParameterBuffer::new(TPB_VERSION)
            .flag(tpb::CONCURRENCY)
            .flag(tpb::WRITE)
            .flag(tpb::WAIT)
            .int(tpb::LOCK_TIMEOUT, 5);
        let parsed = ParameterBuffer::parse(&tpb.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, tpb);
        assert!(parsed.has(tpb::WAIT));
        assert!(!parsed.has(tpb::NOWAIT));
    }

    #[test]
    fn test_value_too_long() {
        let long = "x".repeat(300);
        let dpb = ParameterBuffer::new(DPB_VERSION).string(dpb::PASSWORD, &long);
        assert_eq!(dpb.to_bytes(), Err(ProtocolError::ValueTooLong(300)));
    }

    #[test]
    fn test_event_buffer() {
        let epb = EventBuffer {
            events: vec![("ORDER_PLACED".into(), 3), ("SHIPPED".into(), 0)],
        };
        let raw = epb.to_bytes().unwrap();
        let parsed = EventBuffer::parse(&raw).unwrap();
        assert_eq!(parsed, epb);
        assert_eq!(parsed.count_of("ORDER_PLACED"), Some(3));
        assert_eq!(parsed.count_of("MISSING"), None);
    }
}
