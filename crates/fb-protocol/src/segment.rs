//! Blob segment payloads.
//!
//! `op_batch_segments` requests and `op_get_segment` responses carry a
//! sequence of segments, each a `u16` little-endian length followed by that
//! many bytes. The handle of a `op_get_segment` response reports how the
//! read ended.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Largest single segment.
pub const MAX_SEGMENT_SIZE: usize = u16::MAX as usize;

/// The last segment was returned whole.
pub const SEGMENT_COMPLETE: u32 = 0;
/// The last segment was cut short by the requested length.
pub const SEGMENT_PARTIAL: u32 = 1;
/// The blob is exhausted.
pub const SEGMENT_EOF: u32 = 2;

/// Seek relative to the start.
pub const SEEK_ABSOLUTE: u32 = 0;
/// Seek relative to the current position.
pub const SEEK_RELATIVE: u32 = 1;
/// Seek relative to the end.
pub const SEEK_FROM_END: u32 = 2;

/// Pack `data` into segments of at most [`MAX_SEGMENT_SIZE`] bytes.
#[must_use]
pub fn pack(data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(data.len() + 2 * (data.len() / MAX_SEGMENT_SIZE + 1));
    for piece in data.chunks(MAX_SEGMENT_SIZE) {
        buf.put_u16_le(piece.len() as u16);
        buf.put_slice(piece);
    }
    buf.freeze()
}

/// Split a segment payload; the pieces share the allocation of `data`.
pub fn unpack(data: &Bytes) -> Result<Vec<Bytes>, ProtocolError> {
    let mut pieces = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if pos + 2 > data.len() {
            return Err(ProtocolError::UnexpectedEof);
        }
        let len = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;
        if pos + len > data.len() {
            return Err(ProtocolError::UnexpectedEof);
        }
        pieces.push(data.slice(pos..pos + len));
        pos += len;
    }
    Ok(pieces)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_large_data_splits_at_max_segment() {
        let data = vec![7u8; MAX_SEGMENT_SIZE * 2 + 10];
        let packed = pack(&data);
        let pieces = unpack(&packed).unwrap();
        assert_eq!(
            pieces.iter().map(Bytes::len).collect::<Vec<_>>(),
            vec![MAX_SEGMENT_SIZE, MAX_SEGMENT_SIZE, 10]
        );
        assert_eq!(pieces.concat(), data);
    }

    #[test]
    fn test_empty() {
        assert!(pack(&[]).is_empty());
        assert!(unpack(&Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_payload() {
        assert!(unpack(&Bytes::from_static(&[5, 0, 1, 2])).is_err());
        assert!(unpack(&Bytes::from_static(&[5])).is_err());
    }
}
