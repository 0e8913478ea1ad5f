//! Frame header definitions.
//!
//! Every message travels in one frame: a big-endian `u32` payload length
//! followed by the payload. The payload starts with the operation code.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default upper bound for a single frame payload (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length, excluding the header.
    pub length: u32,
}

impl FrameHeader {
    /// Create a header for a payload of `length` bytes.
    #[must_use]
    pub const fn new(length: u32) -> Self {
        Self { length }
    }

    /// Parse a frame header.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::IncompleteFrame {
                expected: FRAME_HEADER_SIZE,
                actual: src.remaining(),
            });
        }
        Ok(Self {
            length: src.get_u32(),
        })
    }

    /// Write the header.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32(self.length);
    }

    /// Payload length as `usize`.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.length as usize
    }

    /// Length of header plus payload.
    #[must_use]
    pub const fn frame_length(&self) -> usize {
        FRAME_HEADER_SIZE + self.length as usize
    }

    /// Reject payloads larger than `max`.
    pub fn check_size(&self, max: usize) -> Result<(), ProtocolError> {
        if self.payload_length() > max {
            return Err(ProtocolError::FrameTooLarge {
                size: self.payload_length(),
                max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_header_layout() {
        let mut buf = BytesMut::new();
        FrameHeader::new(0x0102).encode(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 1, 2]);

        let header = FrameHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(header.payload_length(), 0x0102);
        assert_eq!(header.frame_length(), 0x0106);
    }

    #[test]
    fn test_short_header() {
        let mut src: &[u8] = &[0, 0];
        assert_eq!(
            FrameHeader::decode(&mut src),
            Err(ProtocolError::IncompleteFrame {
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn test_size_limit() {
        assert!(FrameHeader::new(10).check_size(10).is_ok());
        assert!(matches!(
            FrameHeader::new(11).check_size(10),
            Err(ProtocolError::FrameTooLarge { size: 11, max: 10 })
        ));
    }
}
