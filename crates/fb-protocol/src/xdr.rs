//! XDR primitives.
//!
//! Every scalar on the wire is 4-byte aligned: 32-bit integers are sent
//! big-endian, 64-bit integers as eight big-endian bytes, and variable-length
//! values as a `u32` length, the bytes, then zero padding up to the next
//! multiple of four.

use bytes::{Buf, BufMut, Bytes};

use crate::error::ProtocolError;

/// Alignment unit of the encoding.
pub const ALIGNMENT: usize = 4;

/// Largest opaque value accepted by the decoder.
pub const MAX_OPAQUE_LEN: usize = 64 * 1024 * 1024;

/// Number of padding bytes that follow a value of `len` bytes.
#[must_use]
pub const fn padding(len: usize) -> usize {
    (ALIGNMENT - len % ALIGNMENT) % ALIGNMENT
}

/// Size on the wire of an opaque value with `len` payload bytes.
#[must_use]
pub const fn opaque_size(len: usize) -> usize {
    4 + len + padding(len)
}

fn ensure(src: &impl Buf, needed: usize) -> Result<(), ProtocolError> {
    if src.remaining() < needed {
        Err(ProtocolError::UnexpectedEof)
    } else {
        Ok(())
    }
}

/// Read an unsigned 32-bit integer.
pub fn read_u32(src: &mut impl Buf) -> Result<u32, ProtocolError> {
    ensure(src, 4)?;
    Ok(src.get_u32())
}

/// Read a signed 32-bit integer.
pub fn read_i32(src: &mut impl Buf) -> Result<i32, ProtocolError> {
    ensure(src, 4)?;
    Ok(src.get_i32())
}

/// Read an unsigned 64-bit integer.
pub fn read_u64(src: &mut impl Buf) -> Result<u64, ProtocolError> {
    ensure(src, 8)?;
    Ok(src.get_u64())
}

/// Read a signed 64-bit integer.
pub fn read_i64(src: &mut impl Buf) -> Result<i64, ProtocolError> {
    ensure(src, 8)?;
    Ok(src.get_i64())
}

/// Read a boolean sent as a 32-bit integer.
pub fn read_bool(src: &mut impl Buf) -> Result<bool, ProtocolError> {
    Ok(read_u32(src)? != 0)
}

/// Read a length-prefixed opaque value and skip its padding.
///
/// When `src` is a [`Bytes`] the returned value shares its allocation.
pub fn read_opaque(src: &mut impl Buf) -> Result<Bytes, ProtocolError> {
    let len = read_u32(src)? as usize;
    if len > MAX_OPAQUE_LEN {
        return Err(ProtocolError::ValueTooLong(len));
    }
    let pad = padding(len);
    ensure(src, len + pad)?;
    let value = src.copy_to_bytes(len);
    src.advance(pad);
    Ok(value)
}

/// Read a length-prefixed UTF-8 string.
pub fn read_string(src: &mut impl Buf) -> Result<String, ProtocolError> {
    let raw = read_opaque(src)?;
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::StringEncoding)
}

/// Write an unsigned 32-bit integer.
pub fn write_u32(dst: &mut impl BufMut, value: u32) {
    dst.put_u32(value);
}

/// Write a signed 32-bit integer.
pub fn write_i32(dst: &mut impl BufMut, value: i32) {
    dst.put_i32(value);
}

/// Write an unsigned 64-bit integer.
pub fn write_u64(dst: &mut impl BufMut, value: u64) {
    dst.put_u64(value);
}

/// Write a signed 64-bit integer.
pub fn write_i64(dst: &mut impl BufMut, value: i64) {
    dst.put_i64(value);
}

/// Write a boolean as a 32-bit integer.
pub fn write_bool(dst: &mut impl BufMut, value: bool) {
    dst.put_u32(u32::from(value));
}

/// Write a length-prefixed opaque value followed by its padding.
pub fn write_opaque(dst: &mut impl BufMut, value: &[u8]) {
    dst.put_u32(value.len() as u32);
    dst.put_slice(value);
    for _ in 0..padding(value.len()) {
        dst.put_u8(0);
    }
}

/// Write a length-prefixed UTF-8 string.
pub fn write_string(dst: &mut impl BufMut, value: &str) {
    write_opaque(dst, value.as_bytes());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    #[test]
    fn test_padding() {
        assert_eq!(padding(0), 0);
        assert_eq!(padding(1), 3);
        assert_eq!(padding(4), 0);
        assert_eq!(padding(6), 2);
        assert_eq!(opaque_size(5), 12);
    }

    #[test]
    fn test_opaque_is_aligned() {
        let mut buf = BytesMut::new();
        write_opaque(&mut buf, b"abcde");
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[..4], &[0, 0, 0, 5]);
        assert_eq!(&buf[9..], &[0, 0, 0]);
    }

    #[test]
    fn test_string_followed_by_int() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "employee.fdb");
        write_i32(&mut buf, -7);

        let mut src = buf.freeze();
        assert_eq!(read_string(&mut src).unwrap(), "employee.fdb");
        assert_eq!(read_i32(&mut src).unwrap(), -7);
        assert!(src.is_empty());
    }

    #[test]
    fn test_truncated_opaque() {
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        buf.put_slice(b"short");
        let mut src = buf.freeze();
        assert_eq!(read_opaque(&mut src), Err(ProtocolError::UnexpectedEof));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(u32::MAX);
        let mut src = buf.freeze();
        assert!(matches!(
            read_opaque(&mut src),
            Err(ProtocolError::ValueTooLong(_))
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = BytesMut::new();
        write_opaque(&mut buf, &[0xff, 0xfe]);
        let mut src = buf.freeze();
        assert_eq!(read_string(&mut src), Err(ProtocolError::StringEncoding));
    }

    proptest! {
        #[test]
        fn opaque_keeps_stream_aligned(data in proptest::collection::vec(any::<u8>(), 0..64), tail: u32) {
            let mut buf = BytesMut::new();
            write_opaque(&mut buf, &data);
            write_u32(&mut buf, tail);
            prop_assert_eq!(buf.len() % ALIGNMENT, 0);

            let mut src = buf.freeze();
            let opaque = read_opaque(&mut src).unwrap();
            prop_assert_eq!(opaque.as_ref(), data.as_slice());
            prop_assert_eq!(read_u32(&mut src).unwrap(), tail);
        }
    }
}
