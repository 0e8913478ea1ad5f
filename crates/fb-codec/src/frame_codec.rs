//! Length-prefixed frame codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use fb_protocol::packet::{FRAME_HEADER_SIZE, FrameHeader, MAX_FRAME_SIZE};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Scratch size for one zlib call.
const ZLIB_CHUNK: usize = 8 * 1024;

/// Frame codec for tokio-util framing.
///
/// Decodes a byte stream into frame payloads and prefixes outgoing payloads
/// with their length. Decoded payloads are split off the read buffer without
/// copying.
///
/// Once [`enable_compression`](Self::enable_compression) is called the byte
/// stream below the frames is a zlib stream in both directions. Every encoded
/// frame ends with a sync flush so the peer can decode it without waiting for
/// more data.
pub struct FrameCodec {
    max_frame_size: usize,
    inflate: Option<Inflate>,
    deflate: Option<Deflate>,
}

impl FrameCodec {
    /// Create a codec with the default maximum frame size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            inflate: None,
            deflate: None,
        }
    }

    /// Create a codec with a custom maximum frame size.
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Switch to zlib compression for all further bytes.
    ///
    /// Bytes already buffered for decoding are treated as compressed.
    pub fn enable_compression(&mut self) {
        if self.is_compressed() {
            return;
        }
        tracing::debug!("wire compression enabled");
        self.inflate = Some(Inflate::new());
        self.deflate = Some(Deflate::new());
    }

    /// Whether compression is on.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.inflate.is_some()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("max_frame_size", &self.max_frame_size)
            .field("compressed", &self.is_compressed())
            .finish()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.inflate {
            Some(inflate) => {
                inflate.feed(src)?;
                split_frame(&mut inflate.plain, self.max_frame_size)
            }
            None => split_frame(src, self.max_frame_size),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: item.len(),
                max: self.max_frame_size,
            });
        }

        match &mut self.deflate {
            Some(deflate) => {
                let mut plain = BytesMut::with_capacity(FRAME_HEADER_SIZE + item.len());
                put_frame(&item, &mut plain);
                deflate.write(&plain, dst)?;
            }
            None => put_frame(&item, dst),
        }

        tracing::trace!(length = item.len(), "encoded frame");

        Ok(())
    }
}

fn split_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Bytes>, CodecError> {
    if src.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if length > max_frame_size {
        return Err(CodecError::FrameTooLarge {
            size: length,
            max: max_frame_size,
        });
    }

    let total = FRAME_HEADER_SIZE + length;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    let mut frame = src.split_to(total);
    let payload = frame.split_off(FRAME_HEADER_SIZE).freeze();

    tracing::trace!(length, "decoded frame");

    Ok(Some(payload))
}

fn put_frame(item: &[u8], dst: &mut BytesMut) {
    dst.reserve(FRAME_HEADER_SIZE + item.len());
    FrameHeader::new(item.len() as u32).encode(dst);
    dst.put_slice(item);
}

/// Inbound zlib state; inflated bytes wait in `plain` until they form a frame.
struct Inflate {
    stream: Decompress,
    plain: BytesMut,
}

impl Inflate {
    fn new() -> Self {
        Self {
            stream: Decompress::new(true),
            plain: BytesMut::new(),
        }
    }

    /// Inflate everything buffered in `src`.
    fn feed(&mut self, src: &mut BytesMut) -> Result<(), CodecError> {
        let mut chunk = [0u8; ZLIB_CHUNK];
        loop {
            let before_in = self.stream.total_in();
            let before_out = self.stream.total_out();
            self.stream
                .decompress(&src[..], &mut chunk, FlushDecompress::None)
                .map_err(|e| CodecError::Compression(e.to_string()))?;
            let consumed = (self.stream.total_in() - before_in) as usize;
            let produced = (self.stream.total_out() - before_out) as usize;

            src.advance(consumed);
            self.plain.extend_from_slice(&chunk[..produced]);

            if produced < chunk.len() && (src.is_empty() || consumed == 0) {
                return Ok(());
            }
        }
    }
}

/// Outbound zlib state.
struct Deflate {
    stream: Compress,
}

impl Deflate {
    fn new() -> Self {
        Self {
            stream: Compress::new(Compression::default(), true),
        }
    }

    /// Compress `plain` onto `dst`, ending with a sync flush.
    fn write(&mut self, plain: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
        let mut input = plain;
        let mut chunk = [0u8; ZLIB_CHUNK];
        loop {
            let before_in = self.stream.total_in();
            let before_out = self.stream.total_out();
            self.stream
                .compress(input, &mut chunk, FlushCompress::Sync)
                .map_err(|e| CodecError::Compression(e.to_string()))?;
            let consumed = (self.stream.total_in() - before_in) as usize;
            let produced = (self.stream.total_out() - before_out) as usize;

            input = &input[consumed..];
            dst.extend_from_slice(&chunk[..produced]);

            // Spare output space after a sync flush means everything is out.
            if input.is_empty() && produced < chunk.len() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame() {
        let mut codec = FrameCodec::new();

        let mut data = BytesMut::new();
        data.put_u32(4);
        data.put_slice(b"test");
        data.put_u32(0); // start of the next frame

        let frame = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(&frame[..], b"test");
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn test_encode_frame() {
        let mut codec = FrameCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(Bytes::from_static(b"test"), &mut dst).unwrap();
        assert_eq!(&dst[..], &[0, 0, 0, 4, b't', b'e', b's', b't']);
    }

    #[test]
    fn test_incomplete_frame() {
        let mut codec = FrameCodec::new();

        let mut data = BytesMut::new();
        data.put_u32(12);
        data.put_slice(b"short");

        assert!(codec.decode(&mut data).unwrap().is_none());
        assert_eq!(data.len(), 9);
    }

    #[test]
    fn test_oversized_frame() {
        let mut codec = FrameCodec::new().with_max_frame_size(8);

        let mut data = BytesMut::new();
        data.put_u32(9);
        assert!(matches!(
            codec.decode(&mut data),
            Err(CodecError::FrameTooLarge { size: 9, max: 8 })
        ));

        let mut dst = BytesMut::new();
        assert!(codec.encode(Bytes::from_static(b"123456789"), &mut dst).is_err());
    }

    #[test]
    fn test_compressed_frames() {
        let mut sender = FrameCodec::new();
        let mut receiver = FrameCodec::new();
        sender.enable_compression();
        receiver.enable_compression();
        assert!(sender.is_compressed());

        let big = Bytes::from(vec![b'x'; 100_000]);
        let mut wire = BytesMut::new();
        sender.encode(Bytes::from_static(b"first"), &mut wire).unwrap();
        sender.encode(big.clone(), &mut wire).unwrap();
        assert!(wire.len() < big.len());

        // Delivered in small pieces, as a socket would.
        let mut src = BytesMut::new();
        let mut frames = Vec::new();
        for piece in wire.chunks(1000) {
            src.extend_from_slice(piece);
            while let Some(frame) = receiver.decode(&mut src).unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"first");
        assert_eq!(frames[1], big);
        assert!(src.is_empty());
    }

    #[test]
    fn test_plain_bytes_are_not_a_zlib_stream() {
        let mut plain = FrameCodec::new();
        let mut wire = BytesMut::new();
        plain.encode(Bytes::from_static(b"test"), &mut wire).unwrap();

        let mut receiver = FrameCodec::new();
        receiver.enable_compression();
        assert!(matches!(
            receiver.decode(&mut wire),
            Err(CodecError::Compression(_))
        ));
    }
}
