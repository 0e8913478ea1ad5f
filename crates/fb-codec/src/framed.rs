//! Framed streams over async transports.
//!
//! The split reader and writer let [`Connection`](crate::Connection) send a
//! cancel request while another task is blocked reading.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use futures_util::Sink;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, FramedRead, FramedWrite};

use crate::error::CodecError;
use crate::frame_codec::FrameCodec;

pin_project! {
    /// Combined read/write frames, as a server holds them.
    pub struct FrameStream<T> {
        #[pin]
        inner: Framed<T, FrameCodec>,
    }
}

impl<T> FrameStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Frame `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Framed::new(transport, FrameCodec::new()),
        }
    }

    /// Compress both directions from now on.
    pub fn enable_compression(&mut self) {
        self.inner.codec_mut().enable_compression();
    }
}

impl<T> Stream for FrameStream<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<Bytes, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl<T> Sink<Bytes> for FrameStream<T>
where
    T: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

pin_project! {
    /// Read half of a split connection.
    pub struct FrameReader<T> {
        #[pin]
        inner: FramedRead<T, FrameCodec>,
    }
}

impl<T> FrameReader<T>
where
    T: AsyncRead,
{
    /// Frame the read half `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            inner: FramedRead::new(transport, FrameCodec::new()),
        }
    }

    /// Inflate incoming bytes from now on.
    pub fn enable_compression(&mut self) {
        self.inner.decoder_mut().enable_compression();
    }
}

impl<T> Stream for FrameReader<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<Bytes, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

pin_project! {
    /// Write half of a split connection.
    pub struct FrameWriter<T> {
        #[pin]
        inner: FramedWrite<T, FrameCodec>,
    }
}

impl<T> FrameWriter<T>
where
    T: AsyncWrite,
{
    /// Frame the write half `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            inner: FramedWrite::new(transport, FrameCodec::new()),
        }
    }

    /// Deflate outgoing bytes from now on.
    pub fn enable_compression(&mut self) {
        self.inner.encoder_mut().enable_compression();
    }
}

impl<T> Sink<Bytes> for FrameWriter<T>
where
    T: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};

    #[tokio::test]
    async fn test_frames_cross_a_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut client = FrameStream::new(client);
        let mut server = FrameStream::new(server);

        client.send(Bytes::from_static(b"ping")).await.unwrap();
        let frame = server.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"ping");

        // Larger than the duplex buffer: reassembled across reads.
        let big = Bytes::from(vec![7u8; 1000]);
        let send = tokio::spawn(async move {
            server.send(big).await.unwrap();
            server
        });
        let frame = client.next().await.unwrap().unwrap();
        assert_eq!(frame.len(), 1000);
        drop(send.await.unwrap());

        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn test_split_halves_switch_to_compression() {
        let (client, server) = tokio::io::duplex(256);
        let (read_half, write_half) = tokio::io::split(client);
        let mut reader = FrameReader::new(read_half);
        let mut writer = FrameWriter::new(write_half);
        let mut server = FrameStream::new(server);

        writer.send(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(&server.next().await.unwrap().unwrap()[..], b"hello");

        reader.enable_compression();
        writer.enable_compression();
        server.enable_compression();

        let payload = Bytes::from(b"compressed ".repeat(200));
        writer.send(payload.clone()).await.unwrap();
        assert_eq!(server.next().await.unwrap().unwrap(), payload);

        let reply = tokio::spawn(async move {
            server.send(Bytes::from_static(b"reply")).await.unwrap();
            server
        });
        assert_eq!(&reader.next().await.unwrap().unwrap()[..], b"reply");
        drop(reply.await.unwrap());
    }
}
