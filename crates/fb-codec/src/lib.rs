//! # fb-codec
//!
//! Async framing layer for the wire protocol.
//!
//! This crate turns raw byte streams into protocol frames and typed
//! messages, handling frame reassembly across TCP segment boundaries.
//!
//! ## Features
//!
//! - Frame reassembly across TCP segments
//! - Zero-copy payloads: decoded frames share the read buffer
//! - IO splitting so cancel requests can be sent while reading
//! - Deferred responses for lazily acknowledged requests
//! - zlib wire compression once the handshake accepts it
//! - Integration with tokio-util's codec framework
//!
//! ## Architecture
//!
//! ```text
//! TCP Stream → FrameCodec (length framing) → Response::decode → Client
//! ```
//!
//! ```rust,ignore
//! use fb_codec::Connection;
//!
//! let conn = Connection::new(tcp_stream);
//! let cancel = conn.cancel_handle();
//!
//! // Cancel from another task
//! tokio::spawn(async move {
//!     cancel.cancel(CancelKind::Raise).await?;
//! });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod frame_codec;
pub mod framed;

pub use connection::{CancelHandle, Connection};
pub use error::CodecError;
pub use frame_codec::FrameCodec;
pub use framed::{FrameReader, FrameStream, FrameWriter};
