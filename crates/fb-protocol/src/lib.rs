//! # fb-protocol
//!
//! Pure implementation of the binary wire protocol spoken by Firebird-style
//! database servers.
//!
//! This crate provides XDR primitives, frame headers, typed request and
//! response messages, status vectors, parameter buffers, info clumplets and
//! protocol revision negotiation for revisions 10 through 19.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic and
//! makes no assumptions about the async runtime. Higher-level crates build upon
//! this foundation to provide async I/O capabilities.
//!
//! ## Example
//!
//! ```rust
//! use fb_protocol::{Request, Response, GenericResponse};
//!
//! let bytes = Request::AllocateStatement { database: 1 }.to_bytes();
//! assert_eq!(&bytes[..4], &[0, 0, 0, 62]);
//!
//! let mut reply = Response::Generic(GenericResponse::with_handle(7)).to_bytes();
//! let decoded = Response::decode(&mut reply).unwrap();
//! assert!(matches!(decoded, Response::Generic(r) if r.handle == 7));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codes;
pub mod describe;
pub mod error;
pub mod info;
pub mod message;
pub mod op;
pub mod packet;
pub mod pb;
pub mod segment;
pub mod status;
pub mod version;
pub mod xdr;

pub use describe::{FieldDescriptor, RowData, StatementDescription, StatementType};
pub use error::ProtocolError;
pub use info::{InfoBuilder, InfoItem};
pub use message::{
    AcceptResponse, BatchCompletion, CancelKind, EventMessage, ExecuteRequest, FetchResponse,
    FetchStatus, GenericResponse, InlineBlob, Request, Response,
};
pub use op::Operation;
pub use packet::{FRAME_HEADER_SIZE, FrameHeader, MAX_FRAME_SIZE};
pub use pb::{EventBuffer, ParameterBuffer, ParameterItem};
pub use status::{StatusEntry, StatusKind, StatusParam, StatusVector};
pub use version::{Capabilities, NegotiatedProtocol, ProtocolOffer, ProtocolRevision};
