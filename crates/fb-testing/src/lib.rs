//! # fb-testing
//!
//! Test infrastructure for the client engine.
//!
//! The centrepiece is [`MockServer`], an in-process server speaking the
//! server side of the wire protocol, so client behaviour can be exercised
//! without a database. [`fixtures`] builds the column descriptors and row
//! values its canned statements return.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fb_testing::{MockServer, MockStatement, fixtures};
//!
//! let server = MockServer::builder()
//!     .with_statement("DELETE FROM ITEMS", MockStatement::dml(3))
//!     .build()
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_server;

pub use mock_server::{
    CompressionPolicy, MockBlob, MockServer, MockServerBuilder, MockServerConfig, MockServerError,
    MockStatement,
};
