//! # fb-client
//!
//! Async client engine for Firebird-style database servers, speaking the
//! binary wire protocol directly without a vendor client library.
//!
//! This is the primary public API surface of the workspace. Call-level
//! adapters (JDBC/ODBC style wrappers) are built on the operations exposed
//! here.
//!
//! ## Features
//!
//! - **Protocol negotiation**: the highest common revision is selected and
//!   turned into a capability set consulted by every component
//! - **Transactions**: isolation levels, retaining commits, two-phase commit
//! - **Statements**: prepare, execute, cursors fetched in bounded batches,
//!   singleton results, statement timeouts and batch execution
//! - **Blobs**: segmented and stream storage, seek, inline delivery
//! - **Events**: asynchronous notifications on a dedicated channel
//! - **Cancellation**: out-of-band cancel and abort of the running request
//!
//! ## Concurrency
//!
//! Every request/response round trip holds the attachment's serialization
//! lock, so operations on statements and blobs sharing an attachment are
//! queued, never interleaved on the wire. Event delivery and cancellation
//! run outside that lock.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fb_client::{Attachment, Config, Param};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fb_client::Error> {
//!     let config = Config::new()
//!         .host("localhost")
//!         .database("employee")
//!         .credentials("SYSDBA", "masterkey");
//!
//!     let db = Attachment::new(config)?;
//!     db.attach().await?;
//!
//!     let tx = db.start_default_transaction().await?;
//!     let mut stmt = db
//!         .prepare(&tx, "SELECT FIRST_NAME FROM EMPLOYEE WHERE DEPT_NO = ?")
//!         .await?;
//!     let dept = db.coder().encode_string("600")?;
//!     stmt.execute(&[Param::value(dept)]).await?;
//!
//!     for row in stmt.fetch_all().await? {
//!         println!("{:?}", row.get_string(db.coder(), 0)?);
//!     }
//!
//!     stmt.close().await?;
//!     tx.commit().await?;
//!     db.detach().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod attachment;
pub mod blob;
pub mod config;
pub mod error;
pub mod event;
pub mod row;
pub mod service;
pub mod statement;
pub mod transaction;

// Re-export commonly used types
pub use attachment::{Attachment, AttachmentState};
pub use blob::{Blob, BlobConfig, BlobId, BlobStorage, SeekMode};
pub use config::{Config, TimeoutConfig};
pub use error::{BatchError, Error, Result};
pub use event::{EventHandle, EventNotice};
pub use fb_protocol::{
    CancelKind, Capabilities, FieldDescriptor, ProtocolRevision, StatementType, StatusVector,
};
pub use fb_types::DatatypeCoder;
pub use row::{FetchResult, RowValue};
pub use service::ServiceAttachment;
pub use statement::{ExecuteResult, Param, Statement, StatementState};
pub use transaction::{AccessMode, IsolationLevel, LockWait, Transaction, TransactionConfig, TransactionState};
