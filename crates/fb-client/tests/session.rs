//! Session lifecycle tests against the mock server.
//!
//! Covers protocol negotiation, attach/detach rules, transactions,
//! cancellation and the service manager.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use bytes::Bytes;
use fb_client::{
    Attachment, AttachmentState, CancelKind, Capabilities, Error, ProtocolRevision,
    ServiceAttachment, TransactionConfig, TransactionState,
};
use fb_protocol::codes;
use fb_testing::{CompressionPolicy, MockServer, MockStatement, fixtures};
use tokio_test::{assert_err, assert_ok};

use common::{attach, attach_at, attach_with, config_for, init_tracing};

// =============================================================================
// Protocol Negotiation
// =============================================================================

#[tokio::test]
async fn test_negotiates_highest_common_revision() {
    let server = MockServer::builder()
        .with_revisions(vec![
            ProtocolRevision::V10,
            ProtocolRevision::V13,
            ProtocolRevision::V15,
        ])
        .build()
        .await
        .unwrap();

    let db = attach_at(
        &server,
        &[
            ProtocolRevision::V10,
            ProtocolRevision::V13,
            ProtocolRevision::V15,
            ProtocolRevision::V16,
        ],
    )
    .await;

    let protocol = db.protocol().unwrap();
    assert_eq!(protocol.revision, ProtocolRevision::V15);
    assert!(db.supports(Capabilities::CANCEL_OPERATION));
    assert!(!db.supports(Capabilities::STATEMENT_TIMEOUT));
    assert!(!db.supports(Capabilities::INLINE_BLOBS));
}

#[tokio::test]
async fn test_negotiation_fails_without_common_revision() {
    init_tracing();
    let server = MockServer::builder()
        .with_revisions(vec![ProtocolRevision::V19])
        .build()
        .await
        .unwrap();

    let db = Attachment::new(
        config_for(&server).protocol_revisions(vec![ProtocolRevision::V10, ProtocolRevision::V13]),
    )
    .unwrap();
    let err = db.attach().await.unwrap_err();

    assert!(matches!(err, Error::Negotiation(_)), "got {err:?}");
    assert_eq!(db.state(), AttachmentState::Unattached);
    assert!(db.protocol().is_none());
}

#[tokio::test]
async fn test_requested_compression_carries_the_session() {
    let server = MockServer::builder()
        .with_compression(CompressionPolicy::Honour)
        .with_statement(
            "SELECT ID FROM ITEMS",
            MockStatement::select(vec![fixtures::int_column("ID")], fixtures::numbered_rows(1000)),
        )
        .build()
        .await
        .unwrap();
    let db = attach_with(config_for(&server).wire_compression(true)).await;

    assert!(db.protocol().unwrap().compressed);
    assert_eq!(server.compressed_sessions(), 1);
    assert_ok!(db.ping().await);
    assert_eq!(assert_ok!(db.page_size().await), 8192);

    let tx = db.start_default_transaction().await.unwrap();
    let mut stmt = db.prepare(&tx, "SELECT ID FROM ITEMS").await.unwrap();
    stmt.execute(&[]).await.unwrap();
    let rows = stmt.fetch_all().await.unwrap();
    assert_eq!(rows.len(), 1000);
    tx.commit().await.unwrap();
    db.detach().await.unwrap();
}

#[tokio::test]
async fn test_compression_stays_off_unless_requested() {
    let server = MockServer::builder()
        .with_compression(CompressionPolicy::Honour)
        .build()
        .await
        .unwrap();
    let db = attach(&server).await;

    assert!(!db.protocol().unwrap().compressed);
    assert_eq!(server.compressed_sessions(), 0);
    assert_ok!(db.ping().await);
}

#[tokio::test]
async fn test_compression_needs_revision_13() {
    let server = MockServer::builder()
        .with_compression(CompressionPolicy::Honour)
        .build()
        .await
        .unwrap();
    let db = attach_with(
        config_for(&server)
            .protocol_revisions(vec![ProtocolRevision::V10, ProtocolRevision::V12])
            .wire_compression(true),
    )
    .await;

    let protocol = db.protocol().unwrap();
    assert_eq!(protocol.revision, ProtocolRevision::V12);
    assert!(!protocol.compressed);
    assert_ok!(db.ping().await);
}

#[tokio::test]
async fn test_unrequested_compression_fails_negotiation() {
    init_tracing();
    let server = MockServer::builder()
        .with_compression(CompressionPolicy::Force)
        .build()
        .await
        .unwrap();

    let db = Attachment::new(config_for(&server)).unwrap();
    let err = db.attach().await.unwrap_err();

    assert!(matches!(err, Error::Negotiation(_)), "got {err:?}");
    assert_eq!(db.state(), AttachmentState::Unattached);
    assert!(db.protocol().is_none());
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    init_tracing();
    let server = MockServer::builder().build().await.unwrap();
    let config = config_for(&server);
    server.stop();
    drop(server);
    // Give the accept loop a moment to shut down.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let db = Attachment::new(config).unwrap();
    let err = db.attach().await.unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
    assert_eq!(db.state(), AttachmentState::Unattached);
}

// =============================================================================
// Attach / Detach
// =============================================================================

#[tokio::test]
async fn test_attach_reports_server_info() {
    let server = MockServer::builder()
        .with_server_version("WI-V4.0.5.3140 Test")
        .with_page_size(16384)
        .build()
        .await
        .unwrap();
    let db = attach(&server).await;

    assert!(db.is_attached());
    assert_ne!(db.handle(), 0);
    assert_eq!(db.server_version().as_deref(), Some("WI-V4.0.5.3140 Test"));
    assert_eq!(assert_ok!(db.page_size().await), 16384);
    assert_ok!(db.ping().await);

    db.detach().await.unwrap();
    assert_eq!(db.state(), AttachmentState::Detached);
}

#[tokio::test]
async fn test_attach_twice_is_state_error() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;

    let err = db.attach().await.unwrap_err();
    assert!(err.is_state());
    assert_eq!(err.error_code(), Some(codes::BAD_DB_HANDLE));
    assert!(db.is_attached());
}

#[tokio::test]
async fn test_detach_with_open_transaction_fails() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;
    let tx = db.start_default_transaction().await.unwrap();

    let err = db.detach().await.unwrap_err();
    assert!(err.is_state());
    assert_eq!(err.error_code(), Some(codes::OPEN_TRANS));
    assert!(db.is_attached());

    tx.commit().await.unwrap();
    assert_eq!(db.open_transactions(), 0);
    db.detach().await.unwrap();
    assert_eq!(db.state(), AttachmentState::Detached);
}

#[tokio::test]
async fn test_detached_attachment_is_terminal() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;
    db.detach().await.unwrap();

    let err = assert_err!(db.ping().await);
    assert!(err.is_state());
    assert!(db.attach().await.unwrap_err().is_state());
    assert!(db.detach().await.unwrap_err().is_state());
}

#[tokio::test]
async fn test_use_before_attach_is_state_error() {
    init_tracing();
    let server = MockServer::builder().build().await.unwrap();
    let db = Attachment::new(config_for(&server)).unwrap();

    let err = db.start_default_transaction().await.unwrap_err();
    assert!(err.is_state());
    assert_eq!(err.error_code(), Some(codes::BAD_DB_HANDLE));
}

#[tokio::test]
async fn test_create_and_drop_database() {
    init_tracing();
    let server = MockServer::builder().build().await.unwrap();
    let db = Attachment::new(config_for(&server)).unwrap();

    db.create_database().await.unwrap();
    assert!(db.is_attached());
    db.drop_database().await.unwrap();
    assert_eq!(db.state(), AttachmentState::Detached);
}

#[tokio::test]
async fn test_execute_immediate() {
    let server = MockServer::builder()
        .with_statement("CREATE TABLE T1 (ID INTEGER)", MockStatement::ddl())
        .build()
        .await
        .unwrap();
    let db = attach(&server).await;
    let tx = db.start_default_transaction().await.unwrap();

    db.execute_immediate(Some(&tx), "CREATE TABLE T1 (ID INTEGER)")
        .await
        .unwrap();
    assert_eq!(server.executions("CREATE TABLE T1 (ID INTEGER)"), 1);

    tx.commit().await.unwrap();
    let err = db
        .execute_immediate(Some(&tx), "CREATE TABLE T1 (ID INTEGER)")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some(codes::BAD_TRANS_HANDLE));
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
async fn test_transaction_end_states() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;

    let committed = db.start_default_transaction().await.unwrap();
    let rolled_back = db
        .start_transaction(&TransactionConfig::new().read_only())
        .await
        .unwrap();
    assert_eq!(db.open_transactions(), 2);

    committed.commit().await.unwrap();
    rolled_back.rollback().await.unwrap();
    assert_eq!(committed.state(), TransactionState::Committed);
    assert_eq!(rolled_back.state(), TransactionState::RolledBack);
    assert_eq!(db.open_transactions(), 0);

    for err in [
        committed.commit().await.unwrap_err(),
        committed.rollback().await.unwrap_err(),
        rolled_back.commit_retaining().await.unwrap_err(),
    ] {
        assert!(err.is_state());
        assert_eq!(err.error_code(), Some(codes::BAD_TRANS_HANDLE));
    }
}

#[tokio::test]
async fn test_retaining_keeps_transaction_active() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;
    let tx = db.start_default_transaction().await.unwrap();

    tx.commit_retaining().await.unwrap();
    tx.rollback_retaining().await.unwrap();
    assert!(tx.is_active());
    assert_eq!(db.open_transactions(), 1);
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_prepared_transaction_rejects_statements() {
    let server = MockServer::builder()
        .with_statement("DELETE FROM T1", MockStatement::dml(0))
        .build()
        .await
        .unwrap();
    let db = attach(&server).await;
    let tx = db.start_default_transaction().await.unwrap();
    let mut stmt = db.prepare(&tx, "DELETE FROM T1").await.unwrap();

    tx.prepare(Some(b"two-phase")).await.unwrap();
    assert_eq!(tx.state(), TransactionState::Prepared);

    let err = stmt.execute(&[]).await.unwrap_err();
    assert_eq!(err.error_code(), Some(codes::TRA_STATE));

    // A prepared transaction can still be completed.
    tx.commit().await.unwrap();
    assert_eq!(db.open_transactions(), 0);
}

#[tokio::test]
async fn test_reconnect_prepared_transaction() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;
    let tx = db.start_default_transaction().await.unwrap();
    let id = tx.transaction_id().await.unwrap();
    assert_eq!(id, tx.handle());
    tx.prepare(None).await.unwrap();

    let limbo = db.reconnect_transaction(id).await.unwrap();
    assert_eq!(limbo.state(), TransactionState::Prepared);
    assert_eq!(db.open_transactions(), 2);

    limbo.rollback().await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(db.open_transactions(), 0);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_needs_protocol_support() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach_at(&server, &[ProtocolRevision::V10]).await;

    let err = db.cancel_operation(CancelKind::Raise).await.unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert!(db.is_attached());
}

#[tokio::test]
async fn test_cancel_raise_without_running_operation() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach_at(&server, &[ProtocolRevision::V15]).await;

    db.cancel_operation(CancelKind::Raise).await.unwrap();
    db.ping().await.unwrap();
    assert!(db.is_attached());
}

#[tokio::test]
async fn test_abort_detaches() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;

    db.cancel_operation(CancelKind::Abort).await.unwrap();
    assert_eq!(db.state(), AttachmentState::Detached);
    assert!(db.ping().await.unwrap_err().is_state());
}

// =============================================================================
// Service Manager
// =============================================================================

#[tokio::test]
async fn test_service_action_output() {
    init_tracing();
    let server = MockServer::builder()
        .with_server_version("WI-V5.0.1.1469 Service")
        .with_service_output(["gbak: starting", "gbak: done"])
        .build()
        .await
        .unwrap();
    let service = ServiceAttachment::new(config_for(&server)).unwrap();
    service.attach().await.unwrap();
    assert_eq!(service.state(), AttachmentState::Attached);

    assert_eq!(
        service.server_version().await.unwrap().as_deref(),
        Some("WI-V5.0.1.1469 Service")
    );
    service.start(Bytes::from_static(&[2, 1])).await.unwrap();

    let mut lines = Vec::new();
    while let Some(line) = service.next_line().await.unwrap() {
        lines.push(line);
    }
    assert_eq!(lines, vec!["gbak: starting", "gbak: done"]);

    service.detach().await.unwrap();
    assert_eq!(service.state(), AttachmentState::Detached);
}

#[tokio::test]
async fn test_statement_handles_are_per_connection() {
    let server = MockServer::builder()
        .with_statement(
            "SELECT ID FROM T1",
            MockStatement::select(vec![fixtures::int_column("ID")], fixtures::numbered_rows(3)),
        )
        .build()
        .await
        .unwrap();
    let first = attach(&server).await;
    let second = attach(&server).await;
    assert_eq!(server.connection_count().await, 2);

    let tx1 = first.start_default_transaction().await.unwrap();
    let tx2 = second.start_default_transaction().await.unwrap();
    let mut s1 = first.prepare(&tx1, "SELECT ID FROM T1").await.unwrap();
    let mut s2 = second.prepare(&tx2, "SELECT ID FROM T1").await.unwrap();
    s1.execute(&[]).await.unwrap();
    s2.execute(&[]).await.unwrap();

    assert_eq!(s1.fetch_all().await.unwrap().len(), 3);
    assert_eq!(s2.fetch_all().await.unwrap().len(), 3);
    assert_eq!(server.executions("SELECT ID FROM T1"), 2);
}
