//! Event notification tests against the mock server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::time::Duration;

use fb_client::{Attachment, EventHandle, EventNotice};
use fb_testing::MockServer;
use tokio::sync::mpsc;

use common::attach;

const ORDER_PLACED: &str = "ORDER_PLACED";

fn listening_handle(db: &Attachment, name: &str) -> (EventHandle, mpsc::UnboundedReceiver<EventNotice>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = db
        .create_event_handle(name, move |notice: &EventNotice| {
            let _ = tx.send(notice.clone());
        })
        .unwrap();
    (handle, rx)
}

async fn next_notice(rx: &mut mpsc::UnboundedReceiver<EventNotice>) -> EventNotice {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification within timeout")
        .expect("notification channel open")
}

#[tokio::test]
async fn test_posted_event_is_delivered_once() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;
    let (handle, mut rx) = listening_handle(&db, ORDER_PLACED);

    db.queue_event(&handle).await.unwrap();
    assert!(handle.is_queued());
    assert_ne!(handle.event_id(), 0);
    assert_eq!(server.pending_registrations(), 1);

    assert_eq!(server.post_event(ORDER_PLACED, 2), 1);
    let notice = next_notice(&mut rx).await;
    assert_eq!(notice.name, ORDER_PLACED);
    assert_eq!(notice.count, 2);
    assert_eq!(notice.delta, 2);

    // Registrations are one-shot.
    assert!(!handle.is_queued());
    assert_eq!(server.pending_registrations(), 0);
    assert_eq!(server.post_event(ORDER_PLACED, 1), 0);
    assert!(rx.try_recv().is_err());

    assert_eq!(db.count_events(&handle), 2);
    assert_eq!(handle.event_count(), 2);
    assert_eq!(db.count_events(&handle), 0);
}

#[tokio::test]
async fn test_requeue_reports_only_new_occurrences() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;
    let (handle, mut rx) = listening_handle(&db, ORDER_PLACED);

    db.queue_event(&handle).await.unwrap();
    server.post_event(ORDER_PLACED, 3);
    next_notice(&mut rx).await;
    assert_eq!(db.count_events(&handle), 3);

    db.queue_event(&handle).await.unwrap();
    assert_eq!(server.pending_registrations(), 1);
    server.post_event(ORDER_PLACED, 1);
    let notice = next_notice(&mut rx).await;
    assert_eq!(notice.count, 4);
    assert_eq!(notice.delta, 1);
    assert_eq!(db.count_events(&handle), 1);
    assert_eq!(server.event_count(ORDER_PLACED), 4);
}

#[tokio::test]
async fn test_queue_with_stale_count_notifies_immediately() {
    let server = MockServer::builder().build().await.unwrap();
    server.post_event(ORDER_PLACED, 5);
    let db = attach(&server).await;
    let (handle, mut rx) = listening_handle(&db, ORDER_PLACED);

    db.queue_event(&handle).await.unwrap();
    let notice = next_notice(&mut rx).await;
    assert_eq!(notice.count, 5);
    assert_eq!(server.pending_registrations(), 0);
}

#[tokio::test]
async fn test_cancelled_handle_gets_no_notification() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;
    let (cancelled, mut cancelled_rx) = listening_handle(&db, ORDER_PLACED);
    let (kept, mut kept_rx) = listening_handle(&db, ORDER_PLACED);

    db.queue_event(&cancelled).await.unwrap();
    db.queue_event(&kept).await.unwrap();
    // Queuing an already queued handle does nothing.
    db.queue_event(&kept).await.unwrap();
    assert_eq!(server.pending_registrations(), 2);

    db.cancel_event(&cancelled).await.unwrap();
    assert!(!cancelled.is_queued());
    assert_eq!(server.pending_registrations(), 1);

    assert_eq!(server.post_event(ORDER_PLACED, 1), 1);
    assert_eq!(next_notice(&mut kept_rx).await.count, 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cancelled_rx.try_recv().is_err());

    // Cancelling a handle that is not queued does nothing.
    db.cancel_event(&cancelled).await.unwrap();
}

#[tokio::test]
async fn test_detach_drops_registrations() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;
    let (handle, _rx) = listening_handle(&db, ORDER_PLACED);
    db.queue_event(&handle).await.unwrap();

    db.detach().await.unwrap();
    // The server forgets the session's registrations once it is gone.
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.pending_registrations() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registrations removed");

    assert!(db.queue_event(&handle).await.unwrap_err().is_state());
}

#[tokio::test]
async fn test_event_name_is_validated() {
    let server = MockServer::builder().build().await.unwrap();
    let db = attach(&server).await;

    assert!(db.create_event_handle("", |_: &EventNotice| {}).is_err());
    assert!(db.create_event_handle("X".repeat(256), |_: &EventNotice| {}).is_err());
}
