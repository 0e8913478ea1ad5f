//! Helpers shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use fb_client::{Attachment, Config, ProtocolRevision};
use fb_testing::MockServer;

/// Route client logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Client configuration pointing at `server`.
pub fn config_for(server: &MockServer) -> Config {
    Config::new()
        .host(server.host())
        .port(server.port())
        .database("/data/employee.fdb")
        .credentials("SYSDBA", "masterkey")
}

/// Attach to `server` with the default configuration.
pub async fn attach(server: &MockServer) -> Attachment {
    attach_with(config_for(server)).await
}

/// Attach to `server` offering only `revisions`.
pub async fn attach_at(server: &MockServer, revisions: &[ProtocolRevision]) -> Attachment {
    attach_with(config_for(server).protocol_revisions(revisions.to_vec())).await
}

/// Attach with `config`.
pub async fn attach_with(config: Config) -> Attachment {
    init_tracing();
    let db = Attachment::new(config).unwrap();
    db.attach().await.unwrap();
    db
}
