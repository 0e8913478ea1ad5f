//! Client configuration.

use std::time::Duration;

use fb_protocol::ProtocolRevision;

use crate::error::{Error, Result};
use crate::transaction::TransactionConfig;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3050;

/// Default rows requested per fetch.
pub const DEFAULT_FETCH_SIZE: u32 = 400;

/// Default limit for blobs delivered inline with fetched rows.
pub const DEFAULT_MAX_INLINE_BLOB_SIZE: u32 = 64 * 1024;

/// Default chunk size for blob transfers.
pub const DEFAULT_BLOB_BUFFER_SIZE: usize = 16 * 1024;

/// Timeout configuration for the phases of a session.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Time to establish the TCP connection (default: 15s).
    pub connect_timeout: Duration,
    /// Longest wait for a single response frame (default: none).
    ///
    /// Expiry is a transport failure and leaves the attachment unusable.
    pub read_timeout: Option<Duration>,
    /// Timeout armed on new statements (default: none).
    pub statement_timeout: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            read_timeout: None,
            statement_timeout: None,
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TCP connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the transport read deadline.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the default statement timeout.
    #[must_use]
    pub fn statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }
}

/// Configuration for connecting to a database or service manager.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 3050).
    pub port: u16,

    /// Database path or alias.
    pub database: String,

    /// User name.
    pub user: String,

    /// Password, sent in the database parameter buffer.
    pub password: String,

    /// SQL role.
    pub role: Option<String>,

    /// Connection character set (default: `UTF8`).
    pub charset: String,

    /// SQL dialect (default: 3).
    pub dialect: u32,

    /// Protocol revisions offered during negotiation.
    pub protocol_revisions: Vec<ProtocolRevision>,

    /// Ask for zlib wire compression on revisions that have it (default: off).
    pub wire_compression: bool,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rows requested per fetch (default: 400).
    pub fetch_size: u32,

    /// Largest blob the server may send inline (default: 64 KiB, 0 disables).
    pub max_inline_blob_size: u32,

    /// Chunk size for blob reads and writes (default: 16 KiB).
    pub blob_buffer_size: usize,

    /// Transaction parameters used by `start_default_transaction`.
    pub transaction: TransactionConfig,

    /// Process name reported to the server.
    pub process_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            role: None,
            charset: "UTF8".to_string(),
            dialect: 3,
            protocol_revisions: ProtocolRevision::SUPPORTED.to_vec(),
            wire_compression: false,
            timeouts: TimeoutConfig::default(),
            fetch_size: DEFAULT_FETCH_SIZE,
            max_inline_blob_size: DEFAULT_MAX_INLINE_BLOB_SIZE,
            blob_buffer_size: DEFAULT_BLOB_BUFFER_SIZE,
            transaction: TransactionConfig::default(),
            process_name: None,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database path or alias.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set user name and password.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the SQL role.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the connection character set.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Set the SQL dialect.
    #[must_use]
    pub fn dialect(mut self, dialect: u32) -> Self {
        self.dialect = dialect;
        self
    }

    /// Restrict the protocol revisions offered to the server.
    #[must_use]
    pub fn protocol_revisions(mut self, revisions: impl Into<Vec<ProtocolRevision>>) -> Self {
        self.protocol_revisions = revisions.into();
        self
    }

    /// Request wire compression.
    #[must_use]
    pub fn wire_compression(mut self, enabled: bool) -> Self {
        self.wire_compression = enabled;
        self
    }

    /// Set the timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the TCP connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect_timeout = timeout;
        self
    }

    /// Set the default statement timeout.
    #[must_use]
    pub fn statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeouts.statement_timeout = timeout;
        self
    }

    /// Set the fetch size.
    #[must_use]
    pub fn fetch_size(mut self, rows: u32) -> Self {
        self.fetch_size = rows;
        self
    }

    /// Set the inline blob limit; 0 disables inline blobs.
    #[must_use]
    pub fn max_inline_blob_size(mut self, bytes: u32) -> Self {
        self.max_inline_blob_size = bytes;
        self
    }

    /// Set the blob transfer chunk size.
    #[must_use]
    pub fn blob_buffer_size(mut self, bytes: usize) -> Self {
        self.blob_buffer_size = bytes;
        self
    }

    /// Set the default transaction parameters.
    #[must_use]
    pub fn transaction(mut self, transaction: TransactionConfig) -> Self {
        self.transaction = transaction;
        self
    }

    /// Set the process name reported to the server.
    #[must_use]
    pub fn process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }

    /// Address to connect to.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the configuration for values the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(Error::Config("database must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be zero".into()));
        }
        if self.fetch_size == 0 {
            return Err(Error::Config("fetch size must not be zero".into()));
        }
        if self.blob_buffer_size == 0 {
            return Err(Error::Config("blob buffer size must not be zero".into()));
        }
        if self.protocol_revisions.is_empty() {
            return Err(Error::Config("at least one protocol revision must be offered".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 3050);
        assert_eq!(config.charset, "UTF8");
        assert_eq!(config.dialect, 3);
        assert_eq!(config.fetch_size, 400);
        assert_eq!(config.max_inline_blob_size, 64 * 1024);
        assert_eq!(config.timeouts.connect_timeout, Duration::from_secs(15));
        assert!(config.timeouts.statement_timeout.is_none());
        assert!(!config.wire_compression);
        assert_eq!(
            config.protocol_revisions.len(),
            ProtocolRevision::SUPPORTED.len()
        );
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .host("db.example.com")
            .port(3051)
            .database("employee")
            .credentials("SYSDBA", "masterkey")
            .statement_timeout(Some(Duration::from_secs(2)))
            .fetch_size(50);
        assert_eq!(config.address(), "db.example.com:3051");
        assert_eq!(config.user, "SYSDBA");
        assert_eq!(config.fetch_size, 50);
        assert_eq!(
            config.timeouts.statement_timeout,
            Some(Duration::from_secs(2))
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects() {
        assert!(Config::new().validate().is_err());
        assert!(Config::new().database("x").port(0).validate().is_err());
        assert!(Config::new().database("x").fetch_size(0).validate().is_err());
        assert!(
            Config::new()
                .database("x")
                .protocol_revisions(Vec::<ProtocolRevision>::new())
                .validate()
                .is_err()
        );
    }
}
