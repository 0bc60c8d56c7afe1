//! Configuration for the Redis backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection and keyspace settings for [`super::RedisStorage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Server address, `host:port`.
    pub address: String,
    /// Hash holding one id counter per entity type.
    pub id_key: String,
    /// Connection attempts before giving up.
    pub connect_attempts: u32,
    /// Pause between connection attempts.
    pub retry_backoff: Duration,
    /// Read and write timeout. `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
}

impl RedisConfig {
    /// Creates a configuration for the server at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Sets the id counter hash key.
    #[must_use]
    pub fn with_id_key(mut self, key: impl Into<String>) -> Self {
        self.id_key = key.into();
        self
    }

    /// Sets the number of connection attempts. At least one is always made.
    #[must_use]
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    /// Sets the pause between connection attempts.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            id_key: "entid".to_string(),
            connect_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            io_timeout: Some(Duration::from_secs(30)),
        }
    }
}
