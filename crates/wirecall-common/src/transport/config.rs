//! Constructor-level configuration for the TCP transports and the
//! compression decorators.
//!
//! All structs deserialize from JSON with every field optional, falling back
//! to the defaults below.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::frame::MAX_BODY_LEN;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_CONNECT_RETRY_COUNT: u32 = 10;
const DEFAULT_CONNECT_RETRY_INTERVAL_MS: u64 = 1000;

/// Configuration for [`TcpMessageSender`](super::TcpMessageSender).
///
/// # Default Configuration
///
/// - `host`: `127.0.0.1`
/// - `connect_retry_count`: 10 (retries after the first attempt)
/// - `connect_retry_interval_ms`: 1000
/// - `ack_timeout_ms`: 10000
/// - `ack_poll_interval_ms`: 10
///
/// # Example
///
/// ```rust
/// use wirecall_common::transport::SenderConfig;
///
/// let config = SenderConfig {
///     port: 9400,
///     ack_timeout_ms: 2000,
///     ..Default::default()
/// };
/// assert_eq!(config.address(), "127.0.0.1:9400");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Host name or IP address of the receiver
    pub host: String,
    pub port: u16,
    /// Connect attempts made after the first one fails
    pub connect_retry_count: u32,
    pub connect_retry_interval_ms: u64,
    /// Upper bound on the wait for the acknowledgement byte
    pub ack_timeout_ms: u64,
    /// Granularity of the acknowledgement wait
    pub ack_poll_interval_ms: u64,
}

impl SenderConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Never zero, since a zero read timeout means "block forever".
    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms.max(1))
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            connect_retry_count: DEFAULT_CONNECT_RETRY_COUNT,
            connect_retry_interval_ms: DEFAULT_CONNECT_RETRY_INTERVAL_MS,
            ack_timeout_ms: 10_000,
            ack_poll_interval_ms: 10,
        }
    }
}

/// Configuration for [`TcpMessageReceiver`](super::TcpMessageReceiver).
///
/// Port 0 binds an OS-assigned port; read it back with
/// [`TcpMessageReceiver::local_addr`](super::TcpMessageReceiver::local_addr).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Address to listen on
    pub host: String,
    pub port: u16,
    /// Accept attempts made after the first one finds no pending connection
    pub connect_retry_count: u32,
    pub connect_retry_interval_ms: u64,
    /// Sleep between polls when no bytes are available; also the worst-case
    /// cancellation latency
    pub receive_poll_interval_ms: u64,
    /// Largest accepted frame body in bytes
    pub max_body_len: u64,
}

impl ReceiverConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }

    pub fn receive_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receive_poll_interval_ms)
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            connect_retry_count: DEFAULT_CONNECT_RETRY_COUNT,
            connect_retry_interval_ms: DEFAULT_CONNECT_RETRY_INTERVAL_MS,
            receive_poll_interval_ms: 200,
            max_body_len: MAX_BODY_LEN,
        }
    }
}

/// Configuration for the gzip decorators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Chunk size used while inflating a received message
    pub decompression_buffer_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            decompression_buffer_size: 1024,
        }
    }
}
