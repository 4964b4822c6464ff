use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use wirecall_metrics::{MetricsSink, NoopMetrics};

use crate::protocol::error::{Result, WirecallError};
use crate::transport::config::SenderConfig;
use crate::transport::frame::{FrameCodec, ACK};
use crate::transport::RemoteSender;

/// Timeout for a single TCP connect attempt (5 seconds)
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// First sequence number of a session.
const INITIAL_SEQUENCE: u32 = 1;

/// Sequence numbers stay within the non-negative `i32` range.
const MAX_SEQUENCE: u32 = i32::MAX as u32;

/// Sending half of the TCP transport (synchronous).
///
/// Frames each message under the current sequence number, writes it, and
/// waits for the one-byte acknowledgement. On a transport fault or an
/// acknowledgement timeout the sender reconnects and re-sends the *same*
/// frame once; the sequence number only advances after an acknowledged send,
/// which is what lets the receiver recognize the retransmission.
///
/// # Example
///
/// ```no_run
/// use wirecall_common::transport::{RemoteSender, SenderConfig, TcpMessageSender};
///
/// let mut sender = TcpMessageSender::new(SenderConfig::new("127.0.0.1", 9400));
/// sender.connect().unwrap();
/// sender.send("<invocation>...</invocation>").unwrap();
/// sender.disconnect();
/// ```
pub struct TcpMessageSender {
    config: SenderConfig,
    stream: Option<TcpStream>,
    sequence: u32,
    metrics: Arc<dyn MetricsSink>,
}

impl TcpMessageSender {
    pub fn new(config: SenderConfig) -> Self {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(config: SenderConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            stream: None,
            sequence: INITIAL_SEQUENCE,
            metrics,
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Sequence number the next fresh send will carry.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Connects, making one attempt plus `connect_retry_count` retries.
    fn open(&self) -> Result<TcpStream> {
        let address = self.config.address();
        let attempts = self.config.connect_retry_count.saturating_add(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match Self::connect_once(&address, self.config.ack_timeout()) {
                Ok(stream) => {
                    info!(address = %address, attempt, "Sender connected");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(address = %address, attempt, error = %e, "Connect attempt failed");
                    last_err = Some(e);
                }
            }
            if attempt < attempts {
                thread::sleep(self.config.connect_retry_interval());
            }
        }

        Err(WirecallError::Connection {
            message: format!("failed to connect to {} after {} attempts", address, attempts),
            source: last_err,
        })
    }

    fn connect_once(address: &str, write_timeout: Duration) -> io::Result<TcpStream> {
        let mut last_err = None;
        for socket_addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    if !write_timeout.is_zero() {
                        stream.set_write_timeout(Some(write_timeout))?;
                    }
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("'{}' resolved to no addresses", address),
            )
        }))
    }

    fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Writes `frame` and waits for its acknowledgement.
    fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        let ack_timeout = self.config.ack_timeout();
        let ack_poll_interval = self.config.ack_poll_interval();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| WirecallError::connection("sender is not connected"))?;

        stream
            .write_all(frame)
            .map_err(|e| map_io_error(e, "writing frame"))?;
        stream
            .flush()
            .map_err(|e| map_io_error(e, "flushing stream"))?;

        await_ack(stream, ack_timeout, ack_poll_interval)
    }
}

impl RemoteSender for TcpMessageSender {
    /// # Errors
    ///
    /// `Connection` if already connected or if every attempt failed.
    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(WirecallError::connection("sender is already connected"));
        }
        self.stream = Some(self.open()?);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.stream.is_some() {
            self.close_stream();
            info!(address = %self.config.address(), "Sender disconnected");
        }
    }

    /// Sends `message` and waits for the acknowledgement.
    ///
    /// # Errors
    ///
    /// - `Connection` if not connected, or if reconnecting for the resend failed
    /// - `Transport` / `AcknowledgementTimeout` if the resend failed as well
    /// - `ProtocolFraming` if the peer answered with something other than a
    ///   single acknowledgement byte
    ///
    /// After any error the sender is disconnected.
    fn send(&mut self, message: &str) -> Result<()> {
        if self.stream.is_none() {
            return Err(WirecallError::connection("sender is not connected"));
        }

        let sequence = self.sequence;
        let frame = FrameCodec::encode(sequence, message);

        match self.transmit(&frame) {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                warn!(sequence, error = %e, "Send failed, reconnecting to re-send frame");
                self.close_stream();
                self.stream = Some(self.open()?);
                self.metrics.reconnected();

                if let Err(e) = self.transmit(&frame) {
                    warn!(sequence, error = %e, "Re-send failed");
                    self.close_stream();
                    return Err(e);
                }
                self.metrics.message_resent(sequence);
            }
            Err(e) => {
                self.close_stream();
                return Err(e);
            }
        }

        debug!(sequence, bytes = message.len(), "Frame acknowledged");
        self.metrics.message_sent(message.len());
        self.sequence = next_sequence(sequence);
        Ok(())
    }
}

impl Drop for TcpMessageSender {
    fn drop(&mut self) {
        self.close_stream();
    }
}

/// Sequence number following `sequence`, wrapping to 0 after `i32::MAX`.
pub(crate) fn next_sequence(sequence: u32) -> u32 {
    if sequence >= MAX_SEQUENCE {
        0
    } else {
        sequence + 1
    }
}

/// Waits for exactly one acknowledgement byte.
///
/// The read timeout is set to `poll_interval` and the wait repeats until
/// `timeout` has passed, so a slow receiver is measured against wall-clock
/// time rather than a single blocking read.
fn await_ack(stream: &mut TcpStream, timeout: Duration, poll_interval: Duration) -> Result<()> {
    stream
        .set_read_timeout(Some(poll_interval))
        .map_err(|e| map_io_error(e, "configuring acknowledgement wait"))?;

    let deadline = Instant::now() + timeout;
    // Larger than one byte so that surplus bytes show up in the same read.
    let mut buf = [0u8; 16];

    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                return Err(WirecallError::transport(
                    "waiting for acknowledgement",
                    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by receiver"),
                ));
            }
            Ok(1) if buf[0] == ACK => return Ok(()),
            Ok(1) => {
                return Err(WirecallError::ProtocolFraming(format!(
                    "expected acknowledgement 0x{:02x}, found 0x{:02x}",
                    ACK, buf[0]
                )));
            }
            Ok(n) => {
                return Err(WirecallError::ProtocolFraming(format!(
                    "received {} bytes while waiting for a single acknowledgement byte",
                    n
                )));
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                if Instant::now() >= deadline {
                    return Err(WirecallError::AcknowledgementTimeout(timeout.as_millis() as u64));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(map_io_error(e, "waiting for acknowledgement")),
        }
    }
}

fn map_io_error(err: io::Error, context: &str) -> WirecallError {
    WirecallError::transport(context, err)
}
