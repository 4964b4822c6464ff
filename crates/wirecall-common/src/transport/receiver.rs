use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use wirecall_metrics::{MetricsSink, NoopMetrics};

use crate::protocol::error::{Result, WirecallError};
use crate::transport::config::ReceiverConfig;
use crate::transport::frame::{FrameDecoder, ACK};
use crate::transport::{CancelHandle, RemoteReceiver};

/// Size of one socket read.
const READ_CHUNK: usize = 8 * 1024;

/// Longest uninterrupted sleep; cancellation is checked between slices.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// How long writing the acknowledgement byte may stall.
const ACK_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Receiving half of the TCP transport (synchronous).
///
/// Listens for the sender, parses frames incrementally as bytes arrive, and
/// writes one acknowledgement byte per complete frame. A frame whose
/// sequence number equals the last delivered one is a retransmission: it is
/// acknowledged again but not delivered.
///
/// The listener and the accepted stream are both non-blocking. Every pass of
/// the receive loop first checks for a newly pending connection (the sender
/// reconnected after a failure of its own) and switches to it, discarding
/// any partly read frame. EOF or an I/O error on the stream triggers the
/// same accept-with-retry sequence as [`connect`](RemoteReceiver::connect).
///
/// # Example
///
/// ```no_run
/// use wirecall_common::transport::{ReceiverConfig, RemoteReceiver, TcpMessageReceiver};
///
/// let mut receiver = TcpMessageReceiver::new(ReceiverConfig::new("0.0.0.0", 9400));
/// receiver.connect().unwrap();
/// while let Some(message) = receiver.receive().unwrap() {
///     println!("{}", message);
/// }
/// ```
pub struct TcpMessageReceiver {
    config: ReceiverConfig,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    /// Bytes read past the end of the last delivered frame.
    pending: Vec<u8>,
    last_delivered: Option<u32>,
    cancel: CancelHandle,
    metrics: Arc<dyn MetricsSink>,
}

/// Outcome of feeding bytes to the decoder.
enum Feed {
    Delivered(String),
    NeedMore,
    /// Writing the acknowledgement failed; the stream is unusable.
    Broken(io::Error),
}

impl TcpMessageReceiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(config: ReceiverConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        let decoder = FrameDecoder::with_max_body_len(config.max_body_len);
        Self {
            config,
            listener: None,
            stream: None,
            decoder,
            pending: Vec::new(),
            last_delivered: None,
            cancel: CancelHandle::new(),
            metrics,
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Starts listening if not already listening and returns the bound
    /// address. Useful with port 0, so the sender can learn the real port
    /// before [`connect`](RemoteReceiver::connect) waits for it.
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_none() {
            let address = self.config.address();
            let listener = TcpListener::bind(&address).map_err(|e| WirecallError::Connection {
                message: format!("failed to bind to {}", address),
                source: Some(e),
            })?;
            listener.set_nonblocking(true).map_err(|e| WirecallError::Connection {
                message: "failed to make listener non-blocking".to_string(),
                source: Some(e),
            })?;
            info!(address = %address, "Receiver listening");
            self.listener = Some(listener);
        }

        self.local_addr()
            .ok_or_else(|| WirecallError::connection("listener has no local address"))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Sequence number of the last delivered message.
    pub fn last_delivered(&self) -> Option<u32> {
        self.last_delivered
    }

    /// Accepts one pending connection without waiting.
    fn try_accept(&self) -> io::Result<Option<TcpStream>> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(None);
        };

        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true)?;
                debug!(peer = %peer, "Accepted connection");
                Ok(Some(stream))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Accepts with one attempt plus `connect_retry_count` retries.
    ///
    /// Returns `Ok(false)` if `observe_cancel` is set and a cancel request
    /// arrived while waiting; the request is left pending for the caller.
    fn accept_with_retry(&mut self, observe_cancel: bool) -> Result<bool> {
        let attempts = self.config.connect_retry_count.saturating_add(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            if observe_cancel && self.cancel.is_cancelled() {
                return Ok(false);
            }

            match self.try_accept() {
                Ok(Some(stream)) => {
                    self.replace_stream(stream);
                    info!(attempt, "Receiver connected");
                    return Ok(true);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(attempt, error = %e, "Accept attempt failed");
                    last_err = Some(e);
                }
            }

            if attempt < attempts {
                let interval = self.config.connect_retry_interval();
                if !self.sleep(interval, observe_cancel) {
                    return Ok(false);
                }
            }
        }

        Err(WirecallError::Connection {
            message: format!(
                "no sender connected to {} after {} attempts",
                self.config.address(),
                attempts
            ),
            source: last_err,
        })
    }

    /// Installs a new stream, discarding everything tied to the old one.
    fn replace_stream(&mut self, stream: TcpStream) {
        self.close_stream();
        self.stream = Some(stream);
    }

    fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if self.decoder.in_frame() {
            debug!("Discarding partially read frame");
        }
        self.decoder.reset();
        self.pending.clear();
    }

    /// Drops the broken stream and waits for the sender to come back.
    fn reconnect(&mut self, cause: &io::Error) -> Result<bool> {
        warn!(error = %cause, "Connection lost, waiting for sender to reconnect");
        self.close_stream();
        let connected = self.accept_with_retry(true)?;
        if connected {
            self.metrics.reconnected();
        }
        Ok(connected)
    }

    /// Sleeps for `duration` in short slices.
    ///
    /// Returns `false` if `observe_cancel` is set and a cancel request
    /// arrived before the time was up.
    fn sleep(&self, duration: Duration, observe_cancel: bool) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if observe_cancel && self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    /// Runs `bytes` through the decoder, acknowledging every completed
    /// frame, until one frame is delivered or the bytes run out.
    fn feed(&mut self, mut bytes: &[u8]) -> Result<Feed> {
        while !bytes.is_empty() {
            let (consumed, frame) = match self.decoder.step(bytes) {
                Ok(step) => step,
                Err(e) => {
                    warn!(error = %e, "Dropping desynchronized connection");
                    self.close_stream();
                    return Err(e);
                }
            };
            bytes = &bytes[consumed..];

            let Some(frame) = frame else {
                continue;
            };

            if let Err(e) = self.write_ack() {
                return Ok(Feed::Broken(e));
            }

            if self.last_delivered == Some(frame.sequence) {
                debug!(sequence = frame.sequence, "Discarding duplicate frame");
                self.metrics.duplicate_discarded(frame.sequence);
                continue;
            }

            self.last_delivered = Some(frame.sequence);
            self.pending.extend_from_slice(bytes);
            self.metrics.message_received(frame.body.len());
            debug!(sequence = frame.sequence, bytes = frame.body.len(), "Frame delivered");
            return Ok(Feed::Delivered(frame.body));
        }

        Ok(Feed::NeedMore)
    }

    fn write_ack(&mut self) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        let deadline = Instant::now() + ACK_WRITE_TIMEOUT;
        loop {
            match stream.write(&[ACK]) {
                Ok(1) => return Ok(()),
                Ok(_) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::from(io::ErrorKind::TimedOut));
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Reads whatever the stream has right now.
    ///
    /// `Ok(None)` means no bytes are available yet.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        loop {
            match stream.read(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by sender",
                    ))
                }
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl RemoteReceiver for TcpMessageReceiver {
    /// Starts listening if needed and waits for the sender.
    ///
    /// # Errors
    ///
    /// `Connection` if already connected, if binding fails, or if no sender
    /// connected within the retry budget.
    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(WirecallError::connection("receiver is already connected"));
        }
        self.bind()?;
        self.accept_with_retry(false)?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.listener.is_none() && self.stream.is_none() {
            return;
        }
        self.close_stream();
        self.listener = None;
        self.last_delivered = None;
        info!(address = %self.config.address(), "Receiver disconnected");
    }

    /// Blocks until a new message arrives, returning `Ok(None)` once a
    /// cancel request is observed.
    ///
    /// # Errors
    ///
    /// - `Connection` if [`connect`](RemoteReceiver::connect) was never called,
    ///   or if the sender did not come back after a connection loss
    /// - `ProtocolFraming` if the byte stream is malformed; the connection is
    ///   dropped and the next call waits for the sender to reconnect
    fn receive(&mut self) -> Result<Option<String>> {
        if self.listener.is_none() {
            return Err(WirecallError::connection("receiver is not connected"));
        }

        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            if self.cancel.take() {
                debug!("Receive cancelled");
                return Ok(None);
            }

            match self.try_accept() {
                Ok(Some(stream)) => {
                    info!("Sender reconnected, switching to new connection");
                    self.replace_stream(stream);
                    self.metrics.reconnected();
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Checking for pending connections failed"),
            }

            if self.stream.is_none() {
                let cause = io::Error::from(io::ErrorKind::NotConnected);
                if !self.reconnect(&cause)? {
                    continue;
                }
            }

            if !self.pending.is_empty() {
                let pending = std::mem::take(&mut self.pending);
                match self.feed(&pending)? {
                    Feed::Delivered(body) => return Ok(Some(body)),
                    Feed::NeedMore => {}
                    Feed::Broken(e) => {
                        self.reconnect(&e)?;
                        continue;
                    }
                }
            }

            match self.read_available(&mut buf) {
                Ok(Some(n)) => match self.feed(&buf[..n])? {
                    Feed::Delivered(body) => return Ok(Some(body)),
                    Feed::NeedMore => {}
                    Feed::Broken(e) => {
                        self.reconnect(&e)?;
                    }
                },
                Ok(None) => {
                    self.sleep(self.config.receive_poll_interval(), true);
                }
                Err(e) => {
                    self.reconnect(&e)?;
                }
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl Drop for TcpMessageReceiver {
    fn drop(&mut self) {
        self.close_stream();
    }
}
