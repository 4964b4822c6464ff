//! wirecall Transport Layer
//!
//! This module moves message text between processes.
//!
//! # Architecture
//!
//! - **Framing**: `[0x02][u32 LE sequence][u64 LE length][UTF-8 body][0x03]`
//! - **Reliability**: every frame is acknowledged with a single `0x06` byte;
//!   the sender reconnects and re-sends the same frame once on a transport
//!   fault, and the receiver drops a frame whose sequence number equals the
//!   last one it delivered
//! - **Threading**: all calls are blocking and run on the caller's thread.
//!   The only state shared between threads is the [`CancelHandle`] flag.
//!
//! # Components
//!
//! - **[`RemoteSender`]** / **[`RemoteReceiver`]**: the transport contract the
//!   invoker is written against
//! - **[`FrameCodec`]** / **[`FrameDecoder`]**: whole-frame and incremental
//!   frame parsing
//! - **[`TcpMessageSender`]** / **[`TcpMessageReceiver`]**: the TCP transport
//! - **[`CompressingSender`]** / **[`DecompressingReceiver`]**: gzip + base64
//!   decorators over any transport
//!
//! # Example
//!
//! ```no_run
//! use wirecall_common::transport::{
//!     ReceiverConfig, RemoteReceiver, RemoteSender, SenderConfig, TcpMessageReceiver,
//!     TcpMessageSender,
//! };
//!
//! let mut receiver = TcpMessageReceiver::new(ReceiverConfig::new("127.0.0.1", 9400));
//! receiver.bind().unwrap();
//!
//! let mut sender = TcpMessageSender::new(SenderConfig::new("127.0.0.1", 9400));
//! sender.connect().unwrap();
//! receiver.connect().unwrap();
//!
//! sender.send("hello").unwrap();
//! assert_eq!(receiver.receive().unwrap().as_deref(), Some("hello"));
//! ```

pub mod compression;
pub mod config;
pub mod frame;
pub mod receiver;
pub mod sender;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::protocol::error::Result;

pub use compression::{CompressingSender, DecompressingReceiver};
pub use config::{CompressionConfig, ReceiverConfig, SenderConfig};
pub use frame::{DecodeState, Frame, FrameCodec, FrameDecoder, ACK, END_DELIMITER, START_DELIMITER};
pub use receiver::TcpMessageReceiver;
pub use sender::TcpMessageSender;

/// Outbound half of a transport.
pub trait RemoteSender: Send {
    /// Establishes the connection, retrying per the transport's policy.
    fn connect(&mut self) -> Result<()>;

    /// Closes the connection. Does nothing when not connected.
    fn disconnect(&mut self);

    /// Delivers one message, blocking until the peer has acknowledged it.
    fn send(&mut self, message: &str) -> Result<()>;
}

/// Inbound half of a transport.
pub trait RemoteReceiver: Send {
    fn connect(&mut self) -> Result<()>;

    fn disconnect(&mut self);

    /// Blocks until a message arrives or the receive is cancelled.
    ///
    /// Returns `Ok(None)` when cancelled.
    fn receive(&mut self) -> Result<Option<String>>;

    /// Handle that cancels [`receive`](Self::receive) from another thread.
    fn cancel_handle(&self) -> CancelHandle;

    fn cancel_receive(&self) {
        self.cancel_handle().cancel();
    }
}

/// Cross-thread cancellation flag for a blocking receive.
///
/// A cancel request stays pending until a receive observes it, so a cancel
/// issued just before `receive` is called is not lost.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    requested: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Observes and clears a pending request.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}
