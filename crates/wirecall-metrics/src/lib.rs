//! wirecall Metrics Sinks
//!
//! This crate provides the observability hooks used by the wirecall transports
//! and the method invocation layer. Every hook is fire-and-forget: a sink can
//! count, aggregate, or drop events, but it never influences control flow.
//!
//! # Architecture
//!
//! - [`MetricsSink`]: Trait the sender, receiver and invoker report into
//! - [`NoopMetrics`]: Sink that discards every event (the default)
//! - [`TransportMetrics`]: Lock-free counters backed by a [`MetricsRegistry`]
//! - [`MetricsSnapshot`]: Serializable snapshot of the current counters
//!
//! # Usage Example
//!
//! ```rust
//! use wirecall_metrics::{MetricsSink, TransportMetrics};
//! use std::time::Instant;
//!
//! let metrics = TransportMetrics::new();
//!
//! metrics.message_sent(42);
//! metrics.duplicate_discarded(7);
//!
//! let start = Instant::now();
//! // ... run a remote invocation ...
//! metrics.invocation_completed("Add", start, true);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.messages_sent, 1);
//! assert_eq!(snapshot.duplicates_discarded, 1);
//! ```
//!
//! # Thread Safety
//!
//! Sinks are shared across threads behind `Arc<dyn MetricsSink>`. Counter
//! updates use relaxed atomics; the per-method table sits behind an `RwLock`.

mod collector;
mod registry;
mod snapshot;

pub use collector::{MetricsSink, NoopMetrics, TransportMetrics};
pub use registry::MetricsRegistry;
pub use snapshot::{MethodMetrics, MetricsSnapshot};
