// Copyright 2025 wirecall Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::registry::MetricsRegistry;
use crate::snapshot::MetricsSnapshot;
use std::sync::Arc;
use std::time::Instant;

/// Observability hooks reported by the sender, receiver and invoker.
///
/// Every method is fire-and-forget: implementations must not block for long
/// and must not panic, and nothing they do can change the outcome of the
/// operation that reported the event.
///
/// All hooks have empty default bodies so a sink only overrides what it
/// cares about.
///
/// # Example
///
/// ```rust
/// use wirecall_metrics::MetricsSink;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// #[derive(Default)]
/// struct ResendCounter(AtomicU64);
///
/// impl MetricsSink for ResendCounter {
///     fn message_resent(&self, _sequence: u32) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let counter = ResendCounter::default();
/// counter.message_resent(3);
/// counter.message_sent(128); // ignored by this sink
/// assert_eq!(counter.0.load(Ordering::Relaxed), 1);
/// ```
pub trait MetricsSink: Send + Sync {
    /// A message body of `bytes` length was sent and acknowledged.
    fn message_sent(&self, _bytes: usize) {}

    /// A message body of `bytes` length was delivered to the caller.
    fn message_received(&self, _bytes: usize) {}

    /// The frame with `sequence` was re-sent after a transport failure.
    fn message_resent(&self, _sequence: u32) {}

    /// A retransmitted frame with `sequence` was acknowledged but dropped.
    fn duplicate_discarded(&self, _sequence: u32) {}

    /// A connection was re-established after a transport failure.
    fn reconnected(&self) {}

    /// A remote method invocation finished.
    fn invocation_completed(&self, _method: &str, _start_time: Instant, _success: bool) {}
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Metrics sink that aggregates events into a [`MetricsRegistry`].
///
/// Cheap to clone: clones share the same registry.
///
/// # Example
///
/// ```rust
/// use wirecall_metrics::{MetricsSink, TransportMetrics};
/// use std::time::Instant;
///
/// let metrics = TransportMetrics::new();
/// metrics.invocation_completed("Add", Instant::now(), true);
/// metrics.invocation_completed("Add", Instant::now(), false);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.methods["Add"].call_count, 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransportMetrics {
    registry: Arc<MetricsRegistry>,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink backed by an existing registry.
    ///
    /// Useful for sharing one registry between the sending and receiving
    /// side of a process.
    pub fn with_registry(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }
}

impl MetricsSink for TransportMetrics {
    fn message_sent(&self, bytes: usize) {
        self.registry.record_sent(bytes);
    }

    fn message_received(&self, bytes: usize) {
        self.registry.record_received(bytes);
    }

    fn message_resent(&self, _sequence: u32) {
        self.registry.record_resent();
    }

    fn duplicate_discarded(&self, _sequence: u32) {
        self.registry.record_duplicate();
    }

    fn reconnected(&self) {
        self.registry.record_reconnect();
    }

    fn invocation_completed(&self, method: &str, start_time: Instant, success: bool) {
        let latency_us = start_time.elapsed().as_micros() as u64;
        self.registry.record_method_call(method, latency_us, success);
    }
}
