use crate::snapshot::{MethodMetrics, MetricsSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

/// Upper bound on distinct method names tracked by the registry.
///
/// Calls to methods beyond this limit still count towards the transport
/// totals but do not get their own entry.
const MAX_TRACKED_METHODS: usize = 1000;

/// Per-method counters.
///
/// Only the map holding these is locked; the counters themselves are atomic
/// so concurrent recorders holding a read lock never block each other.
#[derive(Debug, Default)]
struct MethodCounters {
    call_count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
}

impl MethodCounters {
    fn record(&self, latency_us: u64, success: bool) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.max_latency_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    fn to_metrics(&self) -> MethodMetrics {
        let call_count = self.call_count.load(Ordering::Relaxed);
        let total = self.total_latency_us.load(Ordering::Relaxed);
        MethodMetrics {
            call_count,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            avg_latency_us: if call_count == 0 { 0 } else { total / call_count },
            max_latency_us: self.max_latency_us.load(Ordering::Relaxed),
        }
    }
}

/// Thread-safe storage for transport and invocation metrics.
///
/// Transport counters are plain atomics. Method metrics live in a map behind
/// an `RwLock`: the write lock is only taken the first time a method name is
/// seen.
#[derive(Debug)]
pub struct MetricsRegistry {
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    messages_resent: AtomicU64,
    duplicates_discarded: AtomicU64,
    reconnects: AtomicU64,
    methods: RwLock<HashMap<String, MethodCounters>>,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_resent: AtomicU64::new(0),
            duplicates_discarded: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            methods: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_resent(&self) {
        self.messages_resent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one completed invocation of `method`.
    ///
    /// A poisoned lock drops the sample rather than propagating the panic.
    pub fn record_method_call(&self, method: &str, latency_us: u64, success: bool) {
        if let Ok(methods) = self.methods.read() {
            if let Some(counters) = methods.get(method) {
                counters.record(latency_us, success);
                return;
            }
        }

        let Ok(mut methods) = self.methods.write() else {
            return;
        };
        if !methods.contains_key(method) && methods.len() >= MAX_TRACKED_METHODS {
            return;
        }
        methods
            .entry(method.to_string())
            .or_default()
            .record(latency_us, success);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::new(self.uptime_ms());
        snapshot.messages_sent = self.messages_sent.load(Ordering::Relaxed);
        snapshot.bytes_sent = self.bytes_sent.load(Ordering::Relaxed);
        snapshot.messages_received = self.messages_received.load(Ordering::Relaxed);
        snapshot.bytes_received = self.bytes_received.load(Ordering::Relaxed);
        snapshot.messages_resent = self.messages_resent.load(Ordering::Relaxed);
        snapshot.duplicates_discarded = self.duplicates_discarded.load(Ordering::Relaxed);
        snapshot.reconnects = self.reconnects.load(Ordering::Relaxed);

        if let Ok(methods) = self.methods.read() {
            snapshot.methods = methods
                .iter()
                .map(|(name, counters)| (name.clone(), counters.to_metrics()))
                .collect();
        }

        snapshot
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
