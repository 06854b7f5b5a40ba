//! # Metrics
//!
//! Counters for scanning and decoding activity. Cloning a `Metrics` shares
//! the same counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    // Scan metrics
    records_scanned: AtomicU64,
    records_indexed: AtomicU64,
    records_skipped: AtomicU64,
    bytes_scanned: AtomicU64,
    truncated_records: AtomicU64,
    scans_completed: AtomicU64,
    scans_cancelled: AtomicU64,

    // Decode metrics
    decode_requests: AtomicU64,
    decode_cache_hits: AtomicU64,
    decode_cache_misses: AtomicU64,
    decode_failures: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a record header read by the scanner
    pub fn record_scanned(&self, bytes: u64) {
        self.inner.records_scanned.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_scanned.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a record that reached the index
    pub fn record_indexed(&self) {
        self.inner.records_indexed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an untracked record the scanner skipped over
    pub fn record_skipped(&self) {
        self.inner.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_truncated(&self) {
        self.inner.truncated_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_completed(&self) {
        self.inner.scans_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_cancelled(&self) {
        self.inner.scans_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decode lookup and whether the cache answered it
    pub fn record_decode(&self, cache_hit: bool) {
        self.inner.decode_requests.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.inner.decode_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.decode_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_decode_failure(&self) {
        self.inner.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_scanned: self.inner.records_scanned.load(Ordering::Relaxed),
            records_indexed: self.inner.records_indexed.load(Ordering::Relaxed),
            records_skipped: self.inner.records_skipped.load(Ordering::Relaxed),
            bytes_scanned: self.inner.bytes_scanned.load(Ordering::Relaxed),
            truncated_records: self.inner.truncated_records.load(Ordering::Relaxed),
            scans_completed: self.inner.scans_completed.load(Ordering::Relaxed),
            scans_cancelled: self.inner.scans_cancelled.load(Ordering::Relaxed),
            decode_requests: self.inner.decode_requests.load(Ordering::Relaxed),
            decode_cache_hits: self.inner.decode_cache_hits.load(Ordering::Relaxed),
            decode_cache_misses: self.inner.decode_cache_misses.load(Ordering::Relaxed),
            decode_failures: self.inner.decode_failures.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_scanned: u64,
    pub records_indexed: u64,
    pub records_skipped: u64,
    pub bytes_scanned: u64,
    pub truncated_records: u64,
    pub scans_completed: u64,
    pub scans_cancelled: u64,
    pub decode_requests: u64,
    pub decode_cache_hits: u64,
    pub decode_cache_misses: u64,
    pub decode_failures: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_rate(&self) -> f64 {
        if self.decode_requests == 0 {
            0.0
        } else {
            self.decode_cache_hits as f64 / self.decode_requests as f64
        }
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    /// Start new timer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer and log duration
    pub fn stop(self) -> Duration {
        let duration = self.elapsed();
        tracing::debug!(
            name = %self.name,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
        duration
    }
}
