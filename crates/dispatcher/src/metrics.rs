//! Per-vehicle worker metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::processor::ReportOutcome;

/// Metrics for a single vehicle worker
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Reports taken off the queue
    processed: AtomicU64,
    /// Reports dropped by a filter gate
    rejected: AtomicU64,
    /// State updated with the matched position
    matched: AtomicU64,
    /// State updated with the filtered position
    fallback: AtomicU64,
    /// Store calls that failed or timed out
    store_failures: AtomicU64,
    /// Reports dropped due to full queue
    dropped: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_failures(&self) -> u64 {
        self.store_failures.load(Ordering::Relaxed)
    }

    /// Fold one processed report into the counters
    pub fn record(&self, outcome: &ReportOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if outcome.filter.position().is_none() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        match outcome.adopted {
            Some((_, crate::PositionSource::Matched)) => {
                self.matched.fetch_add(1, Ordering::Relaxed);
            }
            Some((_, crate::PositionSource::Filtered)) => {
                self.fallback.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
        self.store_failures
            .fetch_add(outcome.store_failures.len() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            queue_len: self.queue_len(),
            processed: self.processed(),
            rejected: self.rejected.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            store_failures: self.store_failures(),
            dropped: self.dropped(),
        }
    }
}

/// Snapshot of worker metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub queue_len: usize,
    pub processed: u64,
    pub rejected: u64,
    pub matched: u64,
    pub fallback: u64,
    pub store_failures: u64,
    pub dropped: u64,
}

impl std::ops::Add for WorkerSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            queue_len: self.queue_len + other.queue_len,
            processed: self.processed + other.processed,
            rejected: self.rejected + other.rejected,
            matched: self.matched + other.matched,
            fallback: self.fallback + other.fallback,
            store_failures: self.store_failures + other.store_failures,
            dropped: self.dropped + other.dropped,
        }
    }
}
