//! Ingestion metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub use contracts::DropPolicy;

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total messages offered to the queue
    pub messages_received: AtomicU64,

    /// Dropped because the queue was full
    pub messages_dropped: AtomicU64,

    /// Topic matched by no active subscription
    pub unsubscribed: AtomicU64,

    /// Topic not matching the id pattern
    pub topic_mismatches: AtomicU64,

    /// Payload decode failures
    pub decode_failures: AtomicU64,

    /// Embedded id disagrees with the topic
    pub id_mismatches: AtomicU64,

    /// Reports handed downstream
    pub reports_normalized: AtomicU64,

    /// Current queue length
    pub queue_len: AtomicUsize,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_received_total").increment(1);
    }

    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_dropped_total", "reason" => "queue_full").increment(1);
    }

    pub fn record_unsubscribed(&self) {
        self.unsubscribed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_dropped_total", "reason" => "unsubscribed").increment(1);
    }

    pub fn record_topic_mismatch(&self) {
        self.topic_mismatches.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_malformed_total", "kind" => "topic").increment(1);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_malformed_total", "kind" => "decode").increment(1);
    }

    pub fn record_id_mismatch(&self) {
        self.id_mismatches.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_malformed_total", "kind" => "id_mismatch").increment(1);
    }

    pub fn record_normalized(&self) {
        self.reports_normalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        metrics::gauge!("ingest_queue_len").set(len as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            unsubscribed: self.unsubscribed.load(Ordering::Relaxed),
            topic_mismatches: self.topic_mismatches.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            id_mismatches: self.id_mismatches.load(Ordering::Relaxed),
            reports_normalized: self.reports_normalized.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub unsubscribed: u64,
    pub topic_mismatches: u64,
    pub decode_failures: u64,
    pub id_mismatches: u64,
    pub reports_normalized: u64,
    pub queue_len: usize,
}

impl MetricsSnapshot {
    /// Messages rejected by the normalizer
    pub fn malformed(&self) -> u64 {
        self.topic_mismatches + self.decode_failures + self.id_mismatches
    }
}
