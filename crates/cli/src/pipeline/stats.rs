//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::WorkerSnapshot;
use ingestion::MetricsSnapshot;
use observability::PipelineMetricsAggregator;
use traffic::CongestionOverview;

/// Why the forwarding loop ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Sources finished and the inbound queue is drained
    #[default]
    InputExhausted,
    MaxReports,
    Timeout,
    /// Ctrl-C / SIGTERM
    Shutdown,
    /// Dispatcher input closed unexpectedly
    ConsumerClosed,
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Messages offered to the inbound queue, queue-full drops included
    pub messages_received: u64,

    /// Messages that produced a report
    pub reports_normalized: u64,

    /// Reports handed to the dispatcher
    pub reports_dispatched: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    pub stop_reason: StopReason,

    /// Number of message sources registered
    pub sources: usize,

    /// Number of vehicles that got a worker
    pub vehicles: usize,

    /// Ingestion counters at shutdown
    pub ingestion: MetricsSnapshot,

    /// Sum over all vehicle workers
    pub workers: WorkerSnapshot,

    /// Per-report aggregation
    pub report_metrics: PipelineMetricsAggregator,

    /// Road congestion at shutdown
    pub congestion: Option<CongestionOverview>,
}

impl PipelineStats {
    /// Dispatched reports per second
    pub fn reports_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.reports_dispatched as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Reports lost before a worker saw them, as percentage
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.ingestion.messages_dropped + self.workers.dropped;
        let total = self.messages_received;
        if total > 0 {
            (dropped as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Stopped by: {:?}", self.stop_reason);
        println!("   ├─ Messages received: {}", self.messages_received);
        println!("   ├─ Reports dispatched: {}", self.reports_dispatched);
        println!("   ├─ Reports/s: {:.2}", self.reports_per_sec());
        println!("   ├─ Drop rate: {:.2}%", self.drop_rate());
        println!("   ├─ Sources: {}", self.sources);
        println!("   └─ Vehicles: {}", self.vehicles);

        let ing = &self.ingestion;
        println!("\n📥 Ingestion");
        println!("   ├─ Queue drops: {}", ing.messages_dropped);
        println!("   ├─ Unsubscribed: {}", ing.unsubscribed);
        println!("   ├─ Topic mismatches: {}", ing.topic_mismatches);
        println!("   ├─ Decode failures: {}", ing.decode_failures);
        println!("   └─ Vehicle id mismatches: {}", ing.id_mismatches);

        let w = &self.workers;
        println!("\n🚗 Vehicle Workers");
        println!("   ├─ Processed: {}", w.processed);
        println!("   ├─ Rejected by filter: {}", w.rejected);
        println!("   ├─ Matched position: {}", w.matched);
        println!("   ├─ Filtered position: {}", w.fallback);
        println!("   ├─ Store failures: {}", w.store_failures);
        println!("   └─ Queue drops: {}", w.dropped);

        let summary = self.report_metrics.summary();

        println!("\n📈 Report Metrics");
        println!("   ├─ Match confidence: {}", summary.confidence);
        println!("   ├─ Match distance: {}", summary.match_distance);
        println!("   ├─ Implied speed: {}", summary.speed);
        println!("   └─ Road density: {}", summary.density);

        if !summary.reject_reasons.is_empty() {
            println!("\n⚠️  Reject Reasons");
            for (reason, count) in &summary.reject_reasons {
                println!("   ├─ {}: {}", reason, count);
            }
        }

        if let Some(overview) = &self.congestion {
            println!("\n🛣️  Roads ({})", overview.total_roads);
            for road in &overview.roads {
                println!(
                    "   ├─ {}: {} ({}% congested, {} vehicles, avg speed {:.2})",
                    road.road_id,
                    road.level,
                    road.congestion_percentage,
                    road.vehicles_on_road.len(),
                    road.average_speed
                );
            }
        }

        println!();
    }
}
