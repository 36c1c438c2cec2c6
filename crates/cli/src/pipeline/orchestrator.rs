//! Pipeline orchestrator - coordinates all components.
//!
//! 消息源 → 入站队列 → Normalizer → Dispatcher（每车 worker）→ 结果收集。
//! 输入耗尽、达到上报上限、超时或收到关闭信号时依次停止各阶段并汇总统计。

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use contracts::{
    HistoryRecord, Point, RawReport, RoadNode, RoadNodeStore, TrackerBlueprint, VehicleStore,
};
use dispatcher::{DispatcherBuilder, DispatcherConfig, PositionSource, ReportOutcome};
use ingestion::{IngestionPipeline, MockFleetConfig, MockFleetSource, ReplaySource};
use observability::{PipelineMetricsAggregator, ReportObservation};
use store::MemoryStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use traffic::CongestionStats;

use super::{PipelineStats, StopReason};
use crate::error::CliError;

/// Where inbound messages come from
#[derive(Debug, Clone)]
pub enum SourceKind {
    /// JSON Lines file
    Replay {
        path: PathBuf,
        speed: Option<f64>,
    },
    /// Simulated vehicles driving along the configured roads
    Mock {
        vehicles: usize,
        frequency_hz: f64,
        max_ticks: Option<u64>,
    },
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The tracker blueprint
    pub blueprint: TrackerBlueprint,

    /// Road network nodes loaded into the store
    pub nodes: Vec<RoadNode>,

    pub source: SourceKind,

    /// Maximum number of reports to dispatch (None = unlimited)
    pub max_reports: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Channel buffer size between normalizer, dispatcher and outcome collector
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<MemoryStore>,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Store shared by every stage, readable after the run
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Most recent history of one vehicle, capped at `history.trajectory_limit`
    pub async fn trajectory(&self, vehicle_id: &str) -> Result<Vec<HistoryRecord>> {
        let limit = self.config.blueprint.history.trajectory_limit;
        self.store
            .trajectory(vehicle_id, None, limit)
            .await
            .with_context(|| format!("Failed to read trajectory of {vehicle_id}"))
    }

    /// Run the pipeline until input ends, a limit is hit or `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let mut blueprint = self.config.blueprint.clone();

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Road network
        let loaded = self.store.load_nodes(self.config.nodes.clone()).await;
        info!(nodes = loaded, "Road network loaded into store");

        // Setup Ingestion Pipeline
        if matches!(self.config.source, SourceKind::Mock { .. })
            && !blueprint.normalizer.trust_device_clock
        {
            info!("Mock source uses a simulated clock, trusting device timestamps");
            blueprint.normalizer.trust_device_clock = true;
        }

        let mut ingestion = IngestionPipeline::new(&blueprint.ingest, blueprint.normalizer.clone())
            .context("Failed to create ingestion pipeline")?;
        self.register_source(&mut ingestion, &blueprint).await?;

        // Setup Dispatcher
        info!("Setting up dispatcher...");
        let buffer_size = self.config.buffer_size.max(1);
        let (normalized_tx, mut normalized_rx) = mpsc::channel::<RawReport>(buffer_size);
        let (report_tx, report_rx) = mpsc::channel::<RawReport>(buffer_size);
        let (outcome_tx, outcome_rx) = mpsc::channel::<ReportOutcome>(buffer_size);

        let dispatcher_handle = DispatcherBuilder::new(
            DispatcherConfig::from_blueprint(&blueprint),
            self.store(),
            self.store(),
            report_rx,
        )
        .with_outcomes(outcome_tx)
        .build()
        .spawn();
        let collector_handle = spawn_outcome_collector(outcome_rx);

        info!(
            queue_capacity = blueprint.workers.queue_capacity,
            "Dispatcher started"
        );

        // Start Pipeline
        info!("Starting message sources...");
        let normalizer_handle = ingestion
            .spawn_normalizer(normalized_tx)
            .context("Failed to start normalizer")?;
        ingestion.start_all();

        let mut stats = PipelineStats {
            sources: ingestion.source_count(),
            ..Default::default()
        };

        info!(max_reports = ?self.config.max_reports, "Pipeline running");

        let forward = forward_reports(
            &ingestion,
            &mut normalized_rx,
            &report_tx,
            self.config.max_reports,
            &mut stats,
            shutdown,
        );

        // Run with optional timeout
        let stop_reason = match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, forward).await {
                Ok(reason) => reason,
                Err(_) => {
                    warn!(timeout_secs = timeout.as_secs(), "Pipeline timed out");
                    StopReason::Timeout
                }
            },
            None => forward.await,
        };
        stats.stop_reason = stop_reason;

        // Shutdown
        info!(reason = ?stop_reason, "Shutting down pipeline...");
        ingestion.stop_all();
        ingestion.close();

        // Dropping the receiver stops a normalizer blocked on send
        drop(normalized_rx);
        match tokio::time::timeout(Duration::from_secs(5), normalizer_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Normalizer task failed"),
            Err(_) => warn!("Normalizer did not stop within 5s"),
        }

        // Closing the report channel lets every worker drain its queue
        drop(report_tx);
        match tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await {
            Ok(Ok(summary)) => {
                stats.vehicles = summary.vehicles();
                stats.workers = summary.totals();
            }
            Ok(Err(e)) => {
                return Err(CliError::pipeline_execution(format!("dispatcher task failed: {e}")).into());
            }
            Err(_) => warn!("Dispatcher did not drain within 5s"),
        }

        match tokio::time::timeout(Duration::from_secs(5), collector_handle).await {
            Ok(Ok(aggregator)) => stats.report_metrics = aggregator,
            Ok(Err(e)) => warn!(error = %e, "Outcome collector failed"),
            Err(_) => warn!("Outcome collector did not finish within 5s"),
        }

        stats.ingestion = ingestion.metrics().snapshot();
        stats.messages_received = stats.ingestion.messages_received;
        stats.reports_normalized = stats.ingestion.reports_normalized;

        let congestion = CongestionStats::new(self.store(), self.store(), blueprint.traffic.clone());
        match congestion.overview(None).await {
            Ok(overview) => stats.congestion = Some(overview),
            Err(e) => warn!(error = %e, "Failed to build congestion overview"),
        }

        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            reports_per_sec = format!("{:.2}", stats.reports_per_sec()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    async fn register_source(
        &self,
        ingestion: &mut IngestionPipeline,
        blueprint: &TrackerBlueprint,
    ) -> Result<()> {
        match &self.config.source {
            SourceKind::Replay { path, speed } => {
                let source = ReplaySource::from_path(path, *speed)
                    .with_context(|| format!("Failed to load replay file {}", path.display()))?;
                info!(path = %path.display(), entries = source.len(), "Running in REPLAY mode");
                ingestion.register_source(Box::new(source));
            }
            SourceKind::Mock {
                vehicles,
                frequency_hz,
                max_ticks,
            } => {
                let mut config = MockFleetConfig {
                    vehicles: *vehicles,
                    frequency_hz: *frequency_hz,
                    max_ticks: *max_ticks,
                    topic_pattern: blueprint.ingest.topic_pattern.clone(),
                    ..Default::default()
                };
                let routes = road_routes(&self.store).await?;
                if routes.is_empty() {
                    warn!("No road with two or more nodes, mock vehicles use the default route");
                } else {
                    config.routes = routes;
                }
                info!(
                    vehicles = config.vehicles,
                    routes = config.routes.len(),
                    "Running in MOCK mode"
                );
                ingestion.register_source(Box::new(MockFleetSource::new(config)));
            }
        }
        Ok(())
    }
}

/// One polyline per road, in node order
async fn road_routes(store: &MemoryStore) -> Result<Vec<Vec<Point>>> {
    let mut routes = Vec::new();
    for road_id in store.road_ids().await? {
        let nodes = store.nodes_for_road_ordered(&road_id).await?;
        if nodes.len() >= 2 {
            routes.push(nodes.iter().map(RoadNode::position).collect());
        }
    }
    Ok(routes)
}

/// Hand normalized reports to the dispatcher
async fn forward_reports<F>(
    ingestion: &IngestionPipeline,
    normalized_rx: &mut mpsc::Receiver<RawReport>,
    report_tx: &mpsc::Sender<RawReport>,
    max_reports: Option<u64>,
    stats: &mut PipelineStats,
    shutdown: F,
) -> StopReason
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut draining = false;

    loop {
        let report = tokio::select! {
            received = normalized_rx.recv() => match received {
                Some(report) => report,
                None => return StopReason::InputExhausted,
            },
            _ = ingestion.wait_sources_idle(Duration::from_millis(50)), if !draining => {
                // 源已全部结束，关闭队列；normalizer 取完剩余消息后退出
                debug!("All sources idle, draining inbound queue");
                ingestion.close();
                draining = true;
                continue;
            }
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping pipeline...");
                return StopReason::Shutdown;
            }
        };

        observability::record_report_normalized(report.vehicle_type.as_str());

        let latency_ms = (Utc::now() - report.received_at).num_milliseconds() as f64;
        observability::record_ingest_latency_ms(latency_ms.max(0.0));

        let sent = report_tx.send(report).await.is_ok();
        observability::record_report_dispatched(sent);
        if !sent {
            warn!("Dispatcher channel closed");
            return StopReason::ConsumerClosed;
        }
        stats.reports_dispatched += 1;

        // Check max reports limit
        if let Some(max) = max_reports {
            if stats.reports_dispatched >= max {
                info!(reports = stats.reports_dispatched, "Reached max reports limit");
                return StopReason::MaxReports;
            }
        }
    }
}

/// Fold every worker outcome into the in-memory aggregator
fn spawn_outcome_collector(
    mut outcome_rx: mpsc::Receiver<ReportOutcome>,
) -> JoinHandle<PipelineMetricsAggregator> {
    tokio::spawn(async move {
        let mut aggregator = PipelineMetricsAggregator::new();
        let mut vehicles = std::collections::HashSet::new();

        while let Some(outcome) = outcome_rx.recv().await {
            if vehicles.insert(outcome.vehicle_id.clone()) {
                observability::record_active_vehicles(vehicles.len());
            }

            let obs = observation(&outcome);
            observability::record_report_processed(&obs);
            aggregator.update(&obs);
        }

        aggregator
    })
}

fn observation(outcome: &ReportOutcome) -> ReportObservation<'_> {
    ReportObservation {
        filter: &outcome.filter,
        matching: outcome.matching.as_ref(),
        fallback: matches!(outcome.adopted, Some((_, PositionSource::Filtered))),
        speed: outcome.speed,
        traffic: outcome.traffic.as_ref().map(|t| (t.level, t.density)),
        store_failures: outcome.store_failures.len(),
    }
}
