//! Dispatcher - routes normalized reports to per-vehicle workers

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{
    FilterConfig, RawReport, RoadNodeStore, TrackerBlueprint, VehicleId, VehicleStore,
};
use map_matcher::MapMatcher;
use traffic::TrafficAggregator;

use crate::handle::VehicleHandle;
use crate::metrics::WorkerSnapshot;
use crate::processor::{ProcessorConfig, ReportOutcome, ReportProcessor};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub filter: FilterConfig,
    pub matcher: contracts::MatcherConfig,
    pub traffic: contracts::TrafficConfig,
    pub processor: ProcessorConfig,
    /// 每辆车的队列容量
    pub queue_capacity: usize,
}

impl DispatcherConfig {
    pub fn from_blueprint(blueprint: &TrackerBlueprint) -> Self {
        Self {
            filter: blueprint.filter.clone(),
            matcher: blueprint.matcher.clone(),
            traffic: blueprint.traffic.clone(),
            processor: ProcessorConfig::from_blueprint(blueprint),
            queue_capacity: blueprint.workers.queue_capacity,
        }
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder<R, V> {
    config: DispatcherConfig,
    roads: Arc<R>,
    vehicles: Arc<V>,
    input_rx: mpsc::Receiver<RawReport>,
    outcomes: Option<mpsc::Sender<ReportOutcome>>,
}

impl<R, V> DispatcherBuilder<R, V>
where
    R: RoadNodeStore + Send + Sync + 'static,
    V: VehicleStore + Send + Sync + 'static,
{
    pub fn new(
        config: DispatcherConfig,
        roads: Arc<R>,
        vehicles: Arc<V>,
        input_rx: mpsc::Receiver<RawReport>,
    ) -> Self {
        Self {
            config,
            roads,
            vehicles,
            input_rx,
            outcomes: None,
        }
    }

    /// Observe every processed report (best effort, never blocks a worker)
    pub fn with_outcomes(mut self, tx: mpsc::Sender<ReportOutcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub fn build(self) -> Dispatcher<R, V> {
        let matcher = MapMatcher::new(Arc::clone(&self.roads), self.config.matcher.clone());
        let aggregator = TrafficAggregator::new(
            Arc::clone(&self.roads),
            Arc::clone(&self.vehicles),
            self.config.traffic.clone(),
        );
        let processor = ReportProcessor::new(
            self.vehicles,
            matcher,
            aggregator,
            self.config.processor.clone(),
        );

        Dispatcher {
            processor: Arc::new(processor),
            filter: self.config.filter,
            queue_capacity: self.config.queue_capacity,
            handles: HashMap::new(),
            input_rx: self.input_rx,
            outcomes: self.outcomes,
        }
    }
}

/// Summary returned when the dispatcher stops
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    /// Reports received from the input channel
    pub reports: u64,
    pub workers: Vec<(VehicleId, WorkerSnapshot)>,
}

impl DispatchSummary {
    pub fn totals(&self) -> WorkerSnapshot {
        self.workers
            .iter()
            .fold(WorkerSnapshot::default(), |acc, (_, s)| acc + *s)
    }

    pub fn vehicles(&self) -> usize {
        self.workers.len()
    }
}

/// Routes each report to the worker owning its vehicle id
///
/// 首次出现的车辆按需创建 worker；不同车辆并发处理，同一车辆严格串行。
pub struct Dispatcher<R, V> {
    processor: Arc<ReportProcessor<R, V>>,
    filter: FilterConfig,
    queue_capacity: usize,
    handles: HashMap<VehicleId, VehicleHandle>,
    input_rx: mpsc::Receiver<RawReport>,
    outcomes: Option<mpsc::Sender<ReportOutcome>>,
}

impl<R, V> Dispatcher<R, V>
where
    R: RoadNodeStore + Send + Sync + 'static,
    V: VehicleStore + Send + Sync + 'static,
{
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Run the dispatcher main loop
    ///
    /// Returns when the input channel is closed, after every worker drained its queue.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchSummary {
        info!(queue_capacity = self.queue_capacity, "Dispatcher started");

        let mut report_count: u64 = 0;

        while let Some(report) = self.input_rx.recv().await {
            report_count += 1;
            self.dispatch(report);

            if report_count % 100 == 0 {
                debug!(
                    reports = report_count,
                    workers = self.handles.len(),
                    "Dispatcher progress"
                );
            }
        }

        info!(
            reports = report_count,
            workers = self.handles.len(),
            "Dispatcher input closed, draining workers"
        );

        let workers = Self::shutdown_handles(self.handles).await;

        info!("Dispatcher shutdown complete");
        DispatchSummary {
            reports: report_count,
            workers,
        }
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<DispatchSummary> {
        tokio::spawn(self.run())
    }

    fn dispatch(&mut self, report: RawReport) {
        let handle = self
            .handles
            .entry(report.vehicle_id.clone())
            .or_insert_with(|| {
                debug!(vehicle_id = %report.vehicle_id, "Spawning vehicle worker");
                metrics::gauge!("vehicle_workers").increment(1.0);
                VehicleHandle::spawn(
                    report.vehicle_id.clone(),
                    Arc::clone(&self.processor),
                    &self.filter,
                    self.queue_capacity,
                    self.outcomes.clone(),
                )
            });
        // 失败已在 handle 内计数并记录日志
        let _ = handle.try_send(report);
    }

    async fn shutdown_handles(
        handles: HashMap<VehicleId, VehicleHandle>,
    ) -> Vec<(VehicleId, WorkerSnapshot)> {
        let mut workers = Vec::with_capacity(handles.len());
        for (vehicle_id, handle) in handles {
            let metrics = Arc::clone(handle.metrics());
            handle.shutdown().await;
            workers.push((vehicle_id, metrics.snapshot()));
        }
        workers.sort_by(|a, b| a.0.cmp(&b.0));
        workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{RoadNode, VehicleType};
    use store::MemoryStore;

    fn report(id: &str, x: f64, timestamp: i64) -> RawReport {
        RawReport {
            vehicle_id: id.into(),
            vehicle_type: VehicleType::infer_from_id(id),
            valid: true,
            x,
            y: 10.0,
            distance: 0.0,
            angle: 0.0,
            direction: "东".into(),
            timestamp,
            events: 0,
            rssi: Some(-60),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatcher_one_worker_per_vehicle() {
        let store = Arc::new(MemoryStore::with_nodes(
            (0..4)
                .map(|i| RoadNode::road(i, i as f64 * 25.0 + 5.0, 10.0, Some("r1")))
                .collect(),
        ));
        let (input_tx, input_rx) = mpsc::channel(64);
        let dispatcher = DispatcherBuilder::new(
            DispatcherConfig::from_blueprint(&TrackerBlueprint::default()),
            Arc::clone(&store),
            Arc::clone(&store),
            input_rx,
        )
        .build();
        let handle = dispatcher.spawn();

        for t in 0..6 {
            input_tx.send(report("car_1", 10.0 + t as f64, 100 + t)).await.unwrap();
            input_tx.send(report("esp32_2", 60.0 - t as f64, 100 + t)).await.unwrap();
        }
        drop(input_tx);

        let summary = handle.await.unwrap();
        assert_eq!(summary.reports, 12);
        assert_eq!(summary.vehicles(), 2);
        assert_eq!(summary.totals().processed, 12);
        assert_eq!(summary.totals().dropped, 0);

        assert_eq!(store.history_len("car_1").await, 6);
        assert_eq!(store.history_len("esp32_2").await, 6);
        assert_eq!(store.vehicle_count().await, 2);
    }

    #[tokio::test]
    async fn test_dispatcher_reports_outcomes() {
        let store = Arc::new(MemoryStore::new());
        let (input_tx, input_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let handle = DispatcherBuilder::new(
            DispatcherConfig::from_blueprint(&TrackerBlueprint::default()),
            Arc::clone(&store),
            Arc::clone(&store),
            input_rx,
        )
        .with_outcomes(out_tx)
        .build()
        .spawn();

        input_tx.send(report("car_9", 40.0, 1)).await.unwrap();
        drop(input_tx);
        handle.await.unwrap();

        let outcome = out_rx.recv().await.unwrap();
        assert_eq!(outcome.vehicle_id, "car_9");
        assert!(outcome.adopted.is_some());
        assert!(out_rx.recv().await.is_none());
    }
}
