//! VehicleHandle - one worker task per vehicle with an isolated queue

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{FilterConfig, RawReport, RoadNodeStore, VehicleId, VehicleStore};
use location_filter::LocationFilter;

use crate::error::DispatcherError;
use crate::metrics::WorkerMetrics;
use crate::processor::{ReportOutcome, ReportProcessor};

/// Handle to a running vehicle worker
///
/// worker 独占该车辆的过滤窗口，按接收顺序串行处理。
pub struct VehicleHandle {
    vehicle_id: VehicleId,
    /// Channel to send reports to worker
    tx: mpsc::Sender<RawReport>,
    /// Shared metrics
    metrics: Arc<WorkerMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl VehicleHandle {
    /// Create a new VehicleHandle and spawn the worker task
    ///
    /// `outcomes` 可选：每处理完一条上报尝试发送一次结果，满了就丢弃。
    pub fn spawn<R, V>(
        vehicle_id: VehicleId,
        processor: Arc<ReportProcessor<R, V>>,
        filter_config: &FilterConfig,
        queue_capacity: usize,
        outcomes: Option<mpsc::Sender<ReportOutcome>>,
    ) -> Self
    where
        R: RoadNodeStore + Send + Sync + 'static,
        V: VehicleStore + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(WorkerMetrics::new());
        let filter = LocationFilter::new(filter_config);

        let worker_metrics = Arc::clone(&metrics);
        let worker_id = vehicle_id.clone();

        let worker_handle = tokio::spawn(async move {
            vehicle_worker(worker_id, filter, processor, rx, worker_metrics, outcomes).await;
        });

        Self {
            vehicle_id,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// Send a report to the worker (non-blocking)
    ///
    /// 队列满时该条上报被丢弃并计数，不阻塞调用方
    pub fn try_send(&self, report: RawReport) -> Result<(), DispatcherError> {
        match self.tx.try_send(report) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(r)) => {
                self.metrics.inc_dropped();
                metrics::counter!("worker_dropped_total").increment(1);
                warn!(
                    vehicle_id = %self.vehicle_id,
                    timestamp = r.timestamp,
                    "Queue full, report dropped"
                );
                Err(DispatcherError::queue_full(self.vehicle_id.as_str(), r.timestamp))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(vehicle_id = %self.vehicle_id, "Vehicle worker closed unexpectedly");
                Err(DispatcherError::WorkerClosed {
                    vehicle_id: self.vehicle_id.to_string(),
                })
            }
        }
    }

    /// Drain the queue and stop the worker
    #[instrument(name = "vehicle_handle_shutdown", skip(self), fields(vehicle_id = %self.vehicle_id))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(vehicle_id = %self.vehicle_id, error = ?e, "Worker task panicked");
        }
        debug!(vehicle_id = %self.vehicle_id, "VehicleHandle shutdown complete");
    }
}

/// Worker task that owns one vehicle's filter window
#[instrument(
    name = "vehicle_worker_loop",
    skip(filter, processor, rx, metrics, outcomes),
    fields(vehicle_id = %vehicle_id)
)]
async fn vehicle_worker<R, V>(
    vehicle_id: VehicleId,
    mut filter: LocationFilter,
    processor: Arc<ReportProcessor<R, V>>,
    mut rx: mpsc::Receiver<RawReport>,
    metrics: Arc<WorkerMetrics>,
    outcomes: Option<mpsc::Sender<ReportOutcome>>,
) where
    R: RoadNodeStore + Send + Sync + 'static,
    V: VehicleStore + Send + Sync + 'static,
{
    debug!(vehicle_id = %vehicle_id, "Vehicle worker started");

    while let Some(report) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        let outcome = processor.process(&mut filter, report).await;
        metrics.record(&outcome);

        if let Some(tx) = &outcomes {
            // 观察通道满时不阻塞处理
            let _ = tx.try_send(outcome);
        }
    }

    debug!(
        vehicle_id = %vehicle_id,
        processed = metrics.processed(),
        window = filter.len(),
        "Vehicle worker stopped"
    );
}
