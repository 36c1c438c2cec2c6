//! Ingestion Pipeline main entry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use chrono::Utc;
use contracts::{
    ContractError, DevicePayload, DropPolicy, InboundMessage, IngestConfig, MessageCallback,
    MessageSource, NormalizerConfig, RawReport,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};
use crate::normalizer::Normalizer;
use crate::topic::{SubscriptionSet, TopicPattern};

/// Enqueue side of the inbound queue
///
/// 可廉价克隆，交给各消息源的回调使用。入队从不阻塞。
#[derive(Clone)]
pub struct Publisher {
    tx: Sender<InboundMessage>,
    /// DropOldest 时用来弹出队头
    evict: Receiver<InboundMessage>,
    subscriptions: Arc<SubscriptionSet>,
    metrics: Arc<IngestionMetrics>,
    drop_policy: DropPolicy,
}

impl Publisher {
    pub fn publish(&self, message: InboundMessage) -> Result<()> {
        self.metrics.record_received();

        if !self.subscriptions.accepts(&message.topic) {
            self.metrics.record_unsubscribed();
            trace!(topic = %message.topic, "message on unsubscribed topic dropped");
            return Err(IngestionError::Unsubscribed {
                topic: message.topic,
            });
        }

        let result = match self.tx.try_send(message) {
            Err(TrySendError::Full(message)) if self.drop_policy == DropPolicy::DropOldest => {
                if self.evict.try_recv().is_ok() {
                    self.metrics.record_dropped();
                    trace!("oldest message evicted");
                }
                self.tx.try_send(message)
            }
            other => other,
        };

        self.metrics.update_queue_len(self.tx.len());
        match result {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                self.metrics.record_dropped();
                trace!(topic = %message.topic, "message dropped (queue full)");
                Err(IngestionError::QueueFull {
                    topic: message.topic,
                })
            }
            Err(TrySendError::Closed(_)) => Err(IngestionError::ChannelClosed),
        }
    }

    fn callback(&self) -> MessageCallback {
        let publisher = self.clone();
        Arc::new(move |message| {
            if let Err(e) = publisher.publish(message) {
                trace!(error = %e, "source message not enqueued");
            }
        })
    }
}

/// Optional fields of a test message, missing ones take defaults
#[derive(Debug, Clone, Default)]
pub struct TestLocation {
    pub valid: Option<bool>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub distance: Option<f64>,
    pub angle: Option<f64>,
    pub direction: Option<String>,
    pub timestamp: Option<i64>,
    pub events: Option<u32>,
    pub rssi: Option<i32>,
}

/// Ingestion Pipeline
///
/// 管理消息源、订阅和有界入站队列，并把入站消息标准化为 [`RawReport`]。
pub struct IngestionPipeline {
    sources: HashMap<String, Arc<dyn MessageSource>>,
    publisher: Publisher,
    rx: Option<Receiver<InboundMessage>>,
    normalizer: Normalizer,
}

impl IngestionPipeline {
    pub fn new(
        ingest: &IngestConfig,
        normalizer: NormalizerConfig,
    ) -> std::result::Result<Self, ContractError> {
        let pattern = TopicPattern::parse(&ingest.topic_pattern)?;
        let (tx, rx) = bounded(ingest.channel_capacity.max(1));

        let publisher = Publisher {
            tx,
            evict: rx.clone(),
            subscriptions: Arc::new(SubscriptionSet::new(pattern.clone(), &ingest.subscriptions)),
            metrics: Arc::new(IngestionMetrics::new()),
            drop_policy: ingest.drop_policy,
        };

        Ok(Self {
            sources: HashMap::new(),
            publisher,
            rx: Some(rx),
            normalizer: Normalizer::new(pattern, normalizer),
        })
    }

    #[instrument(name = "ingestion_register_source", skip(self, source), fields(source_id = %source.source_id()))]
    pub fn register_source(&mut self, source: Box<dyn MessageSource>) {
        let source_id = source.source_id().to_string();
        debug!(source_id = %source_id, "registered message source");
        self.sources.insert(source_id, Arc::from(source));
    }

    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&self) {
        info!(count = self.sources.len(), "starting all message sources");
        for (source_id, source) in &self.sources {
            if !source.is_running() {
                debug!(source_id = %source_id, "starting source");
                source.listen(self.publisher.callback());
            }
        }
    }

    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        for (source_id, source) in &self.sources {
            if source.is_running() {
                debug!(source_id = %source_id, "stopping source");
                source.stop();
            }
        }
    }

    /// Resolves once every registered source has stopped or run dry
    pub async fn wait_sources_idle(&self, poll: Duration) {
        while self.sources.values().any(|s| s.is_running()) {
            tokio::time::sleep(poll).await;
        }
    }

    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn publish(&self, message: InboundMessage) -> Result<()> {
        self.publisher.publish(message)
    }

    /// Build a complete message on `vehicle/{id}/info` and enqueue it
    pub fn publish_test_location(&self, vehicle_id: &str, fields: TestLocation) -> Result<()> {
        let payload = DevicePayload {
            vehicle_id: Some(vehicle_id.to_string()),
            vehicle_type: None,
            valid: fields.valid.unwrap_or(true),
            x: fields.x.unwrap_or(0.0),
            y: fields.y.unwrap_or(0.0),
            distance: fields.distance.unwrap_or(0.0),
            angle: fields.angle.unwrap_or(0.0),
            direction: Some(
                fields
                    .direction
                    .unwrap_or_else(|| self.normalizer.default_direction().to_string()),
            ),
            timestamp: Some(fields.timestamp.unwrap_or_else(|| Utc::now().timestamp())),
            events: Some(fields.events.unwrap_or(0)),
            rssi: fields.rssi,
        };
        let bytes = serde_json::to_vec(&payload)
            .map_err(|e| ContractError::Other(format!("test message encode error: {e}")))?;

        let topic = self.normalizer.pattern().topic_for(vehicle_id);
        debug!(topic = %topic, "publishing test location");
        self.publish(InboundMessage::new(topic, bytes))
    }

    pub fn subscribe_vehicle(&self, vehicle_id: &str) -> bool {
        self.publisher.subscriptions.subscribe_vehicle(vehicle_id)
    }

    pub fn unsubscribe_vehicle(&self, vehicle_id: &str) -> bool {
        self.publisher.subscriptions.unsubscribe_vehicle(vehicle_id)
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.publisher.subscriptions
    }

    /// Get inbound queue receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<Receiver<InboundMessage>> {
        self.rx.take()
    }

    /// Normalize one message, logging and counting failures
    #[cfg(test)]
    fn normalize(&self, message: &InboundMessage) -> Option<RawReport> {
        normalize_logged(&self.normalizer, &self.publisher.metrics, message)
    }

    /// Consume the inbound queue and forward normalized reports to `output`
    ///
    /// Returns `None` if the receiver was already taken. The task ends when the
    /// queue is closed and drained, or when `output` is dropped.
    pub fn spawn_normalizer(&mut self, output: mpsc::Sender<RawReport>) -> Option<JoinHandle<()>> {
        let rx = self.rx.take()?;
        let normalizer = self.normalizer.clone();
        let metrics = self.publisher.metrics.clone();

        Some(tokio::spawn(async move {
            while let Ok(message) = rx.recv().await {
                metrics.update_queue_len(rx.len());
                if let Some(report) = normalize_logged(&normalizer, &metrics, &message) {
                    if output.send(report).await.is_err() {
                        debug!("report consumer closed, normalizer stopping");
                        break;
                    }
                }
            }
            debug!("inbound queue closed, normalizer stopped");
        }))
    }

    /// Close the inbound queue; buffered messages are still delivered
    pub fn close(&self) {
        self.publisher.tx.close();
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.publisher.metrics.clone()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_source_running(&self, source_id: &str) -> bool {
        self.sources
            .get(source_id)
            .map(|s| s.is_running())
            .unwrap_or(false)
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn normalize_logged(
    normalizer: &Normalizer,
    metrics: &IngestionMetrics,
    message: &InboundMessage,
) -> Option<RawReport> {
    match normalizer.normalize(message) {
        Ok(report) => {
            metrics.record_normalized();
            Some(report)
        }
        Err(e) => {
            match &e {
                ContractError::TopicMismatch { .. } => metrics.record_topic_mismatch(),
                ContractError::VehicleIdMismatch { .. } => metrics.record_id_mismatch(),
                _ => metrics.record_decode_failure(),
            }
            warn!(topic = %message.topic, error = %e, "malformed message dropped");
            None
        }
    }
}
