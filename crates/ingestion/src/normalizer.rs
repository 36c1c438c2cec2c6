//! Telemetry Normalizer
//!
//! topic + JSON 负载 -> [`RawReport`]：
//! 1. 从 topic 提取 vehicle id
//! 2. 解码负载
//! 3. 负载内 id 非空且与 topic 不一致则拒绝
//! 4. 单位换算、推断车辆类型、打上接收时间

use contracts::{
    ContractError, DevicePayload, InboundMessage, NormalizerConfig, RawReport, VehicleType,
};
use tracing::trace;

use crate::topic::TopicPattern;

/// Stateless message normalizer
#[derive(Debug, Clone)]
pub struct Normalizer {
    pattern: TopicPattern,
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(pattern: TopicPattern, config: NormalizerConfig) -> Self {
        Self { pattern, config }
    }

    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    pub fn default_direction(&self) -> &str {
        &self.config.default_direction
    }

    pub fn normalize(&self, message: &InboundMessage) -> Result<RawReport, ContractError> {
        let topic_id = self.pattern.vehicle_id(&message.topic)?;

        let payload: DevicePayload = serde_json::from_slice(&message.payload)
            .map_err(|e| ContractError::payload_decode(&message.topic, e.to_string()))?;

        match payload.vehicle_id.as_deref() {
            Some(embedded) if !embedded.is_empty() && embedded != topic_id => {
                return Err(ContractError::VehicleIdMismatch {
                    topic_id: topic_id.to_string(),
                    payload_id: embedded.to_string(),
                });
            }
            _ => {}
        }

        let timestamp = match payload.timestamp {
            Some(ts) if self.config.trust_device_clock => ts,
            _ => message.received_at.timestamp(),
        };

        let report = RawReport {
            vehicle_id: topic_id.into(),
            vehicle_type: payload
                .vehicle_type
                .unwrap_or_else(|| VehicleType::infer_from_id(topic_id)),
            valid: payload.valid,
            x: payload.x * self.config.coordinate_scale,
            y: payload.y * self.config.coordinate_scale,
            distance: payload.distance * self.config.distance_scale,
            angle: payload.angle,
            direction: payload
                .direction
                .unwrap_or_else(|| self.config.default_direction.clone()),
            timestamp,
            events: payload.events.unwrap_or(0),
            rssi: payload.rssi,
            received_at: message.received_at,
        };

        trace!(vehicle_id = %report.vehicle_id, timestamp, "Report normalized");
        Ok(report)
    }
}
