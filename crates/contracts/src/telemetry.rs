//! Telemetry - 遥测消息与标准化上报
//!
//! ## 时间模型
//! - `RawReport::timestamp`: 上报时间（epoch 秒）。设备时钟不可信时由服务端接收时间代替
//! - `received_at`: 服务端接收时间，总是记录

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Point, VehicleId};

/// 车辆类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    /// 搭载定位模块的传感器车
    SensorCar,
    Car,
    Truck,
    #[default]
    Unknown,
}

impl VehicleType {
    /// Id prefix convention: `esp32*`, `car*`, `truck*`
    pub fn infer_from_id(vehicle_id: &str) -> Self {
        if vehicle_id.starts_with("esp32") {
            VehicleType::SensorCar
        } else if vehicle_id.starts_with("car") {
            VehicleType::Car
        } else if vehicle_id.starts_with("truck") {
            VehicleType::Truck
        } else {
            VehicleType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::SensorCar => "SENSOR_CAR",
            VehicleType::Car => "CAR",
            VehicleType::Truck => "TRUCK",
            VehicleType::Unknown => "UNKNOWN",
        }
    }
}

/// Message as delivered by the transport: topic + opaque payload
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Stamp with the current server time
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// 设备端发送的原始 JSON 负载
///
/// 距离单位为设备原生单位（分米），由 Normalizer 换算。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<VehicleType>,
    pub valid: bool,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
}

/// Normalized report, immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    pub vehicle_id: VehicleId,
    pub vehicle_type: VehicleType,
    pub valid: bool,
    /// 统一单位坐标
    pub x: f64,
    pub y: f64,
    /// 累计行驶距离（米）
    pub distance: f64,
    /// 航向角（度）
    pub angle: f64,
    pub direction: String,
    /// epoch seconds
    pub timestamp: i64,
    /// 事件位掩码
    pub events: u32,
    /// 信号强度，`None` 表示设备未上报
    pub rssi: Option<i32>,
    pub received_at: DateTime<Utc>,
}

impl RawReport {
    #[inline]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}
