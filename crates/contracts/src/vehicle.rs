//! VehicleState / HistoryRecord
//!
//! - `VehicleState`: 每辆车一行，首次处理时创建，之后覆盖写入
//! - `HistoryRecord`: 只追加，每个收到的上报一条（与过滤/匹配结果无关）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Point, RawReport, VehicleId, VehicleType};

/// Current state of one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub vehicle_id: VehicleId,
    pub x: f64,
    pub y: f64,
    pub vehicle_type: VehicleType,
    pub direction: String,
    pub distance: f64,
    pub angle: f64,
    /// units/second, never negative
    pub speed: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleState {
    /// Row created by the first upsert for a vehicle
    pub fn create(vehicle_id: VehicleId, update: StateUpdate) -> Self {
        Self {
            vehicle_id,
            x: update.position.x,
            y: update.position.y,
            vehicle_type: update.vehicle_type,
            direction: update.direction,
            distance: update.distance,
            angle: update.angle,
            speed: update.speed,
            created_at: update.updated_at,
            updated_at: update.updated_at,
        }
    }

    /// Overwrite every mutable field
    pub fn apply(&mut self, update: StateUpdate) {
        self.x = update.position.x;
        self.y = update.position.y;
        self.vehicle_type = update.vehicle_type;
        self.direction = update.direction;
        self.distance = update.distance;
        self.angle = update.angle;
        self.speed = update.speed;
        self.updated_at = update.updated_at;
    }

    #[inline]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Fields written by one state upsert
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub position: Point,
    pub vehicle_type: VehicleType,
    pub direction: String,
    pub distance: f64,
    pub angle: f64,
    pub speed: f64,
    pub updated_at: DateTime<Utc>,
}

impl StateUpdate {
    /// Kinematic fields copied from the report, position chosen by the caller
    pub fn from_report(report: &RawReport, position: Point, speed: f64) -> Self {
        Self {
            position,
            vehicle_type: report.vehicle_type,
            direction: report.direction.clone(),
            distance: report.distance,
            angle: report.angle,
            speed,
            updated_at: Utc::now(),
        }
    }
}

/// Immutable audit record of one received report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub vehicle_id: VehicleId,
    /// 原始坐标
    pub x: f64,
    pub y: f64,
    pub vehicle_type: VehicleType,
    pub direction: String,
    pub distance: f64,
    pub angle: f64,
    pub valid: bool,
    pub events: u32,
    #[serde(with = "rssi_sentinel")]
    pub rssi: Option<i32>,
    /// epoch seconds, ordering key
    pub timestamp: i64,
    pub received_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn from_report(report: &RawReport) -> Self {
        Self {
            vehicle_id: report.vehicle_id.clone(),
            x: report.x,
            y: report.y,
            vehicle_type: report.vehicle_type,
            direction: report.direction.clone(),
            distance: report.distance,
            angle: report.angle,
            valid: report.valid,
            events: report.events,
            rssi: report.rssi,
            timestamp: report.timestamp,
            received_at: report.received_at,
        }
    }

    #[inline]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Inclusive epoch-second range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// 导出时缺失的 RSSI 写作 -999
mod rssi_sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    pub const ABSENT: i32 = -999;

    pub fn serialize<S: Serializer>(value: &Option<i32>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(value.unwrap_or(ABSENT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
        let raw = i32::deserialize(deserializer)?;
        Ok((raw != ABSENT).then_some(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RawReport {
        RawReport {
            vehicle_id: "car_1".into(),
            vehicle_type: VehicleType::Car,
            valid: true,
            x: 4.0,
            y: 5.0,
            distance: 12.3,
            angle: 90.0,
            direction: "东".to_string(),
            timestamp: 1_700_000_000,
            events: 0,
            rssi: None,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_history_keeps_raw_coordinates() {
        let record = HistoryRecord::from_report(&report());
        assert_eq!(record.position(), Point::new(4.0, 5.0));
        assert_eq!(record.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_absent_rssi_exports_sentinel() {
        let record = HistoryRecord::from_report(&report());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["rssi"], -999);

        let back: HistoryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.rssi, None);
    }

    #[test]
    fn test_state_apply_overwrites() {
        let r = report();
        let mut state = VehicleState::create(
            r.vehicle_id.clone(),
            StateUpdate::from_report(&r, Point::new(1.0, 1.0), 0.0),
        );
        let created = state.created_at;
        state.apply(StateUpdate::from_report(&r, Point::new(2.0, 3.0), 1.5));
        assert_eq!(state.position(), Point::new(2.0, 3.0));
        assert_eq!(state.speed, 1.5);
        assert_eq!(state.created_at, created);
    }
}
