//! RoadNode - 路网节点（由道路配置方提供，本模块只读，交通等级除外）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Point;

/// 地块类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockCategory {
    Building,
    Road,
    Water,
}

/// 交通等级（按节点缓存，由聚合器整体覆盖写入）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficLevel {
    #[default]
    Unknown,
    Smooth,
    Normal,
    Congested,
}

impl TrafficLevel {
    pub const ALL: [TrafficLevel; 4] = [
        TrafficLevel::Unknown,
        TrafficLevel::Smooth,
        TrafficLevel::Normal,
        TrafficLevel::Congested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficLevel::Unknown => "UNKNOWN",
            TrafficLevel::Smooth => "SMOOTH",
            TrafficLevel::Normal => "NORMAL",
            TrafficLevel::Congested => "CONGESTED",
        }
    }
}

impl std::fmt::Display for TrafficLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrafficLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UNKNOWN" => Ok(TrafficLevel::Unknown),
            "SMOOTH" => Ok(TrafficLevel::Smooth),
            "NORMAL" => Ok(TrafficLevel::Normal),
            "CONGESTED" => Ok(TrafficLevel::Congested),
            other => Err(format!("unknown traffic level '{other}'")),
        }
    }
}

/// 道路事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoadEvent {
    Accident,
    Construction,
    RoadClosure,
}

/// Road network node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadNode {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    /// 所属道路，可为空
    #[serde(default)]
    pub road_id: Option<String>,
    #[serde(alias = "block")]
    pub category: BlockCategory,
    #[serde(default)]
    pub traffic: TrafficLevel,
    #[serde(default)]
    pub event: Option<RoadEvent>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RoadNode {
    /// Road-category node with no traffic information yet
    pub fn road(id: u64, x: f64, y: f64, road_id: Option<&str>) -> Self {
        Self {
            id,
            x,
            y,
            road_id: road_id.map(str::to_string),
            category: BlockCategory::Road,
            traffic: TrafficLevel::Unknown,
            event: None,
            updated_at: None,
        }
    }

    #[inline]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_road(&self) -> bool {
        self.category == BlockCategory::Road
    }
}
