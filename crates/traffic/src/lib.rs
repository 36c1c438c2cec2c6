//! # Traffic
//!
//! 道路拥堵：
//! - [`TrafficAggregator`]：匹配到道路后按车辆密度重算等级并覆盖写入节点
//! - [`CongestionStats`]：基于节点等级、车辆状态和历史的只读统计

mod aggregator;
mod stats;

pub use aggregator::{classify, TrafficAggregator, TrafficAssessment};
pub use stats::{
    average_speed, CongestionOverview, CongestionStats, RoadCongestion, TrafficDistribution,
};
