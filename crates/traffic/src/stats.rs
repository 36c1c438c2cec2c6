//! Road congestion statistics
//!
//! 只读视图：节点交通等级分布、拥堵百分比、总体等级、路上车辆与平均速度。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use contracts::{
    ContractError, HistoryRecord, RoadNode, RoadNodeStore, TrafficConfig, TrafficLevel, VehicleId,
    VehicleStore,
};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::aggregator::road_bounds;

/// Node count per traffic level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficDistribution {
    pub smooth: usize,
    pub normal: usize,
    pub congested: usize,
    pub unknown: usize,
}

impl TrafficDistribution {
    pub fn from_nodes(nodes: &[RoadNode]) -> Self {
        nodes.iter().fold(Self::default(), |mut acc, node| {
            acc.add(node.traffic);
            acc
        })
    }

    pub fn add(&mut self, level: TrafficLevel) {
        match level {
            TrafficLevel::Smooth => self.smooth += 1,
            TrafficLevel::Normal => self.normal += 1,
            TrafficLevel::Congested => self.congested += 1,
            TrafficLevel::Unknown => self.unknown += 1,
        }
    }

    pub fn count(&self, level: TrafficLevel) -> usize {
        match level {
            TrafficLevel::Smooth => self.smooth,
            TrafficLevel::Normal => self.normal,
            TrafficLevel::Congested => self.congested,
            TrafficLevel::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        self.smooth + self.normal + self.congested + self.unknown
    }

    /// congested / total × 100，未取整；零节点为 0
    pub fn congestion_percentage(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => self.congested as f64 / n as f64 * 100.0,
        }
    }

    /// 总体等级：拥堵比例 > 50% 优先，其次 NORMAL / SMOOTH 过半
    pub fn overall_level(&self) -> TrafficLevel {
        let n = self.total();
        if n == 0 {
            return TrafficLevel::Unknown;
        }
        let share = |count: usize| count as f64 / n as f64;

        if self.congestion_percentage() > 50.0 {
            TrafficLevel::Congested
        } else if share(self.normal) > 0.5 {
            TrafficLevel::Normal
        } else if share(self.smooth) > 0.5 {
            TrafficLevel::Smooth
        } else {
            TrafficLevel::Unknown
        }
    }
}

/// Mean implied speed over consecutive history pairs of each vehicle
///
/// Pairs with non-positive elapsed time are skipped; 0 when no pair qualifies.
pub fn average_speed(records: &[HistoryRecord]) -> f64 {
    let mut by_vehicle: HashMap<&VehicleId, Vec<&HistoryRecord>> = HashMap::new();
    for record in records {
        by_vehicle.entry(&record.vehicle_id).or_default().push(record);
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for track in by_vehicle.values_mut() {
        track.sort_by_key(|r| r.timestamp);
        for pair in track.windows(2) {
            let elapsed = pair[1].timestamp - pair[0].timestamp;
            if elapsed > 0 {
                total += pair[0].position().distance_to(&pair[1].position()) / elapsed as f64;
                pairs += 1;
            }
        }
    }

    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64
    }
}

/// Congestion summary of one road
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadCongestion {
    pub road_id: String,
    pub level: TrafficLevel,
    /// 取整后的拥堵百分比
    pub congestion_percentage: u32,
    pub distribution: TrafficDistribution,
    pub node_count: usize,
    pub vehicles_on_road: Vec<VehicleId>,
    pub average_speed: f64,
    pub has_events: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// All roads, sorted by congestion percentage descending
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CongestionOverview {
    pub total_roads: usize,
    /// road count per overall level
    pub summary: TrafficDistribution,
    pub roads: Vec<RoadCongestion>,
}

/// Read-only congestion queries over both stores
pub struct CongestionStats<R, V> {
    roads: Arc<R>,
    vehicles: Arc<V>,
    config: TrafficConfig,
}

impl<R, V> CongestionStats<R, V>
where
    R: RoadNodeStore + Sync,
    V: VehicleStore + Sync,
{
    pub fn new(roads: Arc<R>, vehicles: Arc<V>, config: TrafficConfig) -> Self {
        Self {
            roads,
            vehicles,
            config,
        }
    }

    #[instrument(name = "road_congestion", skip(self), fields(road_id = %road_id))]
    pub async fn road_congestion(&self, road_id: &str) -> Result<RoadCongestion, ContractError> {
        let nodes = self.roads.nodes_for_road_ordered(road_id).await?;
        let distribution = TrafficDistribution::from_nodes(&nodes);

        let (vehicles_on_road, average_speed) = match road_bounds(&nodes) {
            Some(bbox) => {
                let states = self.vehicles.vehicles_in_area(bbox).await?;
                let since = Utc::now().timestamp().saturating_sub(
                    i64::try_from(self.config.speed_window_secs).unwrap_or(i64::MAX),
                );
                let history = self.vehicles.history_in_area(bbox, since).await?;
                (
                    states.into_iter().map(|s| s.vehicle_id).collect(),
                    average_speed(&history),
                )
            }
            None => (Vec::new(), 0.0),
        };

        Ok(RoadCongestion {
            road_id: road_id.to_string(),
            level: distribution.overall_level(),
            congestion_percentage: distribution.congestion_percentage().round() as u32,
            distribution,
            node_count: nodes.len(),
            vehicles_on_road,
            average_speed,
            has_events: nodes.iter().any(|n| n.event.is_some()),
            last_updated: nodes.iter().filter_map(|n| n.updated_at).max(),
        })
    }

    /// Summary of every road, optionally only those at `level`
    pub async fn overview(
        &self,
        level: Option<TrafficLevel>,
    ) -> Result<CongestionOverview, ContractError> {
        let road_ids = self.roads.road_ids().await?;
        let total_roads = road_ids.len();

        let mut roads = Vec::with_capacity(total_roads);
        let mut summary = TrafficDistribution::default();
        for road_id in &road_ids {
            let road = self.road_congestion(road_id).await?;
            summary.add(road.level);
            if level.map_or(true, |wanted| road.level == wanted) {
                roads.push(road);
            }
        }

        roads.sort_by(|a, b| {
            b.distribution
                .congestion_percentage()
                .total_cmp(&a.distribution.congestion_percentage())
        });
        debug!(total_roads, listed = roads.len(), "Congestion overview built");

        Ok(CongestionOverview {
            total_roads,
            summary,
            roads,
        })
    }
}
