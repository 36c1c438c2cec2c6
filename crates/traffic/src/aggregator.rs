//! Traffic Density Aggregator
//!
//! 每次从头重算一条道路的拥堵等级并整体覆盖写入该道路所有节点。
//! 不加锁：同一道路的并发重算可能交错，以最后一次写入为准。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use contracts::{
    BoundingBox, ContractError, RoadNode, RoadNodeStore, TrafficConfig, TrafficLevel, VehicleStore,
};
use serde::Serialize;
use tracing::{debug, instrument};

/// Result of one recomputation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficAssessment {
    pub road_id: String,
    pub level: TrafficLevel,
    pub node_count: usize,
    pub vehicle_count: usize,
    /// vehicles per node
    pub density: f64,
    /// 写入的节点数（零节点道路为 0）
    pub nodes_written: usize,
}

/// Density -> level bands
///
/// `density < smooth_below` -> SMOOTH, `< normal_below` -> NORMAL, else CONGESTED
pub fn classify(density: f64, config: &TrafficConfig) -> TrafficLevel {
    if density < config.smooth_below {
        TrafficLevel::Smooth
    } else if density < config.normal_below {
        TrafficLevel::Normal
    } else {
        TrafficLevel::Congested
    }
}

/// `now - secs`, saturating at the earliest representable instant
pub(crate) fn seconds_before(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Bounding box of a node set, `None` when empty
pub(crate) fn road_bounds(nodes: &[RoadNode]) -> Option<BoundingBox> {
    BoundingBox::covering(nodes.iter().map(RoadNode::position))
}

/// Per-road congestion recomputation
pub struct TrafficAggregator<R, V> {
    roads: Arc<R>,
    vehicles: Arc<V>,
    config: TrafficConfig,
}

impl<R, V> Clone for TrafficAggregator<R, V> {
    fn clone(&self) -> Self {
        Self {
            roads: Arc::clone(&self.roads),
            vehicles: Arc::clone(&self.vehicles),
            config: self.config.clone(),
        }
    }
}

impl<R, V> TrafficAggregator<R, V>
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

    /// Recompute and overwrite the traffic level of one road
    ///
    /// 零节点道路返回 UNKNOWN 且不写入。
    #[instrument(name = "traffic_recompute", skip(self), fields(road_id = %road_id))]
    pub async fn recompute(&self, road_id: &str) -> Result<TrafficAssessment, ContractError> {
        let nodes = self.roads.nodes_for_road_ordered(road_id).await?;

        let Some(bounds) = road_bounds(&nodes) else {
            debug!("Road has no ROAD nodes");
            metrics::counter!("traffic_recompute_total", "level" => TrafficLevel::Unknown.as_str())
                .increment(1);
            return Ok(TrafficAssessment {
                road_id: road_id.to_string(),
                level: TrafficLevel::Unknown,
                node_count: 0,
                vehicle_count: 0,
                density: 0.0,
                nodes_written: 0,
            });
        };

        let now = Utc::now();
        let bbox = bounds.expanded(self.config.tolerance);
        let since = seconds_before(now, self.config.recency_secs);
        let vehicle_count = self.vehicles.count_vehicles_in_area(bbox, since).await?;

        let density = vehicle_count as f64 / nodes.len() as f64;
        let level = classify(density, &self.config);

        let ids: Vec<u64> = nodes.iter().map(|n| n.id).collect();
        let nodes_written = self.roads.bulk_set_traffic(&ids, level, now).await?;

        metrics::counter!("traffic_recompute_total", "level" => level.as_str()).increment(1);
        metrics::histogram!("traffic_road_density").record(density);
        debug!(
            vehicle_count,
            node_count = nodes.len(),
            density,
            level = %level,
            "Road traffic recomputed"
        );

        Ok(TrafficAssessment {
            road_id: road_id.to_string(),
            level,
            node_count: nodes.len(),
            vehicle_count,
            density,
            nodes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Point, StateUpdate, VehicleId, VehicleType};
    use store::MemoryStore;

    fn update(x: f64, y: f64, updated_at: DateTime<Utc>) -> StateUpdate {
        StateUpdate {
            position: Point::new(x, y),
            vehicle_type: VehicleType::Car,
            direction: "东".into(),
            distance: 0.0,
            angle: 0.0,
            speed: 0.0,
            updated_at,
        }
    }

    fn ten_node_road() -> Vec<RoadNode> {
        (0..10)
            .map(|i| RoadNode::road(i, i as f64 * 10.0, 0.0, Some("main")))
            .collect()
    }

    fn aggregator(store: &Arc<MemoryStore>) -> TrafficAggregator<MemoryStore, MemoryStore> {
        TrafficAggregator::new(Arc::clone(store), Arc::clone(store), TrafficConfig::default())
    }

    #[test]
    fn test_classify_bands() {
        let cfg = TrafficConfig::default();
        assert_eq!(classify(0.0, &cfg), TrafficLevel::Smooth);
        assert_eq!(classify(0.1, &cfg), TrafficLevel::Normal);
        assert_eq!(classify(0.29, &cfg), TrafficLevel::Normal);
        assert_eq!(classify(0.3, &cfg), TrafficLevel::Congested);
        assert_eq!(classify(0.4, &cfg), TrafficLevel::Congested);
    }

    #[tokio::test]
    async fn test_zero_nodes_is_unknown() {
        let store = Arc::new(MemoryStore::new());
        let result = aggregator(&store).recompute("ghost").await.unwrap();
        assert_eq!(result.level, TrafficLevel::Unknown);
        assert_eq!(result.nodes_written, 0);
    }

    #[tokio::test]
    async fn test_four_vehicles_on_ten_nodes_is_congested() {
        let store = Arc::new(MemoryStore::with_nodes(ten_node_road()));
        let now = Utc::now();
        for (i, x) in [5.0, 30.0, 60.0, 95.0].into_iter().enumerate() {
            let id = VehicleId::from(format!("car_{i}"));
            store.upsert_state(&id, update(x, 8.0, now)).await.unwrap();
        }

        let result = aggregator(&store).recompute("main").await.unwrap();
        assert_eq!(result.vehicle_count, 4);
        assert!((result.density - 0.4).abs() < 1e-12);
        assert_eq!(result.level, TrafficLevel::Congested);
        assert_eq!(result.nodes_written, 10);

        let nodes = store.nodes_for_road("main").await;
        assert!(nodes.iter().all(|n| n.traffic == TrafficLevel::Congested));
    }

    #[tokio::test]
    async fn test_tolerance_and_recency() {
        let store = Arc::new(MemoryStore::with_nodes(ten_node_road()));
        let now = Utc::now();
        // 在容差内
        store.upsert_state(&"a".into(), update(-9.0, 0.0, now)).await.unwrap();
        // 超出容差
        store.upsert_state(&"b".into(), update(0.0, 10.5, now)).await.unwrap();
        // 过期
        let stale = now - chrono::Duration::seconds(120);
        store.upsert_state(&"c".into(), update(20.0, 0.0, stale)).await.unwrap();

        let result = aggregator(&store).recompute("main").await.unwrap();
        assert_eq!(result.vehicle_count, 1);
        assert_eq!(result.level, TrafficLevel::Normal);
    }

    #[test]
    fn test_seconds_before_saturates() {
        let now = Utc::now();
        assert_eq!(seconds_before(now, u64::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!((now - seconds_before(now, 60)).num_seconds(), 60);
    }
}
