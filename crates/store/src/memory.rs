//! In-memory store implementing both collaborator traits.
//!
//! 三张表各自一把 `tokio::sync::RwLock`：状态、历史、节点。跨表没有事务。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use contracts::{
    BlockCategory, BoundingBox, ContractError, HistoryRecord, RoadNode, RoadNodeStore, StateUpdate,
    TimeRange, TrafficLevel, VehicleId, VehicleState, VehicleStore,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::snapshot::StoreSnapshot;

/// In-memory vehicle + road node store
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: RwLock<HashMap<VehicleId, VehicleState>>,
    /// 每车按追加顺序保存
    history: RwLock<HashMap<VehicleId, Vec<HistoryRecord>>>,
    nodes: RwLock<BTreeMap<u64, RoadNode>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with a road network
    pub fn with_nodes(nodes: Vec<RoadNode>) -> Self {
        Self {
            nodes: RwLock::new(nodes.into_iter().map(|n| (n.id, n)).collect()),
            ..Self::default()
        }
    }

    /// Insert or replace nodes by id, returns the number loaded
    pub async fn load_nodes(&self, nodes: Vec<RoadNode>) -> usize {
        let count = nodes.len();
        let mut map = self.nodes.write().await;
        map.extend(nodes.into_iter().map(|n| (n.id, n)));
        info!(count, total = map.len(), "Road nodes loaded");
        count
    }

    /// All nodes of one road (any category) with their current traffic level, by id
    pub async fn nodes_for_road(&self, road_id: &str) -> Vec<RoadNode> {
        self.nodes
            .read()
            .await
            .values()
            .filter(|n| n.road_id.as_deref() == Some(road_id))
            .cloned()
            .collect()
    }

    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn vehicle_count(&self) -> usize {
        self.states.read().await.len()
    }

    /// Number of history records for one vehicle
    pub async fn history_len(&self, vehicle_id: &str) -> usize {
        self.history
            .read()
            .await
            .get(vehicle_id)
            .map_or(0, Vec::len)
    }

    /// Retention sweep: drop history older than `days_to_keep` days
    pub async fn clean_old_history(&self, days_to_keep: u32) -> usize {
        let cutoff = (Utc::now() - Duration::days(i64::from(days_to_keep))).timestamp();
        let removed = self.remove_history_before(cutoff).await;
        info!(removed, days_to_keep, "Cleaned old location history");
        removed
    }

    async fn remove_history_before(&self, cutoff: i64) -> usize {
        let mut history = self.history.write().await;
        let mut removed = 0;
        for records in history.values_mut() {
            let before = records.len();
            records.retain(|r| r.timestamp >= cutoff);
            removed += before - records.len();
        }
        history.retain(|_, records| !records.is_empty());
        removed
    }

    /// Consistent-per-table copy of everything
    pub async fn snapshot(&self) -> StoreSnapshot {
        let mut states: Vec<VehicleState> = self.states.read().await.values().cloned().collect();
        states.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));

        let history_map = self.history.read().await;
        let mut ids: Vec<&VehicleId> = history_map.keys().collect();
        ids.sort();
        let history = ids
            .into_iter()
            .flat_map(|id| history_map[id].iter().cloned())
            .collect();
        drop(history_map);

        let nodes = self.nodes.read().await.values().cloned().collect();

        StoreSnapshot {
            taken_at: Utc::now(),
            states,
            history,
            nodes,
        }
    }
}

impl RoadNodeStore for MemoryStore {
    async fn nodes_in_bounding_box(
        &self,
        bbox: BoundingBox,
        category: BlockCategory,
    ) -> Result<Vec<RoadNode>, ContractError> {
        Ok(self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.category == category && bbox.contains(n.position()))
            .cloned()
            .collect())
    }

    async fn nodes_for_road_ordered(&self, road_id: &str) -> Result<Vec<RoadNode>, ContractError> {
        let mut nodes: Vec<RoadNode> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.is_road() && n.road_id.as_deref() == Some(road_id))
            .cloned()
            .collect();
        // 折线顺序：x 升序，其次 y 升序
        nodes.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        Ok(nodes)
    }

    async fn bulk_set_traffic(
        &self,
        node_ids: &[u64],
        level: TrafficLevel,
        updated_at: DateTime<Utc>,
    ) -> Result<usize, ContractError> {
        let mut nodes = self.nodes.write().await;
        let mut written = 0;
        for id in node_ids {
            if let Some(node) = nodes.get_mut(id) {
                node.traffic = level;
                node.updated_at = Some(updated_at);
                written += 1;
            }
        }
        Ok(written)
    }

    async fn road_ids(&self) -> Result<Vec<String>, ContractError> {
        let ids: BTreeSet<String> = self
            .nodes
            .read()
            .await
            .values()
            .filter_map(|n| n.road_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }
}

impl VehicleStore for MemoryStore {
    async fn upsert_state(
        &self,
        vehicle_id: &VehicleId,
        update: StateUpdate,
    ) -> Result<VehicleState, ContractError> {
        let mut states = self.states.write().await;
        let state = match states.get_mut(vehicle_id) {
            Some(state) => {
                state.apply(update);
                state.clone()
            }
            None => {
                debug!(vehicle_id = %vehicle_id, "Creating vehicle state");
                let state = VehicleState::create(vehicle_id.clone(), update);
                states.insert(vehicle_id.clone(), state.clone());
                state
            }
        };
        Ok(state)
    }

    async fn get_state(&self, vehicle_id: &str) -> Result<Option<VehicleState>, ContractError> {
        Ok(self.states.read().await.get(vehicle_id).cloned())
    }

    async fn latest_history(
        &self,
        vehicle_id: &str,
        valid_only: bool,
    ) -> Result<Option<HistoryRecord>, ContractError> {
        Ok(self.history.read().await.get(vehicle_id).and_then(|records| {
            records
                .iter()
                .rev()
                .find(|r| !valid_only || r.valid)
                .cloned()
        }))
    }

    async fn append_history(&self, record: HistoryRecord) -> Result<(), ContractError> {
        self.history
            .write()
            .await
            .entry(record.vehicle_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn trajectory(
        &self,
        vehicle_id: &str,
        range: Option<TimeRange>,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, ContractError> {
        Ok(self
            .history
            .read()
            .await
            .get(vehicle_id)
            .map(|records| {
                records
                    .iter()
                    .rev()
                    .filter(|r| range.map_or(true, |range| range.contains(r.timestamp)))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn vehicles_in_area(&self, bbox: BoundingBox) -> Result<Vec<VehicleState>, ContractError> {
        Ok(self
            .states
            .read()
            .await
            .values()
            .filter(|s| bbox.contains(s.position()))
            .cloned()
            .collect())
    }

    async fn count_vehicles_in_area(
        &self,
        bbox: BoundingBox,
        updated_since: DateTime<Utc>,
    ) -> Result<usize, ContractError> {
        Ok(self
            .states
            .read()
            .await
            .values()
            .filter(|s| s.updated_at >= updated_since && bbox.contains(s.position()))
            .count())
    }

    async fn history_in_area(
        &self,
        bbox: BoundingBox,
        since: i64,
    ) -> Result<Vec<HistoryRecord>, ContractError> {
        Ok(self
            .history
            .read()
            .await
            .values()
            .flatten()
            .filter(|r| r.timestamp >= since && bbox.contains(r.position()))
            .cloned()
            .collect())
    }

    async fn clean_history_before(&self, cutoff: i64) -> Result<usize, ContractError> {
        Ok(self.remove_history_before(cutoff).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Point, RawReport, VehicleType};

    fn record(id: &str, x: f64, y: f64, valid: bool, timestamp: i64) -> HistoryRecord {
        HistoryRecord::from_report(&RawReport {
            vehicle_id: id.into(),
            vehicle_type: VehicleType::infer_from_id(id),
            valid,
            x,
            y,
            distance: 0.0,
            angle: 0.0,
            direction: "未知".into(),
            timestamp,
            events: 0,
            rssi: Some(-60),
            received_at: Utc::now(),
        })
    }

    fn update(x: f64, y: f64) -> StateUpdate {
        StateUpdate {
            position: Point::new(x, y),
            vehicle_type: VehicleType::Car,
            direction: "北".into(),
            distance: 1.0,
            angle: 0.0,
            speed: 0.0,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_row() {
        let store = MemoryStore::new();
        let id = VehicleId::from("car_1");
        let first = store.upsert_state(&id, update(1.0, 1.0)).await.unwrap();
        let second = store.upsert_state(&id, update(2.0, 2.0)).await.unwrap();

        assert_eq!(store.vehicle_count().await, 1);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(
            store.get_state("car_1").await.unwrap().map(|s| s.position()),
            Some(Point::new(2.0, 2.0))
        );
    }

    #[tokio::test]
    async fn test_latest_history_valid_only() {
        let store = MemoryStore::new();
        store.append_history(record("car_1", 1.0, 1.0, true, 10)).await.unwrap();
        store.append_history(record("car_1", 2.0, 2.0, false, 11)).await.unwrap();

        let any = store.latest_history("car_1", false).await.unwrap().unwrap();
        assert_eq!(any.timestamp, 11);
        let valid = store.latest_history("car_1", true).await.unwrap().unwrap();
        assert_eq!(valid.timestamp, 10);
        assert!(store.latest_history("car_2", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trajectory_most_recent_first_with_range() {
        let store = MemoryStore::new();
        for t in 0..20 {
            store
                .append_history(record("truck_1", t as f64, 0.0, true, 100 + t))
                .await
                .unwrap();
        }

        let all = store.trajectory("truck_1", None, 5).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].timestamp, 119);

        let range = TimeRange { start: 103, end: 106 };
        let ranged = store.trajectory("truck_1", Some(range), 100).await.unwrap();
        let stamps: Vec<i64> = ranged.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![106, 105, 104, 103]);
    }

    #[tokio::test]
    async fn test_area_queries() {
        let store = MemoryStore::new();
        store.upsert_state(&"a".into(), update(5.0, 5.0)).await.unwrap();
        store.upsert_state(&"b".into(), update(50.0, 5.0)).await.unwrap();

        let bbox = BoundingBox::around(Point::new(0.0, 0.0), 10.0);
        assert_eq!(store.vehicles_in_area(bbox).await.unwrap().len(), 1);

        let recent = Utc::now() - Duration::seconds(60);
        assert_eq!(store.count_vehicles_in_area(bbox, recent).await.unwrap(), 1);
        let future = Utc::now() + Duration::seconds(60);
        assert_eq!(store.count_vehicles_in_area(bbox, future).await.unwrap(), 0);

        store.append_history(record("a", 5.0, 5.0, true, 50)).await.unwrap();
        store.append_history(record("a", 5.0, 6.0, true, 40)).await.unwrap();
        assert_eq!(store.history_in_area(bbox, 45).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clean_history_before() {
        let store = MemoryStore::new();
        store.append_history(record("a", 1.0, 1.0, true, 10)).await.unwrap();
        store.append_history(record("a", 1.0, 1.0, true, 20)).await.unwrap();
        store.append_history(record("b", 1.0, 1.0, true, 5)).await.unwrap();

        assert_eq!(store.clean_history_before(15).await.unwrap(), 2);
        assert_eq!(store.history_len("a").await, 1);
        assert_eq!(store.history_len("b").await, 0);
    }

    #[tokio::test]
    async fn test_clean_old_history_keeps_recent() {
        let store = MemoryStore::new();
        let now = Utc::now().timestamp();
        store.append_history(record("a", 1.0, 1.0, true, now - 10 * 86_400)).await.unwrap();
        store.append_history(record("a", 1.0, 1.0, true, now)).await.unwrap();
        assert_eq!(store.clean_old_history(7).await, 1);
        assert_eq!(store.history_len("a").await, 1);
    }

    #[tokio::test]
    async fn test_road_queries_and_traffic_write() {
        let mut water = RoadNode::road(4, 15.0, 0.0, Some("r1"));
        water.category = BlockCategory::Water;
        let store = MemoryStore::with_nodes(vec![
            RoadNode::road(1, 20.0, 0.0, Some("r1")),
            RoadNode::road(2, 0.0, 5.0, Some("r1")),
            RoadNode::road(3, 0.0, 1.0, Some("r1")),
            water,
            RoadNode::road(5, 0.0, 0.0, Some("r2")),
            RoadNode::road(6, 9.0, 9.0, None),
        ]);

        let ordered = store.nodes_for_road_ordered("r1").await.unwrap();
        let ids: Vec<u64> = ordered.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(store.nodes_for_road("r1").await.len(), 4);
        assert_eq!(store.road_ids().await.unwrap(), vec!["r1".to_string(), "r2".to_string()]);

        let now = Utc::now();
        let written = store
            .bulk_set_traffic(&[1, 2, 3, 42], TrafficLevel::Congested, now)
            .await
            .unwrap();
        assert_eq!(written, 3);
        let nodes = store.nodes_for_road_ordered("r1").await.unwrap();
        assert!(nodes.iter().all(|n| n.traffic == TrafficLevel::Congested));
        assert!(nodes.iter().all(|n| n.updated_at == Some(now)));
    }

    #[tokio::test]
    async fn test_bounding_box_filters_category() {
        let mut building = RoadNode::road(2, 1.0, 1.0, None);
        building.category = BlockCategory::Building;
        let store = MemoryStore::new();
        store
            .load_nodes(vec![RoadNode::road(1, 0.0, 0.0, None), building])
            .await;

        let bbox = BoundingBox::around(Point::new(0.0, 0.0), 5.0);
        let roads = store.nodes_in_bounding_box(bbox, BlockCategory::Road).await.unwrap();
        assert_eq!(roads.len(), 1);
        assert_eq!(roads[0].id, 1);
    }
}
