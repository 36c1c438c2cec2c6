//! Store traits - 持久化协作方接口
//!
//! 管道只通过这两个 trait 访问道路节点和车辆数据，具体实现可以是内存、数据库或远程服务。
//! 两次写入之间没有事务：历史追加成功而状态更新失败是可接受的。

use chrono::{DateTime, Utc};

use crate::{
    BlockCategory, BoundingBox, ContractError, HistoryRecord, RoadNode, StateUpdate, TimeRange,
    TrafficLevel, VehicleId, VehicleState,
};

/// Road / node store
///
/// 节点数据只读，`bulk_set_traffic` 除外（聚合器整体覆盖写入）。
#[trait_variant::make(RoadNodeStore: Send)]
pub trait LocalRoadNodeStore {
    /// Nodes of `category` inside `bbox` (bounds inclusive), unordered
    async fn nodes_in_bounding_box(
        &self,
        bbox: BoundingBox,
        category: BlockCategory,
    ) -> Result<Vec<RoadNode>, ContractError>;

    /// ROAD nodes of one road in polyline order
    async fn nodes_for_road_ordered(&self, road_id: &str) -> Result<Vec<RoadNode>, ContractError>;

    /// Overwrite the traffic level of every listed node
    ///
    /// Returns the number of nodes written.
    async fn bulk_set_traffic(
        &self,
        node_ids: &[u64],
        level: TrafficLevel,
        updated_at: DateTime<Utc>,
    ) -> Result<usize, ContractError>;

    /// All distinct road ids, sorted
    async fn road_ids(&self) -> Result<Vec<String>, ContractError>;
}

/// Vehicle state + history store
#[trait_variant::make(VehicleStore: Send)]
pub trait LocalVehicleStore {
    /// Create or overwrite the state row of one vehicle
    async fn upsert_state(
        &self,
        vehicle_id: &VehicleId,
        update: StateUpdate,
    ) -> Result<VehicleState, ContractError>;

    async fn get_state(&self, vehicle_id: &str) -> Result<Option<VehicleState>, ContractError>;

    /// Most recently appended history record, optionally only `valid == true`
    async fn latest_history(
        &self,
        vehicle_id: &str,
        valid_only: bool,
    ) -> Result<Option<HistoryRecord>, ContractError>;

    /// Append-only
    async fn append_history(&self, record: HistoryRecord) -> Result<(), ContractError>;

    /// History of one vehicle, most recently appended first
    async fn trajectory(
        &self,
        vehicle_id: &str,
        range: Option<TimeRange>,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, ContractError>;

    /// Current states inside `bbox`, no recency filter
    async fn vehicles_in_area(&self, bbox: BoundingBox) -> Result<Vec<VehicleState>, ContractError>;

    /// Vehicles inside `bbox` whose state was updated at or after `updated_since`
    async fn count_vehicles_in_area(
        &self,
        bbox: BoundingBox,
        updated_since: DateTime<Utc>,
    ) -> Result<usize, ContractError>;

    /// History records inside `bbox` with `timestamp >= since`
    async fn history_in_area(
        &self,
        bbox: BoundingBox,
        since: i64,
    ) -> Result<Vec<HistoryRecord>, ContractError>;

    /// Remove history with `timestamp < cutoff`, returns removed count
    async fn clean_history_before(&self, cutoff: i64) -> Result<usize, ContractError>;
}
