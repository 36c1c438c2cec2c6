//! Per-report processing sequence
//!
//! 顺序：读上一条有效历史 -> 追加历史 -> 过滤 -> 地图匹配 -> 更新状态 -> 重算道路拥堵。
//! 每个阶段的存储失败只记录日志，不撤销已完成的阶段。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ContractError, FilterOutcome, HistoryRecord, MatchOutcome, Point, RawReport, RoadNodeStore,
    StateUpdate, TrackerBlueprint, VehicleId, VehicleStore,
};
use location_filter::LocationFilter;
use map_matcher::MapMatcher;
use serde::Serialize;
use tracing::{debug, error, instrument};
use traffic::{TrafficAggregator, TrafficAssessment};

/// Where the adopted state position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    Matched,
    /// 无匹配或置信度不足
    Filtered,
}

/// Store-touching stage of the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LatestHistory,
    AppendHistory,
    Match,
    UpsertState,
    Traffic,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LatestHistory => "latest_history",
            Stage::AppendHistory => "append_history",
            Stage::Match => "match",
            Stage::UpsertState => "upsert_state",
            Stage::Traffic => "traffic",
        }
    }
}

/// What happened to one report
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub vehicle_id: VehicleId,
    pub filter: FilterOutcome,
    /// `None` when the filter dropped the report or the matcher call failed
    pub matching: Option<MatchOutcome>,
    pub adopted: Option<(Point, PositionSource)>,
    pub speed: Option<f64>,
    pub traffic: Option<TrafficAssessment>,
    pub store_failures: Vec<Stage>,
}

impl ReportOutcome {
    fn new(vehicle_id: VehicleId, filter: FilterOutcome) -> Self {
        Self {
            vehicle_id,
            filter,
            matching: None,
            adopted: None,
            speed: None,
            traffic: None,
            store_failures: Vec::new(),
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        self.matching
            .as_ref()
            .and_then(MatchOutcome::as_match)
            .map(|m| m.confidence)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// 低于此置信度时改用过滤后的坐标
    pub min_confidence: f64,
    pub store_timeout: Duration,
}

impl ProcessorConfig {
    pub fn from_blueprint(blueprint: &TrackerBlueprint) -> Self {
        Self {
            min_confidence: blueprint.matcher.min_confidence,
            store_timeout: blueprint.workers.store_timeout(),
        }
    }
}

/// Speed against the prior valid history record, 0 without one or when time did not advance
pub fn implied_speed(position: Point, timestamp: i64, prior: Option<&HistoryRecord>) -> f64 {
    match prior {
        Some(prior) if timestamp > prior.timestamp => {
            position.distance_to(&prior.position()) / (timestamp - prior.timestamp) as f64
        }
        _ => 0.0,
    }
}

async fn with_timeout<T, F>(stage: Stage, timeout: Duration, fut: F) -> Result<T, ContractError>
where
    F: Future<Output = Result<T, ContractError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ContractError::store_timeout(
            stage.as_str(),
            timeout.as_millis() as u64,
        )),
    }
}

/// Shared, stateless part of report processing
///
/// 过滤窗口由各车辆 worker 自己持有，这里只依赖存储和匹配器。
pub struct ReportProcessor<R, V> {
    vehicles: Arc<V>,
    matcher: MapMatcher<R>,
    aggregator: TrafficAggregator<R, V>,
    config: ProcessorConfig,
}

impl<R, V> ReportProcessor<R, V>
where
    R: RoadNodeStore + Send + Sync + 'static,
    V: VehicleStore + Send + Sync + 'static,
{
    pub fn new(
        vehicles: Arc<V>,
        matcher: MapMatcher<R>,
        aggregator: TrafficAggregator<R, V>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            vehicles,
            matcher,
            aggregator,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    #[instrument(
        name = "process_report",
        skip(self, filter, report),
        fields(vehicle_id = %report.vehicle_id, timestamp = report.timestamp)
    )]
    pub async fn process(&self, filter: &mut LocationFilter, report: RawReport) -> ReportOutcome {
        let timeout = self.config.store_timeout;
        let id = report.vehicle_id.clone();
        let mut failures = Vec::new();

        // 先取上一条有效历史，再追加本条
        let prior = match with_timeout(
            Stage::LatestHistory,
            timeout,
            self.vehicles.latest_history(&id, true),
        )
        .await
        {
            Ok(prior) => prior,
            Err(e) => {
                self.store_failed(&id, Stage::LatestHistory, &e, &mut failures);
                None
            }
        };

        if let Err(e) = with_timeout(
            Stage::AppendHistory,
            timeout,
            self.vehicles.append_history(HistoryRecord::from_report(&report)),
        )
        .await
        {
            self.store_failed(&id, Stage::AppendHistory, &e, &mut failures);
        }

        let filter_outcome = filter.process(&report);
        let mut outcome = ReportOutcome::new(id.clone(), filter_outcome);
        outcome.store_failures = failures;

        let Some(filtered) = filter_outcome.position() else {
            if let FilterOutcome::Rejected(reason) = filter_outcome {
                metrics::counter!("reports_rejected_total", "reason" => reason.as_str()).increment(1);
                debug!(reason = reason.as_str(), "report dropped by filter");
            }
            return outcome;
        };
        metrics::counter!("reports_accepted_total").increment(1);

        let matching = match with_timeout(Stage::Match, timeout, self.matcher.match_point(filtered)).await {
            Ok(m) => Some(m),
            Err(e) => {
                self.store_failed(&id, Stage::Match, &e, &mut outcome.store_failures);
                None
            }
        };

        let confident = matching
            .as_ref()
            .and_then(MatchOutcome::as_match)
            .filter(|m| m.confidence >= self.config.min_confidence);

        let (position, source) = match confident {
            Some(m) => (m.matched, PositionSource::Matched),
            None => {
                if let Some(m) = matching.as_ref().and_then(MatchOutcome::as_match) {
                    metrics::counter!("match_low_confidence_total").increment(1);
                    debug!(confidence = m.confidence, "low confidence, using filtered position");
                }
                (filtered, PositionSource::Filtered)
            }
        };
        let road_id = confident.and_then(|m| m.road_id.clone());

        let speed = implied_speed(position, report.timestamp, prior.as_ref());
        metrics::histogram!("vehicle_implied_speed").record(speed);

        match with_timeout(
            Stage::UpsertState,
            timeout,
            self.vehicles
                .upsert_state(&id, StateUpdate::from_report(&report, position, speed)),
        )
        .await
        {
            Ok(_) => metrics::counter!("state_upserts_total").increment(1),
            Err(e) => self.store_failed(&id, Stage::UpsertState, &e, &mut outcome.store_failures),
        }

        if let Some(road_id) = road_id {
            match with_timeout(Stage::Traffic, timeout, self.aggregator.recompute(&road_id)).await {
                Ok(assessment) => outcome.traffic = Some(assessment),
                Err(e) => self.store_failed(&id, Stage::Traffic, &e, &mut outcome.store_failures),
            }
        }

        outcome.matching = matching;
        outcome.adopted = Some((position, source));
        outcome.speed = Some(speed);
        outcome
    }

    fn store_failed(&self, id: &VehicleId, stage: Stage, e: &ContractError, failures: &mut Vec<Stage>) {
        metrics::counter!("store_failures_total", "stage" => stage.as_str()).increment(1);
        error!(vehicle_id = %id, stage = stage.as_str(), error = %e, "store call failed");
        failures.push(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{
        FilterConfig, MatcherConfig, RoadNode, TimeRange, TrafficConfig,
        TrafficLevel, VehicleState, VehicleType,
    };
    use store::MemoryStore;

    fn report(id: &str, x: f64, y: f64, timestamp: i64) -> RawReport {
        RawReport {
            vehicle_id: id.into(),
            vehicle_type: VehicleType::Car,
            valid: true,
            x,
            y,
            distance: 0.0,
            angle: 0.0,
            direction: "东".into(),
            timestamp,
            events: 0,
            rssi: Some(-50),
            received_at: Utc::now(),
        }
    }

    fn processor(store: &Arc<MemoryStore>) -> ReportProcessor<MemoryStore, MemoryStore> {
        ReportProcessor::new(
            Arc::clone(store),
            MapMatcher::new(Arc::clone(store), MatcherConfig::default()),
            TrafficAggregator::new(Arc::clone(store), Arc::clone(store), TrafficConfig::default()),
            ProcessorConfig {
                min_confidence: 0.3,
                store_timeout: Duration::from_millis(200),
            },
        )
    }

    fn straight_road() -> Vec<RoadNode> {
        (0..5)
            .map(|i| RoadNode::road(i, 100.0 + i as f64 * 20.0, 100.0, Some("main")))
            .collect()
    }

    #[test]
    fn test_implied_speed() {
        let prior = HistoryRecord::from_report(&report("a", 0.0, 0.0, 10));
        assert_eq!(implied_speed(Point::new(3.0, 4.0), 11, Some(&prior)), 5.0);
        assert_eq!(implied_speed(Point::new(3.0, 4.0), 10, Some(&prior)), 0.0);
        assert_eq!(implied_speed(Point::new(3.0, 4.0), 9, Some(&prior)), 0.0);
        assert_eq!(implied_speed(Point::new(3.0, 4.0), 11, None), 0.0);
    }

    #[tokio::test]
    async fn test_matched_report_updates_state_and_traffic() {
        let store = Arc::new(MemoryStore::with_nodes(straight_road()));
        let processor = processor(&store);
        let mut filter = LocationFilter::new(&FilterConfig::default());

        let outcome = processor.process(&mut filter, report("car_1", 130.0, 102.0, 100)).await;

        let (position, source) = outcome.adopted.unwrap();
        assert_eq!(source, PositionSource::Matched);
        assert!((position.y - 100.0).abs() < 1e-9);
        assert!(outcome.store_failures.is_empty());
        assert_eq!(outcome.speed, Some(0.0));

        let traffic = outcome.traffic.unwrap();
        assert_eq!(traffic.road_id, "main");
        // 1 vehicle / 5 nodes
        assert_eq!(traffic.level, TrafficLevel::Normal);

        let state = store.get_state("car_1").await.unwrap().unwrap();
        assert_eq!(state.position(), position);
    }

    #[tokio::test]
    async fn test_unmatched_report_falls_back_to_filtered() {
        let store = Arc::new(MemoryStore::with_nodes(straight_road()));
        let processor = processor(&store);
        let mut filter = LocationFilter::new(&FilterConfig::default());

        let outcome = processor.process(&mut filter, report("car_1", 500.0, 500.0, 100)).await;

        assert_eq!(outcome.matching, Some(MatchOutcome::NoCandidates));
        assert_eq!(outcome.adopted, Some((Point::new(500.0, 500.0), PositionSource::Filtered)));
        assert!(outcome.traffic.is_none());
        assert_eq!(store.get_state("car_1").await.unwrap().unwrap().x, 500.0);
    }

    #[tokio::test]
    async fn test_rejected_report_still_recorded() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(&store);
        let mut filter = LocationFilter::new(&FilterConfig::default());

        let mut invalid = report("car_1", 10.0, 10.0, 100);
        invalid.valid = false;
        let outcome = processor.process(&mut filter, invalid).await;

        assert!(outcome.adopted.is_none());
        assert_eq!(store.history_len("car_1").await, 1);
        assert!(store.get_state("car_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_speed_uses_prior_valid_record() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(&store);
        let mut filter = LocationFilter::new(&FilterConfig::default());

        processor.process(&mut filter, report("car_1", 300.0, 300.0, 100)).await;
        let mut invalid = report("car_1", 900.0, 900.0, 101);
        invalid.valid = false;
        processor.process(&mut filter, invalid).await;
        let outcome = processor.process(&mut filter, report("car_1", 304.0, 303.0, 102)).await;

        // 平滑后位置相对 (300,300) 的位移除以 2 秒
        let (position, _) = outcome.adopted.unwrap();
        let expected = position.distance_to(&Point::new(300.0, 300.0)) / 2.0;
        assert!((outcome.speed.unwrap() - expected).abs() < 1e-9);
    }

    /// Vehicle store whose every call fails
    struct BrokenStore;

    impl VehicleStore for BrokenStore {
        async fn upsert_state(&self, _: &VehicleId, _: StateUpdate) -> Result<VehicleState, ContractError> {
            Err(ContractError::store_write("broken", "down"))
        }
        async fn get_state(&self, _: &str) -> Result<Option<VehicleState>, ContractError> {
            Err(ContractError::store_read("broken", "down"))
        }
        async fn latest_history(&self, _: &str, _: bool) -> Result<Option<HistoryRecord>, ContractError> {
            Err(ContractError::store_read("broken", "down"))
        }
        async fn append_history(&self, _: HistoryRecord) -> Result<(), ContractError> {
            Err(ContractError::store_write("broken", "down"))
        }
        async fn trajectory(
            &self,
            _: &str,
            _: Option<TimeRange>,
            _: usize,
        ) -> Result<Vec<HistoryRecord>, ContractError> {
            Err(ContractError::store_read("broken", "down"))
        }
        async fn vehicles_in_area(&self, _: contracts::BoundingBox) -> Result<Vec<VehicleState>, ContractError> {
            Err(ContractError::store_read("broken", "down"))
        }
        async fn count_vehicles_in_area(
            &self,
            _: contracts::BoundingBox,
            _: chrono::DateTime<Utc>,
        ) -> Result<usize, ContractError> {
            Err(ContractError::store_read("broken", "down"))
        }
        async fn history_in_area(
            &self,
            _: contracts::BoundingBox,
            _: i64,
        ) -> Result<Vec<HistoryRecord>, ContractError> {
            Err(ContractError::store_read("broken", "down"))
        }
        async fn clean_history_before(&self, _: i64) -> Result<usize, ContractError> {
            Err(ContractError::store_write("broken", "down"))
        }
    }

    #[tokio::test]
    async fn test_store_failures_do_not_abort_sequence() {
        let roads = Arc::new(MemoryStore::with_nodes(straight_road()));
        let broken = Arc::new(BrokenStore);
        let processor = ReportProcessor::new(
            Arc::clone(&broken),
            MapMatcher::new(Arc::clone(&roads), MatcherConfig::default()),
            TrafficAggregator::new(Arc::clone(&roads), Arc::clone(&broken), TrafficConfig::default()),
            ProcessorConfig {
                min_confidence: 0.3,
                store_timeout: Duration::from_millis(200),
            },
        );
        let mut filter = LocationFilter::new(&FilterConfig::default());

        let outcome = processor.process(&mut filter, report("car_1", 130.0, 101.0, 100)).await;

        assert_eq!(
            outcome.store_failures,
            vec![Stage::LatestHistory, Stage::AppendHistory, Stage::UpsertState, Stage::Traffic]
        );
        assert_eq!(outcome.adopted.map(|(_, s)| s), Some(PositionSource::Matched));
        assert_eq!(filter.len(), 1);
    }
}
