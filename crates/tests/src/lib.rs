//! # 集成测试
//!
//! 跨 crate 的端到端测试：入口 -> 标准化 -> 分发 -> 每车处理 -> 存储。
//!
//! 全部使用内存存储，不依赖外部服务。

#[cfg(test)]
mod common {
    use chrono::Utc;
    use contracts::{RawReport, RoadNode, VehicleType};

    /// 10 个 ROAD 节点，y = 0，x = 0..90
    pub fn main_road() -> Vec<RoadNode> {
        (0..10)
            .map(|i| RoadNode::road(i, i as f64 * 10.0, 0.0, Some("main")))
            .collect()
    }

    pub fn report(id: &str, x: f64, y: f64, timestamp: i64) -> RawReport {
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
            rssi: Some(-60),
            received_at: Utc::now(),
        }
    }
}

/// 单车处理序列，直接驱动 `ReportProcessor`
#[cfg(test)]
mod processing_tests {
    use std::sync::Arc;

    use contracts::{
        FilterOutcome, Point, RejectReason, TrackerBlueprint, TrafficLevel, VehicleStore,
    };
    use dispatcher::{PositionSource, ProcessorConfig, ReportProcessor};
    use location_filter::LocationFilter;
    use map_matcher::MapMatcher;
    use store::MemoryStore;
    use traffic::TrafficAggregator;

    use crate::common::{main_road, report};

    fn processor(
        store: &Arc<MemoryStore>,
        bp: &TrackerBlueprint,
    ) -> ReportProcessor<MemoryStore, MemoryStore> {
        ReportProcessor::new(
            Arc::clone(store),
            MapMatcher::new(Arc::clone(store), bp.matcher.clone()),
            TrafficAggregator::new(Arc::clone(store), Arc::clone(store), bp.traffic.clone()),
            ProcessorConfig::from_blueprint(bp),
        )
    }

    #[tokio::test]
    async fn test_every_report_lands_in_history() {
        let bp = TrackerBlueprint::default();
        let store = Arc::new(MemoryStore::with_nodes(main_road()));
        let processor = processor(&store, &bp);
        let mut filter = LocationFilter::new(&bp.filter);

        let mut invalid = report("car_1", 20.0, 1.0, 101);
        invalid.valid = false;
        let no_fix = report("car_1", 0.0, 0.0, 102);
        let mut weak = report("car_1", 25.0, 1.0, 103);
        weak.rssi = Some(-120);

        let reports = vec![
            report("car_1", 10.0, 1.0, 100),
            invalid,
            no_fix,
            weak,
            report("car_1", 15.0, 1.0, 104),
        ];
        let submitted = reports.len();

        let mut rejected = 0;
        for r in reports {
            let outcome = processor.process(&mut filter, r).await;
            if matches!(outcome.filter, FilterOutcome::Rejected(_)) {
                rejected += 1;
            }
        }

        assert_eq!(rejected, 3);
        assert_eq!(store.history_len("car_1").await, submitted);
        let valid = store.latest_history("car_1", true).await.unwrap().unwrap();
        assert_eq!(valid.timestamp, 104);
    }

    #[tokio::test]
    async fn test_velocity_gate_leaves_state_untouched() {
        let bp = TrackerBlueprint::default();
        let store = Arc::new(MemoryStore::new());
        let processor = processor(&store, &bp);
        let mut filter = LocationFilter::new(&bp.filter);

        let first = processor.process(&mut filter, report("car_1", 100.0, 100.0, 1000)).await;
        assert!(first.adopted.is_some());
        let before = store.get_state("car_1").await.unwrap().unwrap();

        let jump = processor.process(&mut filter, report("car_1", 600.0, 100.0, 1001)).await;
        assert!(matches!(
            jump.filter,
            FilterOutcome::Rejected(RejectReason::ImplausibleSpeed { .. })
        ));
        assert!(jump.adopted.is_none());

        let after = store.get_state("car_1").await.unwrap().unwrap();
        assert_eq!(after.position(), before.position());
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(store.history_len("car_1").await, 2);
    }

    #[tokio::test]
    async fn test_low_confidence_match_keeps_filtered_position() {
        let bp = TrackerBlueprint::default();
        let store = Arc::new(MemoryStore::with_nodes(main_road()));
        let processor = processor(&store, &bp);
        let mut filter = LocationFilter::new(&bp.filter);

        // 16 units off the road: confidence 1 - 16/20 = 0.2
        let outcome = processor.process(&mut filter, report("car_1", 30.0, 16.0, 100)).await;

        assert!(outcome.confidence().unwrap() < bp.matcher.min_confidence);
        assert_eq!(
            outcome.adopted,
            Some((Point::new(30.0, 16.0), PositionSource::Filtered))
        );
        assert!(outcome.traffic.is_none());

        let nodes = store.nodes_for_road("main").await;
        assert!(nodes.iter().all(|n| n.traffic == TrafficLevel::Unknown));
    }

    #[tokio::test]
    async fn test_four_vehicles_on_ten_nodes_is_congested() {
        let bp = TrackerBlueprint::default();
        let store = Arc::new(MemoryStore::with_nodes(main_road()));
        let processor = processor(&store, &bp);

        let mut last = None;
        for (i, x) in [10.0, 30.0, 50.0, 70.0].into_iter().enumerate() {
            let mut filter = LocationFilter::new(&bp.filter);
            let id = format!("car_{i}");
            let outcome = processor.process(&mut filter, report(&id, x, 1.0, 100)).await;
            last = outcome.traffic;
        }

        let assessment = last.unwrap();
        assert_eq!(assessment.vehicle_count, 4);
        assert!((assessment.density - 0.4).abs() < 1e-9);
        assert_eq!(assessment.level, TrafficLevel::Congested);

        let nodes = store.nodes_for_road("main").await;
        assert_eq!(nodes.len(), 10);
        assert!(nodes.iter().all(|n| n.traffic == TrafficLevel::Congested));
    }

    #[tokio::test]
    async fn test_road_without_nodes_is_unknown() {
        let bp = TrackerBlueprint::default();
        let store = Arc::new(MemoryStore::with_nodes(main_road()));
        let aggregator = TrafficAggregator::new(Arc::clone(&store), Arc::clone(&store), bp.traffic);

        let assessment = aggregator.recompute("ghost").await.unwrap();
        assert_eq!(assessment.level, TrafficLevel::Unknown);
        assert_eq!(assessment.nodes_written, 0);
    }
}

/// 入口 + 分发器全链路
#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{InboundMessage, TrackerBlueprint, TrafficLevel, VehicleStore};
    use dispatcher::{DispatcherBuilder, DispatcherConfig};
    use ingestion::{IngestionPipeline, TestLocation};
    use store::MemoryStore;
    use tokio::sync::mpsc;
    use traffic::CongestionStats;

    use crate::common::main_road;

    #[tokio::test]
    async fn test_published_locations_reach_store() {
        let mut bp = TrackerBlueprint::default();
        bp.normalizer.trust_device_clock = true;

        let store = Arc::new(MemoryStore::with_nodes(main_road()));
        let mut ingestion = IngestionPipeline::new(&bp.ingest, bp.normalizer.clone()).unwrap();

        let (report_tx, report_rx) = mpsc::channel(64);
        let normalizer = ingestion.spawn_normalizer(report_tx).unwrap();
        let dispatcher = DispatcherBuilder::new(
            DispatcherConfig::from_blueprint(&bp),
            Arc::clone(&store),
            Arc::clone(&store),
            report_rx,
        )
        .build()
        .spawn();

        for i in 0..5 {
            let fields = TestLocation {
                x: Some(10.0 + i as f64 * 5.0),
                y: Some(2.0),
                timestamp: Some(1_700_000_000 + i),
                rssi: Some(-55),
                ..Default::default()
            };
            ingestion.publish_test_location("car_a", fields).unwrap();
        }
        // 不符合主题模式，不会产生报告
        assert!(ingestion
            .publish(InboundMessage::new("fleet/car_b/status", b"{}".to_vec()))
            .is_err());
        ingestion.close();

        tokio::time::timeout(Duration::from_secs(5), normalizer)
            .await
            .unwrap()
            .unwrap();
        let summary = tokio::time::timeout(Duration::from_secs(5), dispatcher)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.reports, 5);
        assert_eq!(summary.workers.len(), 1);
        let totals = summary.totals();
        assert_eq!(totals.processed, 5);
        assert_eq!(totals.rejected, 0);
        assert_eq!(totals.matched, 5);

        assert_eq!(ingestion.metrics().snapshot().reports_normalized, 5);
        assert_eq!(store.history_len("car_a").await, 5);
        assert_eq!(store.vehicle_count().await, 1);

        let state = store.get_state("car_a").await.unwrap().unwrap();
        assert!(state.y.abs() < 1e-6);

        // 1 vehicle / 10 nodes
        let stats = CongestionStats::new(Arc::clone(&store), Arc::clone(&store), bp.traffic.clone());
        let road = stats.road_congestion("main").await.unwrap();
        assert_eq!(road.level, TrafficLevel::Normal);
        assert_eq!(road.vehicles_on_road.len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribed_vehicle_is_ignored() {
        let mut bp = TrackerBlueprint::default();
        bp.normalizer.trust_device_clock = true;
        bp.ingest.subscriptions = vec!["vehicle/car_a/info".to_string()];

        let store = Arc::new(MemoryStore::new());
        let mut ingestion = IngestionPipeline::new(&bp.ingest, bp.normalizer.clone()).unwrap();
        let (report_tx, report_rx) = mpsc::channel(16);
        let normalizer = ingestion.spawn_normalizer(report_tx).unwrap();
        let dispatcher = DispatcherBuilder::new(
            DispatcherConfig::from_blueprint(&bp),
            Arc::clone(&store),
            Arc::clone(&store),
            report_rx,
        )
        .build()
        .spawn();

        let at = |x: f64, t: i64| TestLocation {
            x: Some(x),
            y: Some(50.0),
            timestamp: Some(t),
            ..Default::default()
        };
        ingestion.publish_test_location("car_a", at(50.0, 10)).unwrap();
        assert!(ingestion.publish_test_location("car_b", at(60.0, 10)).is_err());
        ingestion.close();

        normalizer.await.unwrap();
        let summary = dispatcher.await.unwrap();

        assert_eq!(summary.reports, 1);
        assert_eq!(summary.vehicles(), 1);
        assert_eq!(summary.workers[0].0, "car_a");
        assert_eq!(ingestion.metrics().snapshot().unsubscribed, 1);
        assert_eq!(store.history_len("car_b").await, 0);
    }
}

#[cfg(test)]
mod config_tests {
    use std::path::Path;

    use config_loader::{ConfigLoader, RoadNetworkLoader};
    use contracts::BlockCategory;

    #[test]
    fn test_demo_config_loads_with_network() {
        let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/config.toml");
        let (bp, nodes) = ConfigLoader::load_with_network(&config).unwrap();
        assert_eq!(bp.ingest.topic_pattern, "vehicle/+/info");
        assert!(bp.normalizer.trust_device_clock);
        assert_eq!(
            RoadNetworkLoader::resolve(&bp, config.parent()).unwrap().len(),
            nodes.len()
        );
        assert_eq!(nodes.len(), 18);
        assert_eq!(
            nodes.iter().filter(|n| n.category == BlockCategory::Road).count(),
            16
        );
    }
}
