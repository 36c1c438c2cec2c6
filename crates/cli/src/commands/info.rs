//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{BlockCategory, RoadNode, TrackerBlueprint};
use serde::Serialize;
use tracing::info;

use super::{load_blueprint, load_road_network};
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    ingest: IngestInfo,
    pipeline: PipelineInfo,
    network: NetworkInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    roads: Vec<RoadInfo>,
}

#[derive(Serialize)]
struct IngestInfo {
    topic_pattern: String,
    channel_capacity: usize,
    drop_policy: String,
    subscriptions: Vec<String>,
    trust_device_clock: bool,
}

#[derive(Serialize)]
struct PipelineInfo {
    filter_window: usize,
    max_speed: f64,
    search_radius: f64,
    max_deviation: f64,
    min_confidence: f64,
    traffic_tolerance: f64,
    traffic_recency_secs: u64,
    worker_queue_capacity: usize,
    store_timeout_ms: u64,
    retention_days: u32,
}

#[derive(Serialize)]
struct NetworkInfo {
    node_count: usize,
    road_nodes: usize,
    building_nodes: usize,
    water_nodes: usize,
    road_count: usize,
}

#[derive(Serialize)]
struct RoadInfo {
    road_id: String,
    node_count: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let nodes = load_road_network(&blueprint, &args.config)
        .context("Failed to load road network")?;

    let info = build_config_info(&blueprint, &nodes, args.roads);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &TrackerBlueprint, nodes: &[RoadNode], with_roads: bool) -> ConfigInfo {
    let count = |category: BlockCategory| nodes.iter().filter(|n| n.category == category).count();

    let mut per_road: BTreeMap<&str, usize> = BTreeMap::new();
    for node in nodes.iter().filter(|n| n.is_road()) {
        if let Some(road_id) = node.road_id.as_deref() {
            *per_road.entry(road_id).or_insert(0) += 1;
        }
    }

    let roads = if with_roads {
        per_road
            .iter()
            .map(|(road_id, node_count)| RoadInfo {
                road_id: road_id.to_string(),
                node_count: *node_count,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        ingest: IngestInfo {
            topic_pattern: blueprint.ingest.topic_pattern.clone(),
            channel_capacity: blueprint.ingest.channel_capacity,
            drop_policy: format!("{:?}", blueprint.ingest.drop_policy),
            subscriptions: blueprint.ingest.subscriptions.clone(),
            trust_device_clock: blueprint.normalizer.trust_device_clock,
        },
        pipeline: PipelineInfo {
            filter_window: blueprint.filter.window_capacity,
            max_speed: blueprint.filter.max_speed,
            search_radius: blueprint.matcher.search_radius,
            max_deviation: blueprint.matcher.max_deviation,
            min_confidence: blueprint.matcher.min_confidence,
            traffic_tolerance: blueprint.traffic.tolerance,
            traffic_recency_secs: blueprint.traffic.recency_secs,
            worker_queue_capacity: blueprint.workers.queue_capacity,
            store_timeout_ms: blueprint.workers.store_timeout_ms,
            retention_days: blueprint.history.retention_days,
        },
        network: NetworkInfo {
            node_count: nodes.len(),
            road_nodes: count(BlockCategory::Road),
            building_nodes: count(BlockCategory::Building),
            water_nodes: count(BlockCategory::Water),
            road_count: per_road.len(),
        },
        roads,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Vehicle Tracker Configuration                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let ingest = &info.ingest;
    println!("📥 Ingest");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Topic pattern: {}", ingest.topic_pattern);
    println!(
        "   ├─ Queue: {} ({})",
        ingest.channel_capacity, ingest.drop_policy
    );
    if ingest.subscriptions.is_empty() {
        println!("   ├─ Subscriptions: (wildcard)");
    } else {
        println!("   ├─ Subscriptions: {:?}", ingest.subscriptions);
    }
    println!("   └─ Trust device clock: {}", ingest.trust_device_clock);

    let p = &info.pipeline;
    println!("\n⚙️  Pipeline");
    println!("   ├─ Filter window: {} (max speed {})", p.filter_window, p.max_speed);
    println!(
        "   ├─ Matcher: radius {}, max deviation {}, min confidence {}",
        p.search_radius, p.max_deviation, p.min_confidence
    );
    println!(
        "   ├─ Traffic: tolerance {}, recency {}s",
        p.traffic_tolerance, p.traffic_recency_secs
    );
    println!(
        "   ├─ Workers: queue {}, store timeout {}ms",
        p.worker_queue_capacity, p.store_timeout_ms
    );
    println!("   └─ History retention: {} days", p.retention_days);

    let n = &info.network;
    println!("\n🗺️  Road Network ({} nodes)", n.node_count);
    println!("   ├─ ROAD: {}", n.road_nodes);
    println!("   ├─ BUILDING: {}", n.building_nodes);
    println!("   ├─ WATER: {}", n.water_nodes);
    println!("   └─ Roads: {}", n.road_count);

    for (i, road) in info.roads.iter().enumerate() {
        let prefix = if i == info.roads.len() - 1 { "└─" } else { "├─" };
        println!("      {} {} ({} nodes)", prefix, road.road_id, road.node_count);
    }

    println!();
}
