//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use super::{load_blueprint, load_road_network};
use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig, SourceKind};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let blueprint = load_blueprint(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let nodes = load_road_network(&blueprint, &args.config)
        .context("Failed to load road network")?;

    info!(
        topic_pattern = %blueprint.ingest.topic_pattern,
        nodes = nodes.len(),
        queue_capacity = blueprint.workers.queue_capacity,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint, nodes.len());
        return Ok(());
    }

    let source = match &args.replay {
        Some(path) => SourceKind::Replay {
            path: path.clone(),
            speed: args.replay_speed.filter(|s| *s > 0.0),
        },
        None => SourceKind::Mock {
            vehicles: args.mock_vehicles,
            frequency_hz: args.mock_frequency,
            max_ticks: (args.mock_ticks > 0).then_some(args.mock_ticks),
        },
    };

    // Build pipeline configuration
    let pipeline_config = PipelineConfig {
        blueprint,
        nodes,
        source,
        max_reports: (args.max_reports > 0).then_some(args.max_reports),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let pipeline = Pipeline::new(pipeline_config);

    info!("Starting pipeline...");

    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        reports_dispatched = stats.reports_dispatched,
        vehicles = stats.vehicles,
        duration_secs = stats.duration.as_secs_f64(),
        reports_per_sec = format!("{:.2}", stats.reports_per_sec()),
        "Pipeline completed"
    );

    // Print detailed statistics
    stats.print_summary();

    if let Some(path) = &args.snapshot {
        let snapshot = pipeline.store().snapshot().await;
        snapshot
            .write_to(path)
            .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
        info!(
            path = %path.display(),
            states = snapshot.states.len(),
            history = snapshot.history.len(),
            "Store snapshot written"
        );
    }

    if let Some(vehicle_id) = &args.trajectory {
        let records = pipeline.trajectory(vehicle_id).await?;
        println!("\nTrajectory of {vehicle_id} ({} records, most recent first):", records.len());
        for r in &records {
            println!(
                "  t={} ({:.2}, {:.2}) valid={} rssi={:?}",
                r.timestamp, r.x, r.y, r.valid, r.rssi
            );
        }
    }

    info!("Vehicle Tracker finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// 信号处理器安装失败时只记录警告，该信号源永不触发。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::TrackerBlueprint, node_count: usize) {
    println!("\n=== Configuration Summary ===\n");
    println!("Ingest:");
    println!("  Topic pattern: {}", blueprint.ingest.topic_pattern);
    println!(
        "  Queue: {} ({:?})",
        blueprint.ingest.channel_capacity, blueprint.ingest.drop_policy
    );
    println!("\nFilter:");
    println!("  Window: {}", blueprint.filter.window_capacity);
    println!("  Max speed: {}", blueprint.filter.max_speed);
    println!("\nMatcher:");
    println!("  Search radius: {}", blueprint.matcher.search_radius);
    println!("  Max deviation: {}", blueprint.matcher.max_deviation);
    println!("\nRoad network: {} nodes", node_count);
    println!();
}
