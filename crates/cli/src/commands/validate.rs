//! `validate` command implementation.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use contracts::{BlockCategory, RoadNode, TrackerBlueprint};
use serde::Serialize;
use tracing::info;

use super::{load_blueprint, load_road_network};
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    topic_pattern: String,
    node_count: usize,
    road_count: usize,
    queue_capacity: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();

    let loaded = load_blueprint(path).and_then(|blueprint| {
        let nodes = load_road_network(&blueprint, path)?;
        Ok((blueprint, nodes))
    });

    match loaded {
        Ok((blueprint, nodes)) => {
            let warnings = collect_warnings(&blueprint, &nodes);
            let road_count = nodes
                .iter()
                .filter(|n| n.is_road())
                .filter_map(|n| n.road_id.as_deref())
                .collect::<BTreeSet<_>>()
                .len();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    topic_pattern: blueprint.ingest.topic_pattern.clone(),
                    node_count: nodes.len(),
                    road_count,
                    queue_capacity: blueprint.workers.queue_capacity,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &TrackerBlueprint, nodes: &[RoadNode]) -> Vec<String> {
    let mut warnings = Vec::new();

    if nodes.is_empty() {
        warnings.push("No road nodes configured - every report will be unmatched".to_string());
    } else if !nodes.iter().any(|n| n.category == BlockCategory::Road) {
        warnings.push("Road network has no ROAD nodes".to_string());
    }

    let unassigned = nodes
        .iter()
        .filter(|n| n.is_road() && n.road_id.is_none())
        .count();
    if unassigned > 0 {
        warnings.push(format!(
            "{} ROAD node(s) have no road_id - matches on them never update traffic",
            unassigned
        ));
    }

    if !blueprint.normalizer.trust_device_clock {
        warnings.push(
            "normalizer.trust_device_clock is false - report time is the server receive time"
                .to_string(),
        );
    }

    if blueprint.matcher.min_confidence <= 0.0 {
        warnings.push("matcher.min_confidence is 0 - every match is adopted".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Topic pattern: {}", summary.topic_pattern);
            println!("  Road nodes: {}", summary.node_count);
            println!("  Roads: {}", summary.road_count);
            println!("  Worker queue capacity: {}", summary.queue_capacity);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
