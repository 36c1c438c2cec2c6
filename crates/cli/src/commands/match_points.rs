//! `match` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use contracts::{MatchOutcome, Point};
use map_matcher::MapMatcher;
use serde::Serialize;
use store::MemoryStore;
use tracing::info;

use super::{load_blueprint, load_road_network};
use crate::cli::MatchArgs;
use crate::error::{self, CliError};

#[derive(Serialize)]
struct MatchLine {
    x: f64,
    y: f64,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    road_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance: Option<f64>,
    /// 置信度是否达到采用阈值
    adopted: bool,
}

impl MatchLine {
    fn new(point: Point, outcome: &MatchOutcome, min_confidence: f64) -> Self {
        let mut line = Self {
            x: point.x,
            y: point.y,
            outcome: outcome.as_str(),
            matched: None,
            road_id: None,
            confidence: None,
            distance: None,
            adopted: false,
        };
        match outcome {
            MatchOutcome::Matched(m) => {
                line.matched = Some(m.matched);
                line.road_id = m.road_id.clone();
                line.confidence = Some(m.confidence);
                line.distance = Some(m.distance);
                line.adopted = m.confidence >= min_confidence;
            }
            MatchOutcome::TooFar { distance } => line.distance = Some(*distance),
            MatchOutcome::NoCandidates => {}
        }
        line
    }
}

/// Execute the `match` command
pub async fn run_match(args: &MatchArgs) -> Result<()> {
    let points = args
        .points
        .iter()
        .map(|s| parse_point(s))
        .collect::<error::Result<Vec<_>>>()?;

    let blueprint = load_blueprint(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let nodes = load_road_network(&blueprint, &args.config)
        .context("Failed to load road network")?;
    info!(points = points.len(), nodes = nodes.len(), "Matching points");

    let store = Arc::new(MemoryStore::with_nodes(nodes));
    let matcher = MapMatcher::new(store, blueprint.matcher.clone());
    let outcomes = matcher
        .batch_match(&points)
        .await
        .context("Map matching failed")?;

    let lines: Vec<MatchLine> = points
        .iter()
        .zip(&outcomes)
        .map(|(p, o)| MatchLine::new(*p, o, blueprint.matcher.min_confidence))
        .collect();

    if args.json {
        let json = serde_json::to_string_pretty(&lines).context("Failed to serialize matches")?;
        println!("{}", json);
    } else {
        for line in &lines {
            print_line(line);
        }
    }

    Ok(())
}

fn print_line(line: &MatchLine) {
    match (line.matched, line.confidence) {
        (Some(m), Some(confidence)) => println!(
            "({:.2}, {:.2}) -> ({:.2}, {:.2}) road={} confidence={:.3} distance={:.2}{}",
            line.x,
            line.y,
            m.x,
            m.y,
            line.road_id.as_deref().unwrap_or("-"),
            confidence,
            line.distance.unwrap_or_default(),
            if line.adopted { "" } else { " (below threshold)" }
        ),
        _ => match line.distance {
            Some(d) => println!("({:.2}, {:.2}) -> {} (nearest {:.2})", line.x, line.y, line.outcome, d),
            None => println!("({:.2}, {:.2}) -> {}", line.x, line.y, line.outcome),
        },
    }
}

/// Parse `x,y`
fn parse_point(input: &str) -> error::Result<Point> {
    let (x, y) = input
        .split_once(',')
        .ok_or_else(|| CliError::invalid_point(input))?;
    let x: f64 = x.trim().parse().map_err(|_| CliError::invalid_point(input))?;
    let y: f64 = y.trim().parse().map_err(|_| CliError::invalid_point(input))?;
    if !x.is_finite() || !y.is_finite() {
        return Err(CliError::invalid_point(input));
    }
    Ok(Point::new(x, y))
}
