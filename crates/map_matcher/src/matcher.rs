//! Map Matcher - 将过滤后的位置吸附到路网
//!
//! 无状态：每次调用都从节点存储重新查询候选。
//!
//! 1. 候选：以点为中心、半宽 `search_radius` 的方框内的 ROAD 节点，按距离升序，取前 `candidate_limit` 个
//! 2. 无候选 -> `NoCandidates`；最近节点超过 `max_deviation` -> `TooFar`
//! 3. 最近节点属于某条道路时，投影到该道路折线的每一段，取最近投影；
//!    仅当它比最近节点更近且不超过 `max_deviation` 时采用
//! 4. 置信度 = clamp(1 - d / max_deviation, 0, 1)

use std::sync::Arc;

use contracts::{
    BlockCategory, BoundingBox, ContractError, MatchOutcome, MatchResult, MatcherConfig, Point,
    RoadNode, RoadNodeStore,
};
use tracing::{debug, instrument, trace};

use crate::geometry::project_onto_polyline;

/// Confidence for a final matching distance
///
/// 1 at zero deviation, 0 at `max_deviation`, never outside [0, 1].
#[inline]
pub fn confidence(distance: f64, max_deviation: f64) -> f64 {
    (1.0 - distance / max_deviation).clamp(0.0, 1.0)
}

/// Stateless geometric matcher over a road node store
pub struct MapMatcher<S> {
    store: Arc<S>,
    config: MatcherConfig,
}

impl<S> Clone for MapMatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S> MapMatcher<S>
where
    S: RoadNodeStore + Sync,
{
    pub fn new(store: Arc<S>, config: MatcherConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// ROAD nodes near `point` with their distance, nearest first
    pub async fn candidates(&self, point: Point) -> Result<Vec<(RoadNode, f64)>, ContractError> {
        let bbox = BoundingBox::around(point, self.config.search_radius);
        let nodes = self
            .store
            .nodes_in_bounding_box(bbox, BlockCategory::Road)
            .await?;

        let mut ranked: Vec<(RoadNode, f64)> = nodes
            .into_iter()
            .filter(RoadNode::is_road)
            .map(|node| {
                let d = node.position().distance_to(&point);
                (node, d)
            })
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(self.config.candidate_limit);
        Ok(ranked)
    }

    /// Match a single point
    ///
    /// # Errors
    /// Only store failures; "no match" is an outcome, not an error.
    #[instrument(name = "map_match", skip(self), fields(x = point.x, y = point.y))]
    pub async fn match_point(&self, point: Point) -> Result<MatchOutcome, ContractError> {
        let outcome = self.resolve(point).await?;

        metrics::counter!("map_match_total", "outcome" => outcome.as_str()).increment(1);
        match &outcome {
            MatchOutcome::Matched(m) => {
                metrics::histogram!("map_match_confidence").record(m.confidence);
                metrics::histogram!("map_match_distance").record(m.distance);
                trace!(
                    road_id = m.road_id.as_deref().unwrap_or("-"),
                    confidence = m.confidence,
                    projected = m.projected,
                    "Point matched"
                );
            }
            MatchOutcome::NoCandidates => debug!("No road node within search radius"),
            MatchOutcome::TooFar { distance } => {
                debug!(distance, "Nearest road node beyond max deviation")
            }
        }
        Ok(outcome)
    }

    async fn resolve(&self, point: Point) -> Result<MatchOutcome, ContractError> {
        let max_deviation = self.config.max_deviation;

        let Some((nearest, nearest_distance)) = self.candidates(point).await?.into_iter().next()
        else {
            return Ok(MatchOutcome::NoCandidates);
        };

        if nearest_distance > max_deviation {
            return Ok(MatchOutcome::TooFar {
                distance: nearest_distance,
            });
        }

        let mut matched = nearest.position();
        let mut distance = nearest_distance;
        let mut projected = false;

        if let Some(road_id) = nearest.road_id.as_deref() {
            let polyline = self.store.nodes_for_road_ordered(road_id).await?;
            if polyline.len() >= 2 {
                let best = project_onto_polyline(point, polyline.iter().map(RoadNode::position));
                if let Some(best) = best {
                    if best.distance < nearest_distance && best.distance < max_deviation {
                        matched = best.point;
                        distance = best.distance;
                        projected = true;
                    }
                }
            }
        }

        Ok(MatchOutcome::Matched(MatchResult {
            matched,
            road_id: nearest.road_id.clone(),
            confidence: confidence(distance, max_deviation),
            distance,
            projected,
            nearest_node: nearest,
        }))
    }

    /// Match many points, order preserved
    pub async fn batch_match(&self, points: &[Point]) -> Result<Vec<MatchOutcome>, ContractError> {
        let mut outcomes = Vec::with_capacity(points.len());
        for point in points {
            outcomes.push(self.match_point(*point).await?);
        }
        Ok(outcomes)
    }
}
