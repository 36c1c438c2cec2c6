//! 配置校验模块
//!
//! 字段范围由 `validator` derive 规则检查，下面是跨字段规则：
//! - topic_pattern 恰好一个 `+` 段
//! - subscriptions 为合法主题过滤器
//! - moving_average_window <= window_capacity
//! - smooth_below <= normal_below
//! - 路网节点 id 唯一、坐标有限

use std::collections::HashSet;

use ::validator::Validate;
use contracts::{ContractError, RoadNode, TrackerBlueprint};

/// 校验 TrackerBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &TrackerBlueprint) -> Result<(), ContractError> {
    validate_field_ranges(blueprint)?;
    validate_topic_pattern(blueprint)?;
    validate_subscriptions(blueprint)?;
    validate_filter_window(blueprint)?;
    validate_traffic_bands(blueprint)?;
    validate_road_nodes(&blueprint.road_network.nodes)?;
    Ok(())
}

/// derive 规则
fn validate_field_ranges(blueprint: &TrackerBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::config_validation("blueprint", e.to_string().replace('\n', "; ")))
}

/// 校验主题模式
fn validate_topic_pattern(blueprint: &TrackerBlueprint) -> Result<(), ContractError> {
    let pattern = &blueprint.ingest.topic_pattern;
    let segments: Vec<&str> = pattern.split('/').collect();

    if segments.iter().any(|s| s.is_empty()) {
        return Err(ContractError::config_validation(
            "ingest.topic_pattern",
            format!("'{pattern}' contains an empty segment"),
        ));
    }
    if segments.iter().any(|s| s.contains('#')) {
        return Err(ContractError::config_validation(
            "ingest.topic_pattern",
            format!("'{pattern}' must not use the multi-level wildcard '#'"),
        ));
    }

    let wildcards = segments.iter().filter(|s| **s == "+").count();
    if wildcards != 1 {
        return Err(ContractError::config_validation(
            "ingest.topic_pattern",
            format!("'{pattern}' must contain exactly one '+' segment, found {wildcards}"),
        ));
    }
    if segments.iter().any(|s| *s != "+" && s.contains('+')) {
        return Err(ContractError::config_validation(
            "ingest.topic_pattern",
            format!("'{pattern}' mixes '+' with other characters in one segment"),
        ));
    }
    Ok(())
}

/// 校验订阅过滤器
fn validate_subscriptions(blueprint: &TrackerBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, filter) in blueprint.ingest.subscriptions.iter().enumerate() {
        let segments: Vec<&str> = filter.split('/').collect();
        let last = segments.len() - 1;
        let malformed = segments.iter().enumerate().any(|(i, s)| {
            s.is_empty()
                || (s.contains('+') && *s != "+")
                || (s.contains('#') && (*s != "#" || i != last))
        });
        if malformed {
            return Err(ContractError::config_validation(
                format!("ingest.subscriptions[{idx}]"),
                format!("'{filter}' is not a valid topic filter"),
            ));
        }
        if !seen.insert(filter.as_str()) {
            return Err(ContractError::config_validation(
                format!("ingest.subscriptions[{idx}]"),
                format!("duplicate subscription '{filter}'"),
            ));
        }
    }
    Ok(())
}

/// 滑动平均窗口不能超过过滤窗口
fn validate_filter_window(blueprint: &TrackerBlueprint) -> Result<(), ContractError> {
    let filter = &blueprint.filter;
    if filter.moving_average_window > filter.window_capacity {
        return Err(ContractError::config_validation(
            "filter.moving_average_window",
            format!(
                "moving_average_window ({}) must be <= window_capacity ({})",
                filter.moving_average_window, filter.window_capacity
            ),
        ));
    }
    Ok(())
}

/// 校验密度分级阈值
fn validate_traffic_bands(blueprint: &TrackerBlueprint) -> Result<(), ContractError> {
    let traffic = &blueprint.traffic;
    if traffic.smooth_below > traffic.normal_below {
        return Err(ContractError::config_validation(
            "traffic.smooth_below / traffic.normal_below",
            format!(
                "smooth_below ({}) must be <= normal_below ({})",
                traffic.smooth_below, traffic.normal_below
            ),
        ));
    }
    Ok(())
}

/// 校验路网节点
pub fn validate_road_nodes(nodes: &[RoadNode]) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id) {
            return Err(ContractError::config_validation(
                format!("road_network.nodes[id={}]", node.id),
                "duplicate node id",
            ));
        }
        if !node.x.is_finite() || !node.y.is_finite() {
            return Err(ContractError::config_validation(
                format!("road_network.nodes[id={}]", node.id),
                "coordinates must be finite",
            ));
        }
        if node.road_id.as_deref() == Some("") {
            return Err(ContractError::config_validation(
                format!("road_network.nodes[id={}].road_id", node.id),
                "road_id cannot be empty, omit it instead",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&TrackerBlueprint::default()).is_ok());
    }

    #[test]
    fn test_topic_pattern_needs_one_wildcard() {
        let mut bp = TrackerBlueprint::default();
        bp.ingest.topic_pattern = "vehicle/+/+/info".into();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("exactly one '+'"), "got: {err}");

        bp.ingest.topic_pattern = "vehicle/info".into();
        assert!(validate(&bp).is_err());

        bp.ingest.topic_pattern = "vehicle/car+/info".into();
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_subscription_filters() {
        let mut bp = TrackerBlueprint::default();
        bp.ingest.subscriptions = vec!["vehicle/esp32_01/info".into(), "vehicle/#".into()];
        assert!(validate(&bp).is_ok());

        bp.ingest.subscriptions = vec!["vehicle/#/info".into()];
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("subscriptions[0]"), "got: {err}");

        bp.ingest.subscriptions = vec!["a/b".into(), "a/b".into()];
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate subscription"), "got: {err}");
    }

    #[test]
    fn test_moving_average_exceeds_window() {
        let mut bp = TrackerBlueprint::default();
        bp.filter.window_capacity = 3;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("moving_average_window"), "got: {err}");
    }

    #[test]
    fn test_inverted_traffic_bands() {
        let mut bp = TrackerBlueprint::default();
        bp.traffic.smooth_below = 0.5;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("smooth_below"), "got: {err}");
    }

    #[test]
    fn test_range_rules_are_reported() {
        let mut bp = TrackerBlueprint::default();
        bp.matcher.max_deviation = 0.0;
        let err = validate(&bp).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
    }

    #[test]
    fn test_duplicate_node_id() {
        let mut bp = TrackerBlueprint::default();
        bp.road_network.nodes = vec![
            RoadNode::road(1, 0.0, 0.0, Some("r1")),
            RoadNode::road(1, 5.0, 0.0, Some("r1")),
        ];
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate node id"), "got: {err}");
    }
}
