//! Topic 模式与订阅集合
//!
//! 单层通配 `+`，订阅过滤器允许末尾的多层通配 `#`。

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use contracts::ContractError;
use tracing::debug;

/// Topic pattern with exactly one `+` segment carrying the vehicle id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<String>,
    id_index: usize,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Result<Self, ContractError> {
        let segments: Vec<String> = pattern.split('/').map(str::to_string).collect();
        let wildcards: Vec<usize> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_str() == "+")
            .map(|(i, _)| i)
            .collect();

        match wildcards.as_slice() {
            [id_index] if !segments.iter().any(|s| s.is_empty() || s.contains('#')) => Ok(Self {
                raw: pattern.to_string(),
                id_index: *id_index,
                segments,
            }),
            _ => Err(ContractError::config_validation(
                "ingest.topic_pattern",
                format!("'{pattern}' must contain exactly one '+' segment and no empty or '#' segments"),
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Vehicle id carried by `topic`, `None` if the topic does not match
    pub fn extract<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let parts: Vec<&'a str> = topic.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let literal_match = self
            .segments
            .iter()
            .zip(&parts)
            .enumerate()
            .all(|(i, (seg, part))| i == self.id_index || seg == part);

        match parts[self.id_index] {
            id if literal_match && !id.is_empty() => Some(id),
            _ => None,
        }
    }

    /// Concrete topic of one vehicle
    pub fn topic_for(&self, vehicle_id: &str) -> String {
        let mut segments: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        segments[self.id_index] = vehicle_id;
        segments.join("/")
    }

    /// 将 topic 映射到 vehicle id，不匹配时返回 `TopicMismatch`
    pub fn vehicle_id<'a>(&self, topic: &'a str) -> Result<&'a str, ContractError> {
        self.extract(topic).ok_or_else(|| ContractError::TopicMismatch {
            topic: topic.to_string(),
            pattern: self.raw.clone(),
        })
    }
}

/// MQTT-style filter match: `+` one level, trailing `#` any remainder
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut topic_parts = topic.split('/');
    for seg in filter.split('/') {
        if seg == "#" {
            return true;
        }
        match topic_parts.next() {
            Some(part) if seg == "+" || seg == part => {}
            _ => return false,
        }
    }
    topic_parts.next().is_none()
}

/// Active topic filters
///
/// 默认只有通配订阅；按车辆订阅会在其上追加具体 topic。
#[derive(Debug)]
pub struct SubscriptionSet {
    pattern: TopicPattern,
    filters: RwLock<BTreeSet<String>>,
}

impl SubscriptionSet {
    /// 空的 `initial` 表示使用通配模式本身
    pub fn new(pattern: TopicPattern, initial: &[String]) -> Self {
        let filters: BTreeSet<String> = if initial.is_empty() {
            BTreeSet::from([pattern.as_str().to_string()])
        } else {
            initial.iter().cloned().collect()
        };
        Self {
            pattern,
            filters: RwLock::new(filters),
        }
    }

    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    /// Subscribe to `vehicle/{id}/info`, returns false if already present
    pub fn subscribe_vehicle(&self, vehicle_id: &str) -> bool {
        let topic = self.pattern.topic_for(vehicle_id);
        let added = self
            .filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.clone());
        debug!(topic = %topic, added, "Subscribe vehicle");
        added
    }

    pub fn unsubscribe_vehicle(&self, vehicle_id: &str) -> bool {
        let topic = self.pattern.topic_for(vehicle_id);
        let removed = self
            .filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&topic);
        debug!(topic = %topic, removed, "Unsubscribe vehicle");
        removed
    }

    pub fn unsubscribe_all(&self) {
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn accepts(&self, topic: &str) -> bool {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|f| filter_matches(f, topic))
    }

    pub fn filters(&self) -> Vec<String> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> TopicPattern {
        TopicPattern::parse("vehicle/+/info").unwrap()
    }

    #[test]
    fn test_extract_vehicle_id() {
        let p = pattern();
        assert_eq!(p.extract("vehicle/esp32_01/info"), Some("esp32_01"));
        assert_eq!(p.extract("vehicle//info"), None);
        assert_eq!(p.extract("vehicle/a/status"), None);
        assert_eq!(p.extract("vehicle/a/info/extra"), None);
        assert!(matches!(
            p.vehicle_id("fleet/a/info"),
            Err(ContractError::TopicMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_patterns() {
        assert!(TopicPattern::parse("vehicle/info").is_err());
        assert!(TopicPattern::parse("vehicle/+/+").is_err());
        assert!(TopicPattern::parse("vehicle/+/#").is_err());
        assert_eq!(pattern().topic_for("car_7"), "vehicle/car_7/info");
    }

    #[test]
    fn test_filter_matches() {
        assert!(filter_matches("vehicle/+/info", "vehicle/a/info"));
        assert!(filter_matches("vehicle/#", "vehicle/a/info"));
        assert!(!filter_matches("vehicle/+", "vehicle/a/info"));
        assert!(!filter_matches("vehicle/b/info", "vehicle/a/info"));
    }

    #[test]
    fn test_subscription_set() {
        let subs = SubscriptionSet::new(pattern(), &[]);
        assert!(subs.accepts("vehicle/any/info"));

        subs.unsubscribe_all();
        assert!(!subs.accepts("vehicle/car_1/info"));

        assert!(subs.subscribe_vehicle("car_1"));
        assert!(!subs.subscribe_vehicle("car_1"));
        assert!(subs.accepts("vehicle/car_1/info"));
        assert!(!subs.accepts("vehicle/car_2/info"));

        assert!(subs.unsubscribe_vehicle("car_1"));
        assert!(subs.filters().is_empty());
    }
}
