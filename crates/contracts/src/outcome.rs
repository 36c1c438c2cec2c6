//! Filter / matcher outcomes
//!
//! 过滤器的"无位置"和匹配器的两种失败路径都用显式枚举表示，不使用哨兵值。

use serde::{Deserialize, Serialize};

use crate::{Point, RoadNode};

/// Why the location filter dropped a report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// 设备标记为无效
    FlaggedInvalid,
    /// 坐标为 (0,0)，设备未定位
    NoFix,
    /// 信号强度低于下限
    WeakSignal { rssi: i32 },
    /// 与上一个接受点相比时间未前进
    NonIncreasingTime { elapsed_secs: i64 },
    /// 隐含速度超过上限
    ImplausibleSpeed { speed: f64 },
}

impl RejectReason {
    /// Stable label for metrics/logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::FlaggedInvalid => "flagged_invalid",
            RejectReason::NoFix => "no_fix",
            RejectReason::WeakSignal { .. } => "weak_signal",
            RejectReason::NonIncreasingTime { .. } => "non_increasing_time",
            RejectReason::ImplausibleSpeed { .. } => "implausible_speed",
        }
    }
}

/// Location filter result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOutcome {
    Accepted(Point),
    Rejected(RejectReason),
}

impl FilterOutcome {
    pub fn position(&self) -> Option<Point> {
        match self {
            FilterOutcome::Accepted(p) => Some(*p),
            FilterOutcome::Rejected(_) => None,
        }
    }
}

/// Successful map match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// 匹配后的坐标（线段投影点或最近节点）
    pub matched: Point,
    pub road_id: Option<String>,
    /// [0, 1]
    pub confidence: f64,
    /// 输入点到匹配点的距离
    pub distance: f64,
    /// 是否采用了线段投影
    pub projected: bool,
    pub nearest_node: RoadNode,
}

/// Map matcher result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched(MatchResult),
    /// 搜索范围内没有道路节点
    NoCandidates,
    /// 最近节点超出最大偏离距离
    TooFar { distance: f64 },
}

impl MatchOutcome {
    pub fn as_match(&self) -> Option<&MatchResult> {
        match self {
            MatchOutcome::Matched(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_match(self) -> Option<MatchResult> {
        match self {
            MatchOutcome::Matched(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::Matched(_) => "matched",
            MatchOutcome::NoCandidates => "no_candidates",
            MatchOutcome::TooFar { .. } => "too_far",
        }
    }
}
