//! TrackerBlueprint - Config Loader 输出
//!
//! 描述完整的管道配置：入口、标准化、过滤、匹配、交通聚合、工作者、历史保留、路网。
//! 所有字段都有默认值，空文件即合法配置。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::RoadNode;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的管道配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TrackerBlueprint {
    /// 配置版本
    pub version: ConfigVersion,

    /// 消息入口
    #[validate(nested)]
    pub ingest: IngestConfig,

    /// 遥测标准化
    #[validate(nested)]
    pub normalizer: NormalizerConfig,

    /// 位置过滤
    #[validate(nested)]
    pub filter: FilterConfig,

    /// 地图匹配
    #[validate(nested)]
    pub matcher: MatcherConfig,

    /// 交通密度聚合
    #[validate(nested)]
    pub traffic: TrafficConfig,

    /// 每车工作者
    #[validate(nested)]
    pub workers: WorkerConfig,

    /// 历史保留
    #[validate(nested)]
    pub history: HistoryConfig,

    /// 路网节点
    pub road_network: RoadNetworkConfig,
}

/// 入口配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IngestConfig {
    /// 主题模式，`+` 段携带车辆 ID
    #[validate(length(min = 1))]
    pub topic_pattern: String,

    /// 入口队列容量
    #[validate(range(min = 1))]
    pub channel_capacity: usize,

    /// 队列满时的丢弃策略
    pub drop_policy: DropPolicy,

    /// 订阅的主题过滤器，空表示订阅 `topic_pattern` 本身
    pub subscriptions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            topic_pattern: "vehicle/+/info".to_string(),
            channel_capacity: 1024,
            drop_policy: DropPolicy::DropNewest,
            subscriptions: Vec::new(),
        }
    }
}

/// 丢包策略 (背压满时)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// 丢弃最旧的消息
    DropOldest,
    /// 丢弃最新的消息
    #[default]
    DropNewest,
}

/// Normalizer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NormalizerConfig {
    /// 距离换算系数（设备分米 -> 米）
    #[validate(range(exclusive_min = 0.0))]
    pub distance_scale: f64,

    /// 坐标换算系数
    #[validate(range(exclusive_min = 0.0))]
    pub coordinate_scale: f64,

    /// 是否信任设备时间戳
    pub trust_device_clock: bool,

    /// 缺省方向标签
    pub default_direction: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            distance_scale: 0.1,
            coordinate_scale: 1.0,
            trust_device_clock: false,
            default_direction: "未知".to_string(),
        }
    }
}

/// Location filter configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FilterConfig {
    /// 每车保留的最近接受点数量
    #[validate(range(min = 1))]
    pub window_capacity: usize,

    /// Process noise (Q)
    #[validate(range(exclusive_min = 0.0))]
    pub process_noise: f64,

    /// Measurement noise (R)
    #[validate(range(min = 0.0))]
    pub measurement_noise: f64,

    /// 信号强度下限
    pub rssi_floor: i32,

    /// 速度上限 (units/s)
    #[validate(range(exclusive_min = 0.0))]
    pub max_speed: f64,

    /// 滑动平均窗口（含当前点）
    #[validate(range(min = 1))]
    pub moving_average_window: usize,
}

impl FilterConfig {
    /// Fixed gain K = Q / (Q + R)
    pub fn gain(&self) -> f64 {
        self.process_noise / (self.process_noise + self.measurement_noise)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            window_capacity: 10,
            process_noise: 0.1,
            measurement_noise: 1.0,
            rssi_floor: -100,
            max_speed: 10.0,
            moving_average_window: 5,
        }
    }
}

/// Map matcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MatcherConfig {
    /// 候选搜索方框半宽
    #[validate(range(exclusive_min = 0.0))]
    pub search_radius: f64,

    /// 候选节点上限
    #[validate(range(min = 1))]
    pub candidate_limit: usize,

    /// 最大偏离距离
    #[validate(range(exclusive_min = 0.0))]
    pub max_deviation: f64,

    /// 调用方采用匹配点的最低置信度
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            search_radius: 50.0,
            candidate_limit: 10,
            max_deviation: 20.0,
            min_confidence: 0.3,
        }
    }
}

/// Traffic aggregator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TrafficConfig {
    /// 道路包围盒外扩距离
    #[validate(range(min = 0.0))]
    pub tolerance: f64,

    /// 车辆状态的有效时间窗 (s)
    #[validate(range(min = 1))]
    pub recency_secs: u64,

    /// density < smooth_below -> SMOOTH
    #[validate(range(min = 0.0))]
    pub smooth_below: f64,

    /// density < normal_below -> NORMAL
    #[validate(range(min = 0.0))]
    pub normal_below: f64,

    /// 平均速度统计时间窗 (s)
    #[validate(range(min = 1))]
    pub speed_window_secs: u64,
}

impl TrafficConfig {
    pub fn recency(&self) -> Duration {
        Duration::from_secs(self.recency_secs)
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            tolerance: 10.0,
            recency_secs: 60,
            smooth_below: 0.1,
            normal_below: 0.3,
            speed_window_secs: 300,
        }
    }
}

/// Per-vehicle worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WorkerConfig {
    /// 每车队列容量
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// 单次存储调用超时 (ms)
    #[validate(range(min = 1))]
    pub store_timeout_ms: u64,
}

impl WorkerConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            store_timeout_ms: 2000,
        }
    }
}

/// History retention configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HistoryConfig {
    #[validate(range(min = 1))]
    pub retention_days: u32,

    #[validate(range(min = 1))]
    pub trajectory_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_days: 7,
            trajectory_limit: 100,
        }
    }
}

/// 路网来源：外部文件和/或内联节点
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadNetworkConfig {
    /// JSON / TOML 节点文件，相对路径按配置文件所在目录解析
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes_path: Option<PathBuf>,

    /// 内联节点
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<RoadNode>,
}
