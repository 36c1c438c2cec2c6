//! # Dispatcher
//!
//! 按车辆分发上报。
//!
//! 负责：
//! - 消费 Normalizer 输出的 `RawReport`
//! - 每辆车一个 worker，独占过滤窗口，同车串行、异车并发
//! - 串联过滤、地图匹配、状态写入和路段拥堵重算

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod processor;

pub use dispatcher::{DispatchSummary, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::VehicleHandle;
pub use metrics::{WorkerMetrics, WorkerSnapshot};
pub use processor::{
    implied_speed, PositionSource, ProcessorConfig, ReportOutcome, ReportProcessor, Stage,
};
