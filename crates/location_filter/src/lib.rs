//! # Location Filter
//!
//! 每车有状态的位置去噪器。
//!
//! 阶段（按顺序，任一阶段都可以提前返回"无位置"）：
//! 1. 有效性门限
//! 2. 固定增益平滑
//! 3. 速度合理性门限
//! 4. 滑动平均
//! 5. 提交原始点到窗口
//!
//! ## 使用示例
//!
//! ```ignore
//! use location_filter::LocationFilter;
//!
//! let mut filter = LocationFilter::new(&blueprint.filter);
//! if let Some(position) = filter.process(&report).position() {
//!     // map-match `position`
//! }
//! ```

mod filter;
pub mod stages;

pub use contracts::{FilterConfig, FilterOutcome, RejectReason};
pub use filter::{FilterStats, LocationFilter, WindowEntry};
