//! # Map Matcher
//!
//! Stateless geometric matcher: nearest-road search, segment projection, confidence scoring.
//!
//! 调用方策略（不属于匹配器）：置信度低于 `min_confidence` 时使用过滤后的位置。

pub mod geometry;
mod matcher;

pub use contracts::{MatchOutcome, MatchResult, MatcherConfig};
pub use geometry::{project_onto_segment, Projection};
pub use matcher::{confidence, MapMatcher};
