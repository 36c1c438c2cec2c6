//! Pipeline orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig, SourceKind};
pub use stats::{PipelineStats, StopReason};
