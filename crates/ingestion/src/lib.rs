//! # Ingestion Pipeline
//!
//! 遥测消息入口。
//!
//! Responsibilities:
//! - Register message sources (replay file, mock fleet)
//! - Topic subscriptions, unsubscribed topics are dropped
//! - Bounded inbound queue with drop policy, enqueue never blocks
//! - Normalize messages into `RawReport`
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionPipeline, ReplaySource};
//!
//! let mut pipeline = IngestionPipeline::new(&blueprint.ingest, blueprint.normalizer.clone())?;
//! pipeline.register_source(Box::new(ReplaySource::from_path(path, None)?));
//!
//! let (tx, mut reports) = tokio::sync::mpsc::channel(256);
//! let normalizer = pipeline.spawn_normalizer(tx);
//! pipeline.start_all();
//! while let Some(report) = reports.recv().await {
//!     // dispatch per vehicle
//! }
//! ```

mod config;
mod error;
mod mock;
mod normalizer;
mod pipeline;
mod replay;
mod topic;

// Re-exports
pub use config::{DropPolicy, IngestionMetrics, MetricsSnapshot};
pub use contracts::{InboundMessage, MessageSource, RawReport};
pub use error::{IngestionError, Result};
pub use mock::{MockFleetConfig, MockFleetSource};
pub use normalizer::Normalizer;
pub use pipeline::{IngestionPipeline, Publisher, TestLocation};
pub use replay::{ReplayEntry, ReplaySource};
pub use topic::{filter_matches, SubscriptionSet, TopicPattern};
