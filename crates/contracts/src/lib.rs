//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Units
//! - 坐标与距离使用管道统一单位（米），由 Normalizer 换算
//! - 上报时间为 epoch 秒 (`i64`)，服务端时间使用 `DateTime<Utc>`

mod blueprint;
mod error;
mod geometry;
mod outcome;
mod road;
mod source;
mod store;
mod telemetry;
mod vehicle;
mod vehicle_id;

pub use blueprint::*;
pub use error::*;
pub use geometry::{BoundingBox, Point};
pub use outcome::*;
pub use road::*;
pub use source::{MessageCallback, MessageSource};
pub use store::{LocalRoadNodeStore, LocalVehicleStore, RoadNodeStore, VehicleStore};
pub use telemetry::*;
pub use vehicle::{HistoryRecord, StateUpdate, TimeRange, VehicleState};
pub use vehicle_id::VehicleId;
