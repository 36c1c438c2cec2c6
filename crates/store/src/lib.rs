//! # Store
//!
//! 车辆状态/历史与路网节点的内存参考实现，实现 `contracts` 中的两个存储 trait。
//!
//! - 状态：每车一行，upsert
//! - 历史：只追加，按追加顺序
//! - 节点：只读，交通等级除外

mod memory;
mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::StoreSnapshot;
