//! VehicleId - 车辆标识
//!
//! 从 topic 中提取后在整条管道中频繁 clone（分发键、日志字段、存储主键），
//! 内部使用 `Arc<str>`。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::VehicleType;

/// Vehicle identifier with O(1) clone.
///
/// ```
/// use contracts::{VehicleId, VehicleType};
///
/// let id = VehicleId::from("esp32_001");
/// assert_eq!(id.inferred_type(), VehicleType::SensorCar);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VehicleId(Arc<str>);

impl VehicleId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 按 id 前缀约定推断车辆类型
    pub fn inferred_type(&self) -> VehicleType {
        VehicleType::infer_from_id(&self.0)
    }
}

impl Deref for VehicleId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for VehicleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VehicleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for VehicleId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<VehicleId> for String {
    fn from(id: VehicleId) -> Self {
        id.0.to_string()
    }
}

impl PartialEq<str> for VehicleId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for VehicleId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VehicleId({:?})", &*self.0)
    }
}
