//! JSON export of the whole store.

use std::path::Path;

use chrono::{DateTime, Utc};
use contracts::{ContractError, HistoryRecord, RoadNode, VehicleState};
use serde::{Deserialize, Serialize};

/// Point-in-time copy of states, history and nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub taken_at: DateTime<Utc>,
    pub states: Vec<VehicleState>,
    pub history: Vec<HistoryRecord>,
    pub nodes: Vec<RoadNode>,
}

impl StoreSnapshot {
    pub fn to_json(&self) -> Result<String, ContractError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ContractError::store_read("snapshot", format!("JSON serialize error: {e}")))
    }

    /// Write pretty JSON to `path`
    pub fn write_to(&self, path: &Path) -> Result<(), ContractError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
