//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Worker queue full - report dropped
    #[error("queue full for vehicle '{vehicle_id}', report at {timestamp} dropped")]
    QueueFull { vehicle_id: String, timestamp: i64 },

    /// Worker task ended unexpectedly
    #[error("worker for vehicle '{vehicle_id}' is closed")]
    WorkerClosed { vehicle_id: String },

    /// Store or config error (from contract)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    pub fn queue_full(vehicle_id: impl Into<String>, timestamp: i64) -> Self {
        Self::QueueFull {
            vehicle_id: vehicle_id.into(),
            timestamp,
        }
    }
}
