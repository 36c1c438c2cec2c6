//! Layered error definitions
//!
//! Categorized by source: config / telemetry / store

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Telemetry Errors =====
    /// Topic does not carry a vehicle id in the expected position
    #[error("topic '{topic}' does not match pattern '{pattern}'")]
    TopicMismatch { topic: String, pattern: String },

    /// Payload could not be decoded
    #[error("payload decode error on topic '{topic}': {message}")]
    PayloadDecode { topic: String, message: String },

    /// Embedded vehicle id disagrees with the topic
    #[error("vehicle id mismatch: topic carries '{topic_id}', payload carries '{payload_id}'")]
    VehicleIdMismatch {
        topic_id: String,
        payload_id: String,
    },

    // ===== Store Errors =====
    /// Store read error
    #[error("store '{store}' read error: {message}")]
    StoreRead { store: String, message: String },

    /// Store write error
    #[error("store '{store}' write error: {message}")]
    StoreWrite { store: String, message: String },

    /// Store call exceeded its deadline
    #[error("store operation '{operation}' timed out after {timeout_ms}ms")]
    StoreTimeout { operation: String, timeout_ms: u64 },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create payload decode error
    pub fn payload_decode(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PayloadDecode {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create store read error
    pub fn store_read(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreRead {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create store write error
    pub fn store_write(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreWrite {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create store timeout error
    pub fn store_timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::StoreTimeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Whether this error came from a persistence collaborator
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::StoreRead { .. } | Self::StoreWrite { .. } | Self::StoreTimeout { .. }
        )
    }
}
