//! Error types for the state monitor.

use thiserror::Error;

/// Main error type for monitor operations.
///
/// None of these are fatal to the observed application: every operation
/// that can return one has already left the engine in a consistent state
/// and logged the condition, so callers are free to ignore the result.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Store already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Store not registered: {0}")]
    StoreNotRegistered(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store factory unavailable: {0}")]
    FactoryUnavailable(String),
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::Serialization(e.to_string())
    }
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
