use crate::types::AddressId;
use thiserror::Error;

/// Error types for Locus
#[derive(Debug, Error)]
pub enum LocusError {
    /// No address is stored under the given id
    #[error("address {0} not found")]
    NotFound(AddressId),
    /// Malformed request payload
    #[error("validation error: {0}")]
    Validation(String),
    /// Latitude or longitude outside the valid range
    #[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    /// Haversine input outside the domain of its subsequent operation
    #[error("numeric domain error: {0}")]
    NumericDomain(String),
    /// Database is closed
    #[error("database is closed")]
    DatabaseClosed,
    /// Lock acquisition failed
    #[error("failed to acquire lock: {0}")]
    Lock(String),
    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Invalid data format
    #[error("invalid data format")]
    InvalidFormat,
    /// Every id up to `u64::MAX` has been handed out
    #[error("address id space exhausted")]
    IdsExhausted,
    /// Compaction is already in progress
    #[error("compaction is already in progress")]
    RewriteInProgress,
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
    /// I/O error from persistence layer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for LocusError {
    fn from(err: bincode::Error) -> Self {
        LocusError::Serialization(err.to_string())
    }
}

/// Result type alias for Locus operations
pub type Result<T> = std::result::Result<T, LocusError>;
