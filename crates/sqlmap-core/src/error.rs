//! Error types for sqlmap

use thiserror::Error;

/// Core error type for sqlmap operations
#[derive(Error, Debug)]
pub enum SqlmapError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown DataSource property: {0}")]
    UnknownProperty(String),

    /// A call was made through a pooled connection after the pool took it back
    #[error("Error accessing pooled connection. Connection is invalid.")]
    ConnectionInvalidated,

    /// Too many bad connections were encountered during a single checkout
    #[error("Could not get a good connection to the database")]
    PoolExhausted,

    /// The checkout loop ended without producing a connection
    #[error("Unknown severe error condition. The connection pool returned a null connection.")]
    PoolUnknownError,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

impl SqlmapError {
    /// Whether this error is one of the pool's fatal checkout failures
    pub fn is_pool_failure(&self) -> bool {
        matches!(self, SqlmapError::PoolExhausted | SqlmapError::PoolUnknownError)
    }
}

/// Result type alias for sqlmap operations
pub type Result<T> = std::result::Result<T, SqlmapError>;
