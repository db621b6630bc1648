//! Error types for DIMSE operations

use thiserror::Error;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur during DIMSE operations
#[derive(Error, Debug)]
pub enum DimseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("Dataset read error: {0}")]
    DatasetRead(String),

    #[error("Query matching error: {0}")]
    Matching(String),

    #[error("Result channel closed: {0}")]
    ChannelClosed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl DimseError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new dataset read error
    pub fn dataset_read(msg: impl Into<String>) -> Self {
        Self::DatasetRead(msg.into())
    }

    /// Create a new query matching error
    pub fn matching(msg: impl Into<String>) -> Self {
        Self::Matching(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a new not-supported error
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// True when the error is confined to a single result item, as opposed to
    /// ending the whole response stream
    pub fn is_item_level(&self) -> bool {
        matches!(self, DimseError::DatasetRead(_))
    }
}
