//! Error type.

/// Errors raised while setting up packet histories.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Record storage could not be allocated.
    #[error("Out of memory allocating packet history")]
    OutOfMemory,

    /// A [`HistoryConfig`](crate::HistoryConfig) failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The header type field holds no known packet type.
    #[error("Invalid packet type {0}")]
    InvalidPacketType(u8),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, HistoryError>;
