//! Error types for vimon-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown market code: {0}")]
    UnknownMarketCode(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
