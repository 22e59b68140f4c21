//! Decode and handler error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Error from an event sink.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(String);

impl SinkError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("VI frame missing required field: {field}")]
    MissingRequiredField { field: &'static str },

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

pub type HandlerResult<T> = Result<T, HandlerError>;
