//! Application error types.

use thiserror::Error;

/// Monitor lifecycle errors.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Monitor is already running")]
    AlreadyRunning,

    #[error("Monitor has already run and stopped")]
    AlreadyStopped,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] vimon_auth::AuthError),

    #[error("Connection error: {0}")]
    Connection(#[from] vimon_ws::ConnError),

    #[error("Handler error: {0}")]
    Handler(#[from] vimon_feed::HandlerError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] vimon_persistence::PersistenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] vimon_telemetry::TelemetryError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;
