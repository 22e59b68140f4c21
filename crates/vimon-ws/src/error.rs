//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("No frame received within the idle timeout")]
    IdleTimeout,

    #[error("Gave up reconnecting after {0} attempts")]
    RetriesExhausted(u32),

    #[error("Session token replaced, reconnecting")]
    Reauthenticate,

    #[error("Authentication error: {0}")]
    Auth(#[from] vimon_auth::AuthError),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConnResult<T> = Result<T, ConnError>;
