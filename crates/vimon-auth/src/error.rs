//! Authentication error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credentials rejected: {0}")]
    Unauthorized(String),

    #[error("Token request failed: {0}")]
    NetworkFailure(String),

    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    #[error("No token has been acquired yet")]
    NotInitialized,
}

pub type AuthResult<T> = Result<T, AuthError>;
