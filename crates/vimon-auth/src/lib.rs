//! OAuth2 client-credentials authentication for the broker feed.
//!
//! Provides:
//! - Token issuance via form POST to the broker's token endpoint
//! - Cached token reuse with a configurable refresh margin
//! - Forced refresh for connection-rejection recovery

pub mod error;
pub mod store;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use store::{AuthConfig, TokenStore};
pub use token::Token;
