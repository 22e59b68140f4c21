//! OAuth2 token acquisition and caching.
//!
//! The broker issues bearer tokens via a client-credentials form POST.
//! `TokenStore` owns the HTTP client and the current token; callers
//! share it behind an `Arc` and ask for the cached token or force a
//! refresh when the connection is rejected.

use crate::error::{AuthError, AuthResult};
use crate::token::Token;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials and endpoint for token issuance.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token issuance endpoint, e.g. `https://openapi.ls-sec.co.kr:8080/oauth2/token`.
    pub token_url: String,
    pub app_key: String,
    pub app_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Shared token store.
///
/// Holds at most one token. Refreshes replace it atomically under the
/// write lock, so a reader never observes a half-updated token.
pub struct TokenStore {
    config: AuthConfig,
    client: Client,
    token: RwLock<Option<Token>>,
}

impl TokenStore {
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        Ok(Self {
            config,
            client,
            token: RwLock::new(None),
        })
    }

    /// The cached token, without touching the network.
    pub async fn current(&self) -> AuthResult<Token> {
        let guard = self.token.read().await;
        guard.clone().ok_or(AuthError::NotInitialized)
    }

    /// Return the cached token, fetching a fresh one only when the
    /// cached token is missing, expired, or inside `margin` of expiry.
    pub async fn ensure_valid(&self, margin: Duration) -> AuthResult<Token> {
        {
            let guard = self.token.read().await;
            if let Some(ref token) = *guard {
                if !token.is_expiring_within(margin) {
                    debug!(expires_at = %token.expires_at, "Using cached access token");
                    return Ok(token.clone());
                }
                warn!(
                    expires_at = %token.expires_at,
                    "Access token expired or expiring soon, refreshing"
                );
            }
        }

        self.refresh().await
    }

    /// Force a new token issuance, replacing any cached token.
    pub async fn refresh(&self) -> AuthResult<Token> {
        if self.config.app_key.is_empty() || self.config.app_secret.is_empty() {
            return Err(AuthError::Unauthorized(
                "app key or secret is empty".to_string(),
            ));
        }

        info!(url = %self.config.token_url, "Requesting access token");

        let form = [
            ("grant_type", "client_credentials"),
            ("appkey", self.config.app_key.as_str()),
            ("appsecretkey", self.config.app_secret.as_str()),
            ("scope", "oob"),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::Unauthorized(body));
        }
        if !status.is_success() {
            return Err(AuthError::NetworkFailure(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        if parsed.access_token.is_empty() {
            return Err(AuthError::MalformedResponse(
                "empty access_token".to_string(),
            ));
        }

        let token = Token::new(parsed.access_token, Utc::now(), parsed.expires_in);
        info!(expires_at = %token.expires_at, "Access token obtained");

        let mut guard = self.token.write().await;
        *guard = Some(token.clone());
        Ok(token)
    }
}
