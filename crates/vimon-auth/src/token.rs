//! Access token state with expiry tracking.

use chrono::{DateTime, Duration, Utc};

/// One issued access token.
#[derive(Debug, Clone)]
pub struct Token {
    /// Bearer token value, sent in the websocket frame header.
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: String, issued_at: DateTime<Utc>, expires_in_secs: i64) -> Self {
        Self {
            value,
            issued_at,
            expires_at: issued_at + Duration::seconds(expires_in_secs),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }

    /// Whether the token is expired or falls inside the refresh margin.
    pub fn is_expiring_within(&self, margin: std::time::Duration) -> bool {
        let threshold = Utc::now()
            + Duration::from_std(margin).unwrap_or_else(|_| Duration::seconds(i64::MAX / 1_000));
        self.expires_at <= threshold
    }
}
