//! WebSocket client for the broker's realtime feed gateway.
//!
//! Provides:
//! - Automatic reconnection with exponential backoff
//! - Base VI subscriptions plus dynamic trade-channel subscriptions,
//!   replayed after every reconnect
//! - Idle-timeout liveness detection (the gateway has no app-level ping)
//! - Channel-based raw frame forwarding

pub mod connection;
pub mod error;
pub mod frame;
pub mod handle;
pub mod heartbeat;
pub mod subscription;

pub use connection::{ConnConfig, ConnState, FeedConnection};
pub use error::{ConnError, ConnResult};
pub use frame::{Directive, DirectiveAction};
pub use handle::{FeedHandle, SendError};
pub use heartbeat::LivenessMonitor;
pub use subscription::SubscriptionManager;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
