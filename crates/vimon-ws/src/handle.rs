//! Feed handle for issuing subscription directives.
//!
//! The handle is the only way code outside the connection can talk to
//! the gateway. It is channel-based, so it can be cloned across tasks
//! and stays valid across reconnects.

use crate::connection::ConnState;
use crate::frame::Directive;
use crate::subscription::SubscriptionManager;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Error type for directive submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Connection is not in the subscribed state.
    NotConnected,
    /// Connection task has gone away.
    ChannelClosed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for SendError {}

/// Cloneable handle for queueing subscribe and unsubscribe directives.
///
/// Submission is fire-and-forget: the connection renders the directive
/// with the live session token and records it in the subscription
/// registry once it is actually written to the socket.
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<Directive>,
    state: Arc<RwLock<ConnState>>,
    subscriptions: Arc<SubscriptionManager>,
}

impl FeedHandle {
    pub fn new(
        tx: mpsc::Sender<Directive>,
        state: Arc<RwLock<ConnState>>,
        subscriptions: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            tx,
            state,
            subscriptions,
        }
    }

    /// Queue a directive for the gateway.
    pub async fn send(&self, directive: Directive) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }

        debug!(tr_cd = %directive.tr_cd, tr_key = %directive.tr_key, "Directive queued");
        self.tx
            .send(directive)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    pub async fn subscribe(
        &self,
        tr_cd: impl Into<String>,
        tr_key: impl Into<String>,
    ) -> Result<(), SendError> {
        self.send(Directive::subscribe(tr_cd, tr_key)).await
    }

    pub async fn unsubscribe(
        &self,
        tr_cd: impl Into<String>,
        tr_key: impl Into<String>,
    ) -> Result<(), SendError> {
        self.send(Directive::unsubscribe(tr_cd, tr_key)).await
    }

    /// Whether a subscription is currently active on the gateway.
    pub fn is_subscribed(&self, tr_cd: &str, tr_key: &str) -> bool {
        self.subscriptions.contains(tr_cd, tr_key)
    }

    /// Remove a subscription from the replay registry without sending an
    /// unsubscribe, for when the directive cannot reach the gateway.
    /// Without this, an entry whose unsubscribe was undeliverable would
    /// be replayed on every reconnect.
    pub fn retract(&self, tr_cd: &str, tr_key: &str) -> bool {
        self.subscriptions.remove(tr_cd, tr_key)
    }

    pub fn is_connected(&self) -> bool {
        *self.state.read() == ConnState::Subscribed && !self.tx.is_closed()
    }

    pub fn state(&self) -> ConnState {
        *self.state.read()
    }
}
