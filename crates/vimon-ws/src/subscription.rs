//! Active subscription tracking.
//!
//! The connection keeps one registry of everything it has asked the
//! gateway for: the base VI subscriptions (one per market) plus any
//! dynamic trade-channel subscriptions added while watching a symbol
//! after a trigger. After a reconnect the whole registry is replayed so
//! dynamic watches survive the drop.

use crate::frame::Directive;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use vimon_core::VI_CHANNEL;

/// Registry of active subscriptions.
///
/// Keyed by `tr_cd:tr_key` so a duplicate subscribe is a no-op.
/// `BTreeMap` keeps replay order deterministic.
pub struct SubscriptionManager {
    active: RwLock<BTreeMap<String, Directive>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record a subscription. Returns false if it was already active.
    pub fn add(&self, directive: &Directive) -> bool {
        self.active
            .write()
            .insert(directive.channel_key(), directive.clone())
            .is_none()
    }

    /// Drop a subscription. Returns false if it was not active.
    pub fn remove(&self, tr_cd: &str, tr_key: &str) -> bool {
        self.active
            .write()
            .remove(&format!("{tr_cd}:{tr_key}"))
            .is_some()
    }

    pub fn contains(&self, tr_cd: &str, tr_key: &str) -> bool {
        self.active.read().contains_key(&format!("{tr_cd}:{tr_key}"))
    }

    /// All active subscriptions, VI channels first.
    ///
    /// Replayed on reconnect; VI comes first so trigger coverage is
    /// restored before any per-symbol trade watch.
    pub fn replay_order(&self) -> Vec<Directive> {
        let active = self.active.read();
        let (vi, rest): (Vec<_>, Vec<_>) = active
            .values()
            .cloned()
            .partition(|d| d.tr_cd == VI_CHANNEL);
        vi.into_iter().chain(rest).collect()
    }

    pub fn len(&self) -> usize {
        self.active.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.read().is_empty()
    }

    /// Forget everything (used when the registry is rebuilt from config).
    pub fn clear(&self) {
        self.active.write().clear();
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
