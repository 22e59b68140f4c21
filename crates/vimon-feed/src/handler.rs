//! VI event handling.
//!
//! Turns classified envelopes into `ViEvent`s, forwards them to the sink
//! and manages the short trade-channel follow window opened after each
//! trigger: the symbol's execution feed is subscribed, logged while the
//! watch lasts and automatically unsubscribed afterwards.

use crate::error::{HandlerError, HandlerResult, SinkError};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Asia::Seoul;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vimon_core::{Envelope, EnvelopeKind, Market, Price, ViEvent};
use vimon_ws::FeedHandle;

/// Destination for produced VI events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &ViEvent) -> Result<(), SinkError>;
}

/// Envelope-to-event handler with trade follow-subscriptions.
pub struct ViEventHandler<S: EventSink> {
    sink: Arc<S>,
    feed: FeedHandle,
    /// How long a triggered symbol's trade channel stays subscribed.
    watch_window: Duration,
    /// Active trade watches, keyed `tr_cd:symbol`.
    watched: Arc<RwLock<HashSet<String>>>,
}

impl<S: EventSink + 'static> ViEventHandler<S> {
    pub fn new(sink: Arc<S>, feed: FeedHandle, watch_window: Duration) -> Self {
        Self {
            sink,
            feed,
            watch_window,
            watched: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn watched_count(&self) -> usize {
        self.watched.read().len()
    }

    /// Handle one envelope.
    ///
    /// Returns the produced event for VI envelopes, `None` otherwise.
    /// The event has been handed to the sink before this returns.
    pub async fn handle(&self, envelope: Envelope) -> HandlerResult<Option<ViEvent>> {
        match envelope.kind {
            EnvelopeKind::Heartbeat | EnvelopeKind::Unknown => Ok(None),
            EnvelopeKind::Trade => {
                self.log_trade(&envelope);
                Ok(None)
            }
            EnvelopeKind::ViTrigger | EnvelopeKind::ViRelease => {
                let event = self.build_event(&envelope)?;
                self.sink.record(&event)?;
                info!(
                    market = %event.market,
                    symbol = %event.symbol,
                    event_type = %event.event_type,
                    trigger_price = ?event.trigger_price,
                    "VI event recorded"
                );
                if envelope.kind == EnvelopeKind::ViTrigger {
                    self.start_watch(event.market, &event.symbol).await;
                }
                Ok(Some(event))
            }
        }
    }

    fn build_event(&self, envelope: &Envelope) -> HandlerResult<ViEvent> {
        let market = envelope
            .market
            .ok_or(HandlerError::MissingRequiredField { field: "market" })?;
        let symbol = envelope
            .field_str("ref_shcode")
            .ok_or(HandlerError::MissingRequiredField {
                field: "ref_shcode",
            })?
            .to_string();

        let occurred_at = envelope
            .field_str("time")
            .and_then(parse_exchange_time)
            .unwrap_or_else(Utc::now);

        if envelope.kind == EnvelopeKind::ViRelease {
            return Ok(ViEvent::released(market, symbol, occurred_at));
        }

        let trigger_price = match envelope.field_str("vi_trgprice") {
            Some(raw) => match Price::parse(raw) {
                Ok(price) => Some(price),
                Err(_) => {
                    warn!(%symbol, raw, "Unparseable VI trigger price");
                    None
                }
            },
            None => None,
        };

        Ok(ViEvent::triggered(market, symbol, trigger_price, occurred_at))
    }

    /// Open the follow window for a freshly triggered symbol.
    ///
    /// A symbol already being watched is not resubscribed; retriggering
    /// inside the window does not extend it.
    async fn start_watch(&self, market: Market, symbol: &str) {
        let tr_cd = market.trade_channel();
        let key = format!("{tr_cd}:{symbol}");

        if !self.watched.write().insert(key.clone()) {
            debug!(%symbol, "Already watching, not resubscribing");
            return;
        }

        if let Err(e) = self.feed.subscribe(tr_cd, symbol).await {
            warn!(%symbol, error = %e, "Trade subscribe failed");
            self.watched.write().remove(&key);
            return;
        }
        info!(%market, %symbol, window_secs = self.watch_window.as_secs(), "Trade watch started");

        let feed = self.feed.clone();
        let watched = self.watched.clone();
        let window = self.watch_window;
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            watched.write().remove(&key);
            match feed.unsubscribe(tr_cd, symbol.as_str()).await {
                Ok(()) => info!(%symbol, "Trade watch ended"),
                Err(e) => {
                    // The gateway never saw the unsubscribe; retract the
                    // registry entry or the reconnect replay would keep
                    // resubscribing an unwatched symbol.
                    feed.retract(tr_cd, &symbol);
                    debug!(%symbol, error = %e, "Trade unsubscribe undeliverable, retracted");
                }
            }
        });
    }

    fn log_trade(&self, envelope: &Envelope) {
        let Some(market) = envelope.market else {
            return;
        };
        let Some(symbol) = envelope.field_str("shcode") else {
            return;
        };

        let key = format!("{}:{}", market.trade_channel(), symbol);
        if !self.watched.read().contains(&key) {
            // Late frames can arrive after the watch window closed.
            return;
        }

        info!(
            %market,
            symbol,
            price = envelope.field_str("price").unwrap_or("-"),
            volume = envelope.field_str("cvolume").unwrap_or("-"),
            "Trade"
        );
    }
}

/// Parse an exchange-local HHMMSS timestamp into UTC, on today's date.
fn parse_exchange_time(raw: &str) -> Option<DateTime<Utc>> {
    let time = NaiveTime::parse_from_str(raw, "%H%M%S").ok()?;
    let today = Utc::now().with_timezone(&Seoul).date_naive();
    let local = Seoul.from_local_datetime(&today.and_time(time)).single()?;
    Some(local.with_timezone(&Utc))
}
