//! VI event, the terminal artifact handed to the sink.

use crate::market::Market;
use crate::price::Price;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a VI was triggered or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViEventType {
    Triggered,
    Released,
}

impl fmt::Display for ViEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triggered => write!(f, "triggered"),
            Self::Released => write!(f, "released"),
        }
    }
}

/// One VI trigger or release, derived from a validated envelope.
///
/// Not retained by the core after handoff to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViEvent {
    pub market: Market,
    pub symbol: String,
    pub event_type: ViEventType,
    /// VI base price; present only for triggers.
    pub trigger_price: Option<Price>,
    pub occurred_at: DateTime<Utc>,
}

impl ViEvent {
    pub fn triggered(
        market: Market,
        symbol: String,
        trigger_price: Option<Price>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            market,
            symbol,
            event_type: ViEventType::Triggered,
            trigger_price,
            occurred_at,
        }
    }

    /// Releases never carry a trigger price.
    pub fn released(market: Market, symbol: String, occurred_at: DateTime<Utc>) -> Self {
        Self {
            market,
            symbol,
            event_type: ViEventType::Released,
            trigger_price: None,
            occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_released_has_no_price() {
        let event = ViEvent::released(Market::Kosdaq, "035720".to_string(), Utc::now());
        assert_eq!(event.event_type, ViEventType::Released);
        assert!(event.trigger_price.is_none());
    }

    #[test]
    fn test_serde_roundtrip() {
        let event = ViEvent::triggered(
            Market::Kospi,
            "005930".to_string(),
            Some(Price::new(dec!(72000))),
            Utc::now(),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: ViEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
