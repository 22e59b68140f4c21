//! Raw and decoded forms of one inbound frame.

use crate::market::Market;
use serde_json::{Map, Value};

/// Raw bytes received from the socket.
///
/// Opaque to everything but the message processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame(pub Vec<u8>);

impl RawFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<String> for RawFrame {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for RawFrame {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Classified message kind of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Keep-alive or subscription ack; carries no event payload.
    Heartbeat,
    /// VI trigger on some symbol.
    ViTrigger,
    /// VI release on some symbol.
    ViRelease,
    /// Per-symbol execution tick on a followed trade channel.
    Trade,
    /// Unrecognized channel or market code; skipped downstream.
    Unknown,
}

/// The normalized, decoded form of one inbound frame.
///
/// Immutable once constructed; moved to the next pipeline stage and
/// never cached. `market` is `None` only for `Heartbeat` and `Unknown`
/// envelopes whose frame carried no mappable market code.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub market: Option<Market>,
    pub payload: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, market: Option<Market>, payload: Map<String, Value>) -> Self {
        Self {
            kind,
            market,
            payload,
        }
    }

    /// An envelope without payload (heartbeats, unknown frames).
    pub fn empty(kind: EnvelopeKind) -> Self {
        Self {
            kind,
            market: None,
            payload: Map::new(),
        }
    }

    /// Look up a string payload field, treating empty strings as absent.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.payload
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_vi(&self) -> bool {
        matches!(self.kind, EnvelopeKind::ViTrigger | EnvelopeKind::ViRelease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_str_skips_empty() {
        let mut payload = Map::new();
        payload.insert("ref_shcode".to_string(), json!("005930"));
        payload.insert("time".to_string(), json!(""));
        payload.insert("count".to_string(), json!(3));

        let env = Envelope::new(EnvelopeKind::ViTrigger, Some(Market::Kospi), payload);
        assert_eq!(env.field_str("ref_shcode"), Some("005930"));
        assert_eq!(env.field_str("time"), None);
        assert_eq!(env.field_str("count"), None);
        assert_eq!(env.field_str("missing"), None);
    }

    #[test]
    fn test_is_vi() {
        assert!(Envelope::empty(EnvelopeKind::ViTrigger).is_vi());
        assert!(Envelope::empty(EnvelopeKind::ViRelease).is_vi());
        assert!(!Envelope::empty(EnvelopeKind::Heartbeat).is_vi());
        assert!(!Envelope::empty(EnvelopeKind::Unknown).is_vi());
    }
}
