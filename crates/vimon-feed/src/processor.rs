//! Frame decoding.
//!
//! Turns raw gateway frames into classified envelopes. Inbound frames are
//! JSON of the form `{"header": {...}, "body": {...}}`; the header names
//! the channel (`tr_cd`) and acks carry a `rsp_msg` instead of a body.
//! Decoding never panics on arbitrary byte input, and protocol drift
//! (unrecognized channels or market codes) degrades to `Unknown` rather
//! than an error so one odd frame cannot stall the feed.

use crate::error::{DecodeError, DecodeResult};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use vimon_core::{Envelope, EnvelopeKind, Market, RawFrame, VI_CHANNEL};

/// Market code field in VI frame bodies.
const MARKET_FIELD: &str = "jangubun";

/// Decode counters.
#[derive(Debug, Default)]
pub struct DecodeStats {
    decoded: AtomicU64,
    unknown: AtomicU64,
    malformed: AtomicU64,
}

impl DecodeStats {
    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    pub fn unknown(&self) -> u64 {
        self.unknown.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

/// Stateless frame decoder with counters.
pub struct MessageProcessor {
    stats: DecodeStats,
}

impl MessageProcessor {
    pub fn new() -> Self {
        Self {
            stats: DecodeStats::default(),
        }
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Decode one raw frame into an envelope.
    pub fn decode(&self, frame: &RawFrame) -> DecodeResult<Envelope> {
        match self.decode_inner(frame) {
            Ok(envelope) => {
                if envelope.kind == EnvelopeKind::Unknown {
                    self.stats.unknown.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.stats.decoded.fetch_add(1, Ordering::Relaxed);
                }
                Ok(envelope)
            }
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn decode_inner(&self, frame: &RawFrame) -> DecodeResult<Envelope> {
        let text = std::str::from_utf8(frame.as_bytes())
            .map_err(|_| DecodeError::MalformedFrame("not valid UTF-8".to_string()))?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| DecodeError::MalformedFrame(format!("not JSON: {e}")))?;

        let root = value
            .as_object()
            .ok_or_else(|| DecodeError::MalformedFrame("root is not an object".to_string()))?;
        let header = root
            .get("header")
            .and_then(Value::as_object)
            .ok_or_else(|| DecodeError::MalformedFrame("missing header".to_string()))?;

        let tr_cd = header.get("tr_cd").and_then(Value::as_str).unwrap_or("");
        let body = root.get("body").and_then(Value::as_object);

        // Subscription acks carry a response message and no event body.
        if header.contains_key("rsp_msg") && body.is_none() {
            debug!(tr_cd, "Ack frame");
            return Ok(Envelope::empty(EnvelopeKind::Heartbeat));
        }

        if tr_cd == VI_CHANNEL {
            let body = body.ok_or_else(|| {
                DecodeError::MalformedFrame("VI frame without body".to_string())
            })?;
            return Ok(decode_vi(body));
        }

        if let Some(market) = Market::from_trade_channel(tr_cd) {
            let Some(body) = body else {
                return Ok(Envelope::empty(EnvelopeKind::Heartbeat));
            };
            return Ok(Envelope::new(
                EnvelopeKind::Trade,
                Some(market),
                body.clone(),
            ));
        }

        // Keep-alives have neither a recognizable channel nor a body.
        if body.is_none() {
            return Ok(Envelope::empty(EnvelopeKind::Heartbeat));
        }

        debug!(tr_cd, "Unrecognized channel");
        Ok(Envelope::empty(EnvelopeKind::Unknown))
    }
}

impl Default for MessageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_vi(body: &Map<String, Value>) -> Envelope {
    let market = body
        .get(MARKET_FIELD)
        .and_then(Value::as_str)
        .and_then(|code| Market::from_code(code.trim()).ok());

    let Some(market) = market else {
        debug!("VI frame with unmapped market code");
        return Envelope::new(EnvelopeKind::Unknown, None, body.clone());
    };

    let kind = match body.get("vi_gubun").and_then(Value::as_str) {
        Some("0") => EnvelopeKind::ViRelease,
        Some("1") | Some("2") | Some("3") => EnvelopeKind::ViTrigger,
        _ => EnvelopeKind::Unknown,
    };

    Envelope::new(kind, Some(market), body.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(processor: &MessageProcessor, json: &str) -> DecodeResult<Envelope> {
        processor.decode(&RawFrame::from(json))
    }

    #[test]
    fn test_garbage_is_malformed() {
        let processor = MessageProcessor::new();
        assert!(decode(&processor, "not json").is_err());
        assert!(processor.decode(&RawFrame::new(vec![0xff, 0xfe])).is_err());
        assert!(decode(&processor, r#"{"body":{}}"#).is_err());
        assert_eq!(processor.stats().malformed(), 3);
    }

    #[test]
    fn test_ack_is_heartbeat() {
        let processor = MessageProcessor::new();
        let envelope = decode(
            &processor,
            r#"{"header":{"tr_cd":"VI_","tr_key":"1","rsp_msg":"SUCCESS"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Heartbeat);
        assert!(envelope.market.is_none());
    }

    #[test]
    fn test_vi_trigger() {
        let processor = MessageProcessor::new();
        let envelope = decode(
            &processor,
            r#"{"header":{"tr_cd":"VI_"},"body":{"jangubun":"1","vi_gubun":"1","ref_shcode":"005930","vi_trgprice":"72000","time":"101500"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::ViTrigger);
        assert_eq!(envelope.market, Some(Market::Kospi));
        assert_eq!(envelope.field_str("ref_shcode"), Some("005930"));
    }

    #[test]
    fn test_vi_release() {
        let processor = MessageProcessor::new();
        let envelope = decode(
            &processor,
            r#"{"header":{"tr_cd":"VI_"},"body":{"jangubun":"2","vi_gubun":"0","ref_shcode":"035720"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::ViRelease);
        assert_eq!(envelope.market, Some(Market::Kosdaq));
    }

    #[test]
    fn test_unmapped_market_code_degrades_to_unknown() {
        let processor = MessageProcessor::new();
        let envelope = decode(
            &processor,
            r#"{"header":{"tr_cd":"VI_"},"body":{"jangubun":"99","vi_gubun":"1","ref_shcode":"000001"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Unknown);
        assert!(envelope.market.is_none());
        assert_eq!(processor.stats().unknown(), 1);
        assert_eq!(processor.stats().decoded(), 0);
    }

    #[test]
    fn test_unknown_vi_gubun() {
        let processor = MessageProcessor::new();
        let envelope = decode(
            &processor,
            r#"{"header":{"tr_cd":"VI_"},"body":{"jangubun":"1","vi_gubun":"7"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Unknown);
    }

    #[test]
    fn test_vi_without_body_is_malformed() {
        let processor = MessageProcessor::new();
        assert!(decode(&processor, r#"{"header":{"tr_cd":"VI_"}}"#).is_err());
    }

    #[test]
    fn test_trade_frame() {
        let processor = MessageProcessor::new();
        let envelope = decode(
            &processor,
            r#"{"header":{"tr_cd":"K3_"},"body":{"shcode":"035720","price":"41350","cvolume":"120"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Trade);
        assert_eq!(envelope.market, Some(Market::Kosdaq));
        assert_eq!(envelope.field_str("price"), Some("41350"));
    }

    #[test]
    fn test_unrecognized_channel_is_unknown() {
        let processor = MessageProcessor::new();
        let envelope = decode(
            &processor,
            r#"{"header":{"tr_cd":"H1_"},"body":{"shcode":"005930"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Unknown);
    }
}
