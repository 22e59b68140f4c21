//! Market identification.
//!
//! The broker feed multiplexes two market namespaces, KOSPI and KOSDAQ.
//! Each market has a wire market code (carried in VI frame bodies) and a
//! real-time trade channel code (the `tr_cd` of per-symbol execution
//! frames).

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// VI occurrence channel code, shared by both markets.
pub const VI_CHANNEL: &str = "VI_";

/// One of the two market namespaces the feed multiplexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    /// All markets, in subscription order.
    pub const ALL: [Market; 2] = [Market::Kospi, Market::Kosdaq];

    /// Map a wire market code to a market.
    ///
    /// Unmapped codes (protocol drift, e.g. `"99"`) are an error the
    /// decoder downgrades to an `Unknown` envelope.
    pub fn from_code(code: &str) -> Result<Self, CoreError> {
        match code {
            "1" => Ok(Self::Kospi),
            "2" => Ok(Self::Kosdaq),
            other => Err(CoreError::UnknownMarketCode(other.to_string())),
        }
    }

    /// Wire market code used in subscribe directives and frame bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Kospi => "1",
            Self::Kosdaq => "2",
        }
    }

    /// Real-time trade (execution) channel code for this market.
    pub fn trade_channel(&self) -> &'static str {
        match self {
            Self::Kospi => "S3_",
            Self::Kosdaq => "K3_",
        }
    }

    /// Map a trade channel code back to its market.
    pub fn from_trade_channel(tr_cd: &str) -> Option<Self> {
        match tr_cd {
            "S3_" => Some(Self::Kospi),
            "K3_" => Some(Self::Kosdaq),
            _ => None,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kospi => write!(f, "KOSPI"),
            Self::Kosdaq => write!(f, "KOSDAQ"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_code_roundtrip() {
        for market in Market::ALL {
            assert_eq!(Market::from_code(market.code()).unwrap(), market);
        }
    }

    #[test]
    fn test_unmapped_code_is_error() {
        let err = Market::from_code("99").unwrap_err();
        assert!(matches!(err, CoreError::UnknownMarketCode(code) if code == "99"));
    }

    #[test]
    fn test_trade_channel_mapping() {
        assert_eq!(Market::Kospi.trade_channel(), "S3_");
        assert_eq!(Market::Kosdaq.trade_channel(), "K3_");
        assert_eq!(Market::from_trade_channel("S3_"), Some(Market::Kospi));
        assert_eq!(Market::from_trade_channel("K3_"), Some(Market::Kosdaq));
        assert_eq!(Market::from_trade_channel("VI_"), None);
    }
}
