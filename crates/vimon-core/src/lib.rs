//! Core domain types for the VI monitor.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Market`: the two market namespaces the feed multiplexes (KOSPI/KOSDAQ)
//! - `Price`: precision-safe price type
//! - `RawFrame`, `Envelope`: raw and decoded forms of one inbound frame
//! - `ViEvent`: the terminal artifact handed to the sink

pub mod envelope;
pub mod error;
pub mod event;
pub mod market;
pub mod price;

pub use envelope::{Envelope, EnvelopeKind, RawFrame};
pub use error::{CoreError, Result};
pub use event::{ViEvent, ViEventType};
pub use market::{Market, VI_CHANNEL};
pub use price::Price;
