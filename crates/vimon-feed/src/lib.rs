//! Frame decoding and VI event handling.
//!
//! Sits between the raw websocket feed and the persistence sink:
//! `MessageProcessor` classifies raw frames into envelopes, and
//! `ViEventHandler` turns VI envelopes into events, forwards them to the
//! sink and manages post-trigger trade watches.

pub mod error;
pub mod handler;
pub mod processor;

pub use error::{DecodeError, DecodeResult, HandlerError, HandlerResult, SinkError};
pub use handler::{EventSink, ViEventHandler};
pub use processor::{DecodeStats, MessageProcessor};
