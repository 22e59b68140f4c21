//! Volatility Interruption monitor.
//!
//! Orchestrates the full pipeline:
//! - OAuth2 token lifetime management
//! - WebSocket feed connection with reconnect and subscription replay
//! - Frame decode and VI event handling
//! - JSON Lines event persistence

pub mod config;
pub mod error;
pub mod monitor;
pub mod sink;

pub use config::AppConfig;
pub use error::{AppError, AppResult, StateError};
pub use monitor::{Monitor, MonitorState};
pub use sink::WriterSink;
