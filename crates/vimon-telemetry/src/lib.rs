//! Telemetry for the VI monitor.
//!
//! Tracing initialization: env-filtered console output (JSON in
//! production, pretty in development) plus an optional daily-rotated
//! log file.

pub mod error;
pub mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
