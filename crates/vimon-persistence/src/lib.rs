//! Event persistence for the VI monitor.
//!
//! Records VI trigger/release events as JSON Lines with daily file
//! rotation, for post-analysis in Python/Polars.

pub mod error;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use writer::{EventWriter, ViEventRecord};
