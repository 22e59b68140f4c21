//! Writer-backed event sink.

use parking_lot::Mutex;
use vimon_core::ViEvent;
use vimon_feed::{EventSink, SinkError};
use vimon_persistence::{EventWriter, PersistenceResult, ViEventRecord};

/// `EventSink` adapter over the JSON Lines writer.
pub struct WriterSink {
    writer: Mutex<EventWriter>,
}

impl WriterSink {
    pub fn new(writer: EventWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Flush and close the underlying writer.
    pub fn close(&self) -> PersistenceResult<()> {
        self.writer.lock().close()
    }
}

impl EventSink for WriterSink {
    fn record(&self, event: &ViEvent) -> Result<(), SinkError> {
        self.writer
            .lock()
            .add_record(ViEventRecord::from(event))
            .map_err(|e| SinkError::new(e.to_string()))
    }
}
