//! JSON Lines file writer for VI events.
//!
//! Uses JSON Lines format (.jsonl) for robustness:
//! - Each line is a complete JSON object
//! - Partial file corruption only affects individual lines
//! - Can be read even if write was interrupted

use crate::error::PersistenceResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use tracing::{debug, info, warn};
use vimon_core::ViEvent;

/// Persisted form of one VI event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViEventRecord {
    /// When the writer saw the event.
    pub recorded_at: DateTime<Utc>,
    pub market: String,
    pub symbol: String,
    pub event_type: String,
    pub trigger_price: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl From<&ViEvent> for ViEventRecord {
    fn from(event: &ViEvent) -> Self {
        Self {
            recorded_at: Utc::now(),
            market: event.market.to_string(),
            symbol: event.symbol.clone(),
            event_type: event.event_type.to_string(),
            trigger_price: event.trigger_price.map(|p| p.to_string()),
            occurred_at: event.occurred_at,
        }
    }
}

/// Active writer state for daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// JSON Lines writer for VI event records.
///
/// Uses append mode - safe for interrupted writes.
/// Each line is independent, so partial corruption only affects that line.
pub struct EventWriter {
    base_dir: String,
    buffer: Vec<ViEventRecord>,
    max_buffer_size: usize,
    /// Open until date rotation.
    active_writer: Option<ActiveWriter>,
}

impl EventWriter {
    pub fn new(base_dir: &str, max_buffer_size: usize) -> Self {
        if let Err(e) = std::fs::create_dir_all(base_dir) {
            warn!(?e, "Failed to create directory: {}", base_dir);
        }

        Self {
            base_dir: base_dir.to_string(),
            buffer: Vec::with_capacity(max_buffer_size),
            max_buffer_size,
            active_writer: None,
        }
    }

    /// Add a record to the buffer, flushing when it fills.
    pub fn add_record(&mut self, record: ViEventRecord) -> PersistenceResult<()> {
        self.buffer.push(record);

        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }

        Ok(())
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed event writer"
            );
        }
    }

    fn create_new_writer(&mut self, date: &str) -> PersistenceResult<()> {
        let filename = format!("{}/vi_events_{}.jsonl", self.base_dir, date);

        info!(filename = %filename, "Opening event writer (append mode)");

        // Append mode - never truncates existing data.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;

        self.active_writer = Some(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        });

        Ok(())
    }

    /// Flush buffered records to the daily file.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();

        let needs_rotation = self
            .active_writer
            .as_ref()
            .map(|w| w.date != today)
            .unwrap_or(false);
        if needs_rotation {
            self.close_active_writer();
        }

        if self.active_writer.is_none() {
            self.create_new_writer(&today)?;
        }

        let record_count = self.buffer.len();
        if let Some(active) = self.active_writer.as_mut() {
            for record in &self.buffer {
                let json = serde_json::to_string(record)?;
                writeln!(active.writer, "{}", json)?;
            }
            active.writer.flush()?;
            active.records_written += record_count;
        }

        debug!(date = %today, records = record_count, "Flushed VI events");
        self.buffer.clear();

        Ok(())
    }

    /// Close the writer, flushing any pending data.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush buffer on drop");
        }
        self.close_active_writer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::{BufRead, BufReader};
    use tempfile::TempDir;
    use vimon_core::{Market, Price};

    fn make_test_record(id: usize) -> ViEventRecord {
        ViEventRecord {
            recorded_at: Utc::now(),
            market: "KOSPI".to_string(),
            symbol: format!("{:06}", id),
            event_type: "triggered".to_string(),
            trigger_price: Some("72000".to_string()),
            occurred_at: Utc::now(),
        }
    }

    fn read_lines(dir: &TempDir) -> Vec<String> {
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);

        let file = File::open(entries[0].path()).unwrap();
        BufReader::new(file).lines().filter_map(|l| l.ok()).collect()
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = EventWriter::new(temp_dir.path().to_str().unwrap(), 100);

        for i in 0..5 {
            writer.add_record(make_test_record(i)).unwrap();
        }
        writer.close().unwrap();

        let lines = read_lines(&temp_dir);
        assert_eq!(lines.len(), 5);

        let record: ViEventRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record.market, "KOSPI");
        assert_eq!(record.symbol, "000000");
    }

    #[test]
    fn test_record_from_event() {
        let event = ViEvent::triggered(
            Market::Kosdaq,
            "035720".to_string(),
            Some(Price::new(dec!(41350))),
            Utc::now(),
        );
        let record = ViEventRecord::from(&event);
        assert_eq!(record.market, "KOSDAQ");
        assert_eq!(record.event_type, "triggered");
        assert_eq!(record.trigger_price.as_deref(), Some("41350"));
    }

    #[test]
    fn test_daily_file_naming() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = EventWriter::new(temp_dir.path().to_str().unwrap(), 100);
        writer.add_record(make_test_record(0)).unwrap();
        writer.close().unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        let name = entries[0].file_name().into_string().unwrap();
        let expected = format!("vi_events_{}.jsonl", Utc::now().format("%Y-%m-%d"));
        assert_eq!(name, expected);
    }

    #[test]
    fn test_append_mode() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut writer = EventWriter::new(temp_dir.path().to_str().unwrap(), 100);
            for i in 0..3 {
                writer.add_record(make_test_record(i)).unwrap();
            }
            writer.close().unwrap();
        }

        // Second writer appends, not overwrites.
        {
            let mut writer = EventWriter::new(temp_dir.path().to_str().unwrap(), 100);
            for i in 3..6 {
                writer.add_record(make_test_record(i)).unwrap();
            }
            writer.close().unwrap();
        }

        assert_eq!(read_lines(&temp_dir).len(), 6);
    }

    #[test]
    fn test_multiple_flushes() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = EventWriter::new(temp_dir.path().to_str().unwrap(), 100);

        for batch in 0..3 {
            for i in 0..5 {
                writer.add_record(make_test_record(batch * 5 + i)).unwrap();
            }
            writer.flush().unwrap();
        }
        writer.close().unwrap();

        assert_eq!(read_lines(&temp_dir).len(), 15);
    }

    #[test]
    fn test_buffer_overflow_triggers_flush() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = EventWriter::new(temp_dir.path().to_str().unwrap(), 2);

        writer.add_record(make_test_record(0)).unwrap();
        writer.add_record(make_test_record(1)).unwrap();

        // Flushed by the buffer cap, no explicit flush needed.
        assert_eq!(read_lines(&temp_dir).len(), 2);
    }

    #[test]
    fn test_empty_flush_noop() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = EventWriter::new(temp_dir.path().to_str().unwrap(), 100);

        writer.flush().unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(entries.is_empty());
    }
}
