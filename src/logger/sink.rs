use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::Level;

use super::{LogRecord, LogSink};

/// Forwards records to the active `tracing` subscriber under the `reqlog::request` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn enabled(&self, level: Level) -> bool {
        match level {
            Level::ERROR => tracing::enabled!(target: "reqlog::request", Level::ERROR),
            Level::WARN => tracing::enabled!(target: "reqlog::request", Level::WARN),
            Level::INFO => tracing::enabled!(target: "reqlog::request", Level::INFO),
            Level::DEBUG => tracing::enabled!(target: "reqlog::request", Level::DEBUG),
            _ => tracing::enabled!(target: "reqlog::request", Level::TRACE),
        }
    }

    fn write(&self, record: LogRecord) {
        let id = record.id().unwrap_or_default().to_string();
        let kind = record
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let status_code = record
            .get("res")
            .and_then(|res| res.get("status_code"))
            .and_then(Value::as_u64);
        let duration_ms = record
            .get("@metric")
            .and_then(|metric| metric.get("duration"))
            .and_then(Value::as_f64);
        let json = record.to_json().to_string();
        let msg = record.msg;

        macro_rules! emit {
            ($level:expr) => {
                tracing::event!(
                    target: "reqlog::request",
                    $level,
                    id = %id,
                    kind = %kind,
                    status_code,
                    duration_ms,
                    record = %json,
                    "{}",
                    msg
                )
            };
        }

        match record.level {
            Level::ERROR => emit!(Level::ERROR),
            Level::WARN => emit!(Level::WARN),
            Level::INFO => emit!(Level::INFO),
            Level::DEBUG => emit!(Level::DEBUG),
            _ => emit!(Level::TRACE),
        }
    }
}

/// Keeps records in memory. Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
    max_level: Level,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::with_max_level(Level::TRACE)
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept records at `max_level` or more severe.
    pub fn with_max_level(max_level: Level) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            max_level,
        }
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records whose `id` field equals `id`.
    pub fn records_for(&self, id: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.id() == Some(id))
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().map(|mut r| r.clear()).ok();
    }
}

impl LogSink for MemorySink {
    fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }

    fn write(&self, record: LogRecord) {
        self.records.lock().map(|mut r| r.push(record)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn record(level: Level, id: &str) -> LogRecord {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.to_string()));
        LogRecord {
            level,
            msg: "m".to_string(),
            fields,
        }
    }

    #[test]
    fn test_memory_sink_level_filter() {
        let sink = MemorySink::with_max_level(Level::INFO);
        assert!(sink.enabled(Level::ERROR));
        assert!(sink.enabled(Level::INFO));
        assert!(!sink.enabled(Level::DEBUG));
        assert!(!sink.enabled(Level::TRACE));
    }

    #[test]
    fn test_memory_sink_clones_share_buffer() {
        let sink = MemorySink::new();
        let other = sink.clone();
        other.write(record(Level::INFO, "a"));
        other.write(record(Level::INFO, "b"));
        sink.write(record(Level::DEBUG, "a"));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.records_for("a").len(), 2);

        sink.clear();
        assert!(other.is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_tracing_sink_records_response_fields() {
        let out = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(Level::DEBUG)
            .with_writer(out.clone())
            .finish();

        let mut end = record(Level::DEBUG, "abc");
        end.fields
            .insert("res".to_string(), serde_json::json!({ "status_code": 204 }));
        end.fields
            .insert("@metric".to_string(), serde_json::json!({ "duration": 1.5 }));

        tracing::subscriber::with_default(subscriber, || {
            assert!(TracingSink.enabled(Level::DEBUG));
            TracingSink.write(end);
        });

        let written = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        let line: Value = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(line["target"], "reqlog::request");
        assert_eq!(line["fields"]["id"], "abc");
        assert_eq!(line["fields"]["status_code"], 204);
        assert_eq!(line["fields"]["duration_ms"], 1.5);
    }

    #[test]
    fn test_tracing_sink_without_subscriber_is_disabled() {
        // No global subscriber is installed in unit tests.
        assert!(!TracingSink.enabled(Level::DEBUG));
        TracingSink.write(record(Level::DEBUG, "ignored"));
    }
}
