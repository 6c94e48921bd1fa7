//! Event log sink for the service
//!
//! The control loop only ever writes here; it never reads sink state.

use std::sync::{Arc, Mutex};

/// Log target used by [`LogSink`]
pub const SERVICE_TARGET: &str = "hchk::service";

/// Severity of an event log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// Fire-and-forget, leveled text sink
pub trait EventLog: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

impl<T: EventLog + ?Sized> EventLog for Arc<T> {
    fn log(&self, level: Level, message: &str) {
        (**self).log(level, message);
    }
}

/// Forwards events to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventLog for LogSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Info => log::info!(target: SERVICE_TARGET, "{}", message),
            Level::Error => log::error!(target: SERVICE_TARGET, "{}", message),
        }
    }
}

/// A single recorded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
}

/// In-memory sink that records every event; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Messages whose text starts with `prefix`
    pub fn matching(&self, prefix: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.message.starts_with(prefix))
            .collect()
    }
}

impl EventLog for MemoryLog {
    fn log(&self, level: Level, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                level,
                message: message.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_records_levels() {
        let log = MemoryLog::new();
        assert!(log.entries().is_empty());

        log.info("Service started");
        log.error("Healthcheck err='refused'");

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::Info);
        assert_eq!(entries[0].message, "Service started");
        assert_eq!(entries[1].level, Level::Error);
    }

    #[test]
    fn test_memory_log_clones_share_buffer() {
        let log = MemoryLog::new();
        let handle = log.clone();
        handle.info("Service paused");
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn test_memory_log_matching() {
        let log = MemoryLog::new();
        log.info("Healthcheck status='200 OK'");
        log.info("Service paused");
        log.error("Healthcheck err='timeout'");
        assert_eq!(log.matching("Healthcheck").len(), 2);
        assert_eq!(log.matching("Service").len(), 1);
    }

    #[test]
    fn test_arc_sink_forwards() {
        let log = Arc::new(MemoryLog::new());
        let sink: Arc<dyn EventLog> = log.clone();
        sink.error("Unexpected control request code=99");
        assert_eq!(log.entries()[0].level, Level::Error);
    }

    #[test]
    fn test_log_sink_does_not_panic_without_logger() {
        LogSink.info("no logger installed");
        LogSink.error("still fine");
    }
}
