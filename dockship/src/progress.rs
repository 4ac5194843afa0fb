//! The user facing progress log of a pipeline run.

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use crate::clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    /// The wall clock time of the entry in the local time zone, e.g. `14:03:59`.
    pub fn clock(&self) -> String {
        clock::wall_clock(self.timestamp)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{clock}] {severity:>7} {message}",
            clock = self.clock(),
            severity = self.severity.as_str().to_uppercase(),
            message = self.message
        )
    }
}

/// Append-only sequence of [`LogEntry`] values. There is no way to remove or edit an entry once it
/// has been pushed.
#[derive(Debug, Clone, Default)]
pub struct Log(Vec<LogEntry>);

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: Severity, message: String) {
        log::debug!("{severity}: {message}");
        self.0.push(LogEntry {
            timestamp: OffsetDateTime::now_utc(),
            severity,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message.into());
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(Severity::Success, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message.into());
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_their_order() {
        let mut log = Log::new();
        log.info("one");
        log.success("two");
        log.error("three");
        let severities: Vec<_> = log.entries().iter().map(|entry| entry.severity).collect();
        assert_eq!(
            severities,
            [Severity::Info, Severity::Success, Severity::Error]
        );
        let messages: Vec<_> = log.entries().iter().map(|entry| &entry.message[..]).collect();
        assert_eq!(messages, ["one", "two", "three"]);
        assert!(log.entries()[0].timestamp <= log.entries()[2].timestamp);
    }

    #[test]
    fn display_contains_level_and_message() {
        let mut log = Log::new();
        log.error("clone failed");
        let line = log.entries()[0].to_string();
        assert!(line.contains("ERROR"), "{line}");
        assert!(line.ends_with("clone failed"), "{line}");
    }

    #[test]
    fn serializes_as_json() {
        let mut log = Log::new();
        log.success("pushed");
        let value = serde_json::to_value(&log.entries()[0]).unwrap();
        assert_eq!(value["severity"], "success");
        assert_eq!(value["message"], "pushed");
        assert!(value["timestamp"].is_string());
    }
}
