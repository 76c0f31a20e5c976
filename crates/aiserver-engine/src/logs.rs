//! Recent container log lines for a module, timestamped and classified.

use aiserver_common::types::ModuleType;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Severity guessed from a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Mentions an error.
    Error,
    /// Mentions a warning.
    Warn,
    /// Explicit info marker.
    Info,
    /// Debug output.
    Debug,
    /// Anything else.
    Log,
}

impl LogLevel {
    /// Classifies a message by keyword, most severe first.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("error") || message.contains("ERR") {
            Self::Error
        } else if lower.contains("warn") {
            Self::Warn
        } else if lower.contains("debug") {
            Self::Debug
        } else if lower.contains("info") {
            Self::Info
        } else {
            Self::Log
        }
    }
}

/// One log line attributed to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// RFC 3339 timestamp reported by the runtime, or collection time.
    pub timestamp: String,
    /// Container that produced the line.
    pub service: String,
    /// Owning module.
    pub module: String,
    /// Owning module's role.
    pub module_type: ModuleType,
    /// Guessed severity.
    pub level: LogLevel,
    /// Line without the timestamp prefix.
    pub message: String,
}

/// Splits a `--timestamps` prefix off `line`, if present.
fn split_timestamp(line: &str) -> Option<(&str, &str)> {
    let (head, rest) = line.split_once(char::is_whitespace)?;
    let _ = DateTime::parse_from_rfc3339(head).ok()?;
    Some((head, rest.trim_start()))
}

/// Parses raw runtime log output for one container.
#[must_use]
pub fn parse(raw: &str, service: &str, module: &str, module_type: ModuleType) -> Vec<LogEntry> {
    let now = Utc::now().to_rfc3339();
    raw.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (timestamp, message) = split_timestamp(line).unwrap_or((now.as_str(), line));
            LogEntry {
                timestamp: timestamp.to_string(),
                service: service.to_string(),
                module: module.to_string(),
                module_type,
                level: LogLevel::classify(message),
                message: message.to_string(),
            }
        })
        .collect()
}

/// Orders entries newest first.
pub fn sort_newest_first(entries: &mut [LogEntry]) {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_keyword() {
        assert_eq!(LogLevel::classify("connection ERROR: refused"), LogLevel::Error);
        assert_eq!(LogLevel::classify("[warn] slow query"), LogLevel::Warn);
        assert_eq!(LogLevel::classify("DEBUG pool size=4"), LogLevel::Debug);
        assert_eq!(LogLevel::classify("INFO ready"), LogLevel::Info);
        assert_eq!(LogLevel::classify("Ready to accept connections"), LogLevel::Log);
    }

    #[test]
    fn strips_runtime_timestamps() {
        let raw = "2024-05-01T10:00:00.123456789Z Ready to accept connections\r\n\nplain line\n";
        let entries = parse(raw, "ai-redis", "redis", ModuleType::Basic);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, "2024-05-01T10:00:00.123456789Z");
        assert_eq!(entries[0].message, "Ready to accept connections");
        assert_eq!(entries[1].message, "plain line");
        assert!(DateTime::parse_from_rfc3339(&entries[1].timestamp).is_ok());
    }

    #[test]
    fn newest_entries_come_first() {
        let raw = "2024-05-01T10:00:00Z a\n2024-05-01T10:00:05Z b\n";
        let mut entries = parse(raw, "ai-n8n", "n8n", ModuleType::Feature);
        sort_newest_first(&mut entries);
        assert_eq!(entries[0].message, "b");
    }
}
