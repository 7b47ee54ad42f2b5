//! PostgreSQL stderr log line parser.
//!
//! Recognizes the common `log_line_prefix` shapes:
//!
//! ```text
//! 2024-01-15 10:23:45.123 PST [12345] ERROR:  message     (timestamp+tz, pid)
//! 2024-01-15 10:23:45.123 [12345] LOG:  message           (timestamp, pid)
//! 2024-01-15 10:23:45 UTC LOG:  message                   (timestamp+tz, no pid)
//! ```
//!
//! Lines starting with whitespace are continuations of the previous entry
//! (wrapped DETAIL/STATEMENT text). Anything else passes through as an
//! unclassified `LOG` entry; parsing never fails.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use super::level::{LogLevel, parse_log_level};

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Timestamp as written by the server; format depends on `log_line_prefix`.
    pub timestamp: String,
    /// 0 when the line carries no PID.
    pub pid: u32,
    pub level: LogLevel,
    pub message: String,
    /// The input line, verbatim.
    pub raw: String,
    /// Leading-whitespace line belonging to the previous entry. Only
    /// `message` and `raw` are meaningful when set.
    pub is_continuation: bool,
}

const TIMESTAMP: &str = r"\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?";
const TIMEZONE: &str = r"(?:[A-Za-z][A-Za-z0-9_/+-]{0,31}|[+-]\d{2}(?::?\d{2})?)";
const PID: &str = r"\[(\d+)(?:-\d+)?\]:?";
const LEVEL_AND_MESSAGE: &str = r"([A-Za-z][A-Za-z0-9]*):\s*(.*)$";

/// Prefix shapes, tried in order.
static PATTERNS: LazyLock<[LinePattern; 3]> = LazyLock::new(|| {
    [
        LinePattern::new(
            &format!(r"^({TIMESTAMP}\s+{TIMEZONE})\s+{PID}\s+{LEVEL_AND_MESSAGE}"),
            true,
        ),
        LinePattern::new(
            &format!(r"^({TIMESTAMP})\s+{PID}\s+{LEVEL_AND_MESSAGE}"),
            true,
        ),
        LinePattern::new(
            &format!(r"^({TIMESTAMP}\s+{TIMEZONE})\s+{LEVEL_AND_MESSAGE}"),
            false,
        ),
    ]
});

struct LinePattern {
    regex: Regex,
    has_pid: bool,
}

impl LinePattern {
    fn new(pattern: &str, has_pid: bool) -> Self {
        // Built from constant fragments; exercised by every parser test.
        let regex = Regex::new(pattern).expect("static log line pattern");
        Self { regex, has_pid }
    }

    fn captures<'a>(&self, line: &'a str) -> Option<Captures<'a>> {
        self.regex.captures(line)
    }
}

/// Parses one log line. Never fails.
pub fn parse_line(line: &str) -> LogEntry {
    if line.starts_with(' ') || line.starts_with('\t') {
        return LogEntry {
            timestamp: String::new(),
            pid: 0,
            level: LogLevel::Log,
            message: line.trim().to_string(),
            raw: line.to_string(),
            is_continuation: true,
        };
    }

    for pattern in PATTERNS.iter() {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };

        let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());
        let (pid, level_idx) = if pattern.has_pid {
            (group(2).parse().unwrap_or(0), 3)
        } else {
            (0, 2)
        };

        return LogEntry {
            timestamp: group(1).to_string(),
            pid,
            level: parse_log_level(group(level_idx)).unwrap_or(LogLevel::Log),
            message: group(level_idx + 1).trim_end().to_string(),
            raw: line.to_string(),
            is_continuation: false,
        };
    }

    LogEntry {
        timestamp: String::new(),
        pid: 0,
        level: LogLevel::Log,
        message: line.to_string(),
        raw: line.to_string(),
        is_continuation: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_tz_pid() {
        let entry = parse_line("2024-01-15 10:23:45.123 PST [12345] ERROR: boom");
        assert_eq!(entry.timestamp, "2024-01-15 10:23:45.123 PST");
        assert_eq!(entry.pid, 12345);
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.message, "boom");
        assert!(!entry.is_continuation);
        assert_eq!(entry.raw, "2024-01-15 10:23:45.123 PST [12345] ERROR: boom");
    }

    #[test]
    fn test_double_space_after_level() {
        let entry = parse_line(
            "2024-01-15 14:30:00 UTC [99] LOG:  database system is ready to accept connections",
        );
        assert_eq!(entry.level, LogLevel::Log);
        assert_eq!(entry.pid, 99);
        assert_eq!(
            entry.message,
            "database system is ready to accept connections"
        );
    }

    #[test]
    fn test_timestamp_without_tz() {
        let entry = parse_line("2024-01-15 10:23:45.123 [777] WARNING:  low disk");
        assert_eq!(entry.timestamp, "2024-01-15 10:23:45.123");
        assert_eq!(entry.pid, 777);
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.message, "low disk");
    }

    #[test]
    fn test_timestamp_tz_without_pid() {
        let entry = parse_line("2024-01-15 10:23:45 UTC FATAL:  the database system is starting up");
        assert_eq!(entry.timestamp, "2024-01-15 10:23:45 UTC");
        assert_eq!(entry.pid, 0);
        assert_eq!(entry.level, LogLevel::Fatal);
        assert_eq!(entry.message, "the database system is starting up");
    }

    #[test]
    fn test_numeric_offset_and_line_number_pid() {
        let entry = parse_line("2024-01-15 10:23:45.001 +05:30 [42-1] NOTICE:  hello");
        assert_eq!(entry.timestamp, "2024-01-15 10:23:45.001 +05:30");
        assert_eq!(entry.pid, 42);
        assert_eq!(entry.level, LogLevel::Notice);
    }

    #[test]
    fn test_lowercase_level() {
        let entry = parse_line("2024-01-15 10:23:45 UTC [1] debug2:  x");
        assert_eq!(entry.level, LogLevel::Debug2);
    }

    #[test]
    fn test_unknown_level_defaults_to_log() {
        let entry = parse_line("2024-01-15 10:23:45 UTC [5] DETAIL:  Key (id)=(1) already exists.");
        assert_eq!(entry.level, LogLevel::Log);
        assert_eq!(entry.pid, 5);
        assert_eq!(entry.message, "Key (id)=(1) already exists.");
    }

    #[test]
    fn test_continuation_tab() {
        let entry = parse_line("\tSELECT * FROM users  ");
        assert!(entry.is_continuation);
        assert_eq!(entry.message, "SELECT * FROM users");
        assert_eq!(entry.pid, 0);
        assert!(entry.timestamp.is_empty());
    }

    #[test]
    fn test_continuation_space() {
        let entry = parse_line("  WHERE id = 1");
        assert!(entry.is_continuation);
        assert_eq!(entry.message, "WHERE id = 1");
    }

    #[test]
    fn test_unparseable_passthrough() {
        let line = "pg_ctl: could not start server";
        let entry = parse_line(line);
        assert_eq!(entry.level, LogLevel::Log);
        assert_eq!(entry.message, line);
        assert_eq!(entry.raw, line);
        assert!(entry.timestamp.is_empty());
        assert_eq!(entry.pid, 0);
        assert!(!entry.is_continuation);
    }

    #[test]
    fn test_timestamp_without_level_passthrough() {
        let line = "2024-01-15 10:23:45 no level here";
        let entry = parse_line(line);
        assert_eq!(entry.message, line);
        assert!(entry.timestamp.is_empty());
    }

    #[test]
    fn test_huge_pid_does_not_panic() {
        let entry = parse_line("2024-01-15 10:23:45 UTC [99999999999999] ERROR:  x");
        assert_eq!(entry.pid, 0);
        assert_eq!(entry.level, LogLevel::Error);
    }
}
