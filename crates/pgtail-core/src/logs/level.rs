//! PostgreSQL message severity levels.

use std::str::FromStr;

use serde::Serialize;

/// Message severity in PostgreSQL's own order.
///
/// `LOG` ranks above `ERROR` here, exactly as in the server's
/// `log_min_messages` ordering. Do not re-sort by conventional severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug5,
    Debug4,
    Debug3,
    Debug2,
    Debug1,
    Info,
    Notice,
    Warning,
    Error,
    Log,
    Fatal,
    Panic,
}

impl LogLevel {
    /// Every level, lowest first.
    pub const ALL: [LogLevel; 12] = [
        LogLevel::Debug5,
        LogLevel::Debug4,
        LogLevel::Debug3,
        LogLevel::Debug2,
        LogLevel::Debug1,
        LogLevel::Info,
        LogLevel::Notice,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Log,
        LogLevel::Fatal,
        LogLevel::Panic,
    ];

    /// Server spelling of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug5 => "DEBUG5",
            LogLevel::Debug4 => "DEBUG4",
            LogLevel::Debug3 => "DEBUG3",
            LogLevel::Debug2 => "DEBUG2",
            LogLevel::Debug1 => "DEBUG1",
            LogLevel::Info => "INFO",
            LogLevel::Notice => "NOTICE",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Log => "LOG",
            LogLevel::Fatal => "FATAL",
            LogLevel::Panic => "PANIC",
        }
    }

    pub(crate) fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Case-insensitive level lookup. Returns `None` for unknown tokens.
pub fn parse_log_level(token: &str) -> Option<LogLevel> {
    LogLevel::ALL
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(token.trim()))
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized level name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl std::fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown log level: {}", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_log_level(s).ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_ordering() {
        assert!(LogLevel::Debug5 < LogLevel::Debug1);
        assert!(LogLevel::Debug1 < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Log);
        assert!(LogLevel::Log < LogLevel::Fatal);
        assert!(LogLevel::Fatal < LogLevel::Panic);

        let mut sorted = LogLevel::ALL;
        sorted.sort();
        assert_eq!(sorted, LogLevel::ALL);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(parse_log_level("error"), Some(LogLevel::Error));
        assert_eq!(parse_log_level("Warning"), Some(LogLevel::Warning));
        assert_eq!(parse_log_level("DEBUG3"), Some(LogLevel::Debug3));
        assert_eq!(parse_log_level("STATEMENT"), None);
        assert_eq!(parse_log_level(""), None);
    }

    #[test]
    fn test_from_str_and_display() {
        for level in LogLevel::ALL {
            assert_eq!(level.to_string().parse::<LogLevel>(), Ok(level));
        }
        assert!("bogus".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_bits_distinct() {
        let mut mask = 0u16;
        for level in LogLevel::ALL {
            assert_eq!(mask & level.bit(), 0);
            mask |= level.bit();
        }
    }
}
