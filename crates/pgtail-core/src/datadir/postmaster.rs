//! `postmaster.pid` reader.
//!
//! The file is written by the postmaster at startup, one field per line:
//!
//! ```text
//! 1  PID
//! 2  data directory
//! 3  start time (seconds since epoch)
//! 4  port
//! 5  unix socket directory
//! 6  listen address
//! 7  shared memory key / cluster identifier
//! 8  status (starting, ready, stopping, ...)
//! ```
//!
//! Only the PID line is mandatory; older servers and crashed startups may
//! leave a file with as few as four lines.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::ConfigError;

const PID_FILE: &str = "postmaster.pid";

/// Parsed contents of `postmaster.pid`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostmasterInfo {
    pub pid: u32,
    pub data_dir: PathBuf,
    /// Seconds since epoch, 0 if absent.
    pub start_time: i64,
    /// 0 if absent or unparseable.
    pub port: u16,
    pub socket_dir: String,
    pub host: String,
    pub cluster: String,
    pub status: String,
}

impl PostmasterInfo {
    /// Server start time, if recorded.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        if self.start_time <= 0 {
            return None;
        }
        DateTime::from_timestamp(self.start_time, 0)
    }
}

/// Reads `<data_dir>/postmaster.pid`.
///
/// A missing file is an `Io` error with `NotFound`; a non-numeric first
/// line is `InvalidPidFile`. Neither produces a partially filled struct.
pub fn parse_postmaster_pid(data_dir: &Path) -> Result<PostmasterInfo, ConfigError> {
    let path = data_dir.join(PID_FILE);
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;

    parse_postmaster_pid_str(&content).ok_or_else(|| ConfigError::InvalidPidFile {
        line: content.lines().next().unwrap_or("").to_string(),
        path,
    })
}

/// Parses `postmaster.pid` content. Returns `None` if the PID line is invalid.
pub fn parse_postmaster_pid_str(content: &str) -> Option<PostmasterInfo> {
    let mut lines = content.lines().map(str::trim);

    let pid = lines.next()?.parse::<u32>().ok()?;
    if pid == 0 {
        return None;
    }

    let mut next = || lines.next().unwrap_or("").to_string();
    let data_dir = PathBuf::from(next());
    let start_time = next().parse().unwrap_or(0);
    let port = next().parse().unwrap_or(0);

    Some(PostmasterInfo {
        pid,
        data_dir,
        start_time,
        port,
        socket_dir: next(),
        host: next(),
        cluster: next(),
        status: next(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_PID_FILE: &str = "\
4242
/var/lib/postgresql/16/main
1705312345
5433
/var/run/postgresql
localhost
  5433001         0
ready
";

    #[test]
    fn test_parse_full_file() {
        let info = parse_postmaster_pid_str(FULL_PID_FILE).unwrap();
        assert_eq!(info.pid, 4242);
        assert_eq!(info.data_dir, PathBuf::from("/var/lib/postgresql/16/main"));
        assert_eq!(info.start_time, 1705312345);
        assert_eq!(info.port, 5433);
        assert_eq!(info.socket_dir, "/var/run/postgresql");
        assert_eq!(info.host, "localhost");
        assert_eq!(info.cluster, "5433001         0");
        assert_eq!(info.status, "ready");
        assert!(info.started_at().is_some());
    }

    #[test]
    fn test_parse_four_lines() {
        let info = parse_postmaster_pid_str("100\n/data\n1700000000\n5432\n").unwrap();
        assert_eq!(info.pid, 100);
        assert_eq!(info.port, 5432);
        assert!(info.socket_dir.is_empty());
        assert!(info.status.is_empty());
    }

    #[test]
    fn test_parse_pid_only() {
        let info = parse_postmaster_pid_str("77\n").unwrap();
        assert_eq!(info.pid, 77);
        assert_eq!(info.port, 0);
        assert!(info.started_at().is_none());
    }

    #[test]
    fn test_non_numeric_first_line() {
        assert!(parse_postmaster_pid_str("garbage\n/data\n").is_none());
        assert!(parse_postmaster_pid_str("").is_none());
    }

    #[test]
    fn test_parse_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_postmaster_pid(dir.path()).unwrap_err();
        assert!(err.is_not_found());

        fs::write(dir.path().join("postmaster.pid"), "not-a-pid\n").unwrap();
        let err = parse_postmaster_pid(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPidFile { ref line, .. } if line == "not-a-pid"));
    }

    #[test]
    fn test_parse_file_ok() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("postmaster.pid"), FULL_PID_FILE).unwrap();
        let info = parse_postmaster_pid(dir.path()).unwrap();
        assert_eq!(info.pid, 4242);
        assert_eq!(info.port, 5433);
    }
}
