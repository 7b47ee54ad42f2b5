//! Readers for the on-disk files of a PostgreSQL data directory.
//!
//! Everything here is read-only and synchronous:
//! - `PG_VERSION` - major version, also the marker of a valid data directory
//! - `postgresql.conf` (+ `postgresql.auto.conf`) - port and logging settings
//! - `postmaster.pid` - present while the server is running

mod conf;
mod postmaster;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use conf::{Config, DEFAULT_PORT, parse_config, parse_config_str};
pub use postmaster::{PostmasterInfo, parse_postmaster_pid, parse_postmaster_pid_str};

/// Marker file present in every initialized data directory.
pub const PG_VERSION_FILE: &str = "PG_VERSION";

/// Log directory used by the server when `log_directory` is not set.
const DEFAULT_LOG_DIRECTORY: &str = "log";

/// Error type for data directory reads.
#[derive(Debug)]
pub enum ConfigError {
    /// A file could not be opened or read.
    Io { path: PathBuf, source: io::Error },
    /// `PG_VERSION` exists but holds no version string.
    EmptyVersion { path: PathBuf },
    /// `postmaster.pid` exists but its first line is not a PID.
    InvalidPidFile { path: PathBuf, line: String },
}

impl ConfigError {
    /// Returns `true` if the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            ConfigError::EmptyVersion { path } => write!(f, "{}: empty version", path.display()),
            ConfigError::InvalidPidFile { path, line } => {
                write!(f, "{}: invalid pid line {:?}", path.display(), line)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Reads the server major version from `<data_dir>/PG_VERSION`.
///
/// Returns the trimmed first line, e.g. `"16"` or `"15.4"`.
pub fn read_version(data_dir: &Path) -> Result<String, ConfigError> {
    let path = data_dir.join(PG_VERSION_FILE);
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;

    let version = content.lines().next().unwrap_or("").trim();
    if version.is_empty() {
        return Err(ConfigError::EmptyVersion { path });
    }
    Ok(version.to_string())
}

/// A directory is a data directory iff `PG_VERSION` exists in it and is readable.
pub fn is_valid_data_dir(path: &Path) -> bool {
    let marker = path.join(PG_VERSION_FILE);
    marker.is_file() && fs::File::open(&marker).is_ok()
}

/// Resolves the effective log directory for a data directory.
///
/// - empty `log_directory` → `<data_dir>/log`
/// - absolute `log_directory` → used as-is
/// - relative `log_directory` → joined onto `data_dir`
pub fn resolve_log_dir(data_dir: &Path, log_directory: &str) -> PathBuf {
    let log_directory = log_directory.trim();
    if log_directory.is_empty() {
        return data_dir.join(DEFAULT_LOG_DIRECTORY);
    }

    let path = Path::new(log_directory);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}
