//! PostgreSQL instance detection.
//!
//! Several independent sources propose candidate data directories. They are
//! scanned strictly in priority order on the calling thread:
//!
//! 1. running server processes (`postgres -D ...`)
//! 2. pgrx development clusters (`~/.pgrx/data-*`)
//! 3. the `PGDATA` environment variable
//! 4. package-manager / installer default locations
//!
//! Candidates feed one accumulator keyed by normalized data directory; the
//! first occurrence wins, so priority order is also the tie-break. A source
//! that fails entirely is reported in `skipped_sources` and the remaining
//! sources still run.

mod instance;
pub mod paths;
pub mod process;
mod sources;

use std::collections::HashSet;
use std::env;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, trace, warn};

use crate::datadir::{
    ConfigError, is_valid_data_dir, parse_config, parse_postmaster_pid, read_version,
    resolve_log_dir,
};

pub use instance::{Instance, Source};
pub use sources::{
    Candidate, KnownPathSource, PgDataSource, PgrxSource, ProcessSource, ScanSource, SourceScan,
};

/// macOS and Windows filesystems are case-insensitive by default.
const CASE_INSENSITIVE_FS: bool = cfg!(any(target_os = "macos", target_os = "windows"));

/// Error type for detection.
#[derive(Debug)]
pub enum DetectError {
    /// A source could not be scanned at all.
    SourceFailed { source: Source, reason: String },
    /// Part of a source could not be scanned (one pattern, one directory).
    Scan { source: Source, message: String },
    /// A valid data directory could not be turned into an instance.
    Instance { data_dir: PathBuf, error: ConfigError },
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectError::SourceFailed { source, reason } => {
                write!(f, "{} scan failed: {}", source, reason)
            }
            DetectError::Scan { source, message } => write!(f, "{} scan: {}", source, message),
            DetectError::Instance { data_dir, error } => {
                write!(f, "instance {}: {}", data_dir.display(), error)
            }
        }
    }
}

impl std::error::Error for DetectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DetectError::Instance { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Outcome of one detection pass.
#[derive(Debug, Default)]
pub struct DetectionResult {
    pub instances: Vec<Instance>,
    pub errors: Vec<DetectError>,
    /// Labels of sources that failed entirely.
    pub skipped_sources: Vec<String>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Runs an ordered list of sources and builds deduplicated instances.
pub struct Detector {
    sources: Vec<Box<dyn ScanSource>>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    /// Creates a detector with the four default sources, configured from the
    /// environment (home directory, `PGDATA`, platform paths).
    pub fn new() -> Self {
        Self::with_sources(vec![
            Box::new(ProcessSource),
            Box::new(PgrxSource::from_env()),
            Box::new(PgDataSource::from_env()),
            Box::new(KnownPathSource::from_env()),
        ])
    }

    /// Creates a detector over an explicit source list. List order is priority.
    pub fn with_sources(sources: Vec<Box<dyn ScanSource>>) -> Self {
        Self { sources }
    }

    /// Scans every source and returns the instances found.
    ///
    /// Never fails as a whole; per-source problems are collected in the result.
    pub fn detect(&self) -> DetectionResult {
        let mut result = DetectionResult::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for scanner in &self.sources {
            let source = scanner.source();
            let scan = match scanner.scan() {
                Ok(scan) => scan,
                Err(e) => {
                    warn!(source = %source, error = %e, "source skipped");
                    result.skipped_sources.push(source.label().to_string());
                    result.errors.push(e);
                    continue;
                }
            };

            let before = result.instances.len();
            result.errors.extend(scan.errors);

            for candidate in scan.candidates {
                let key = normalize_path(&candidate.data_dir);
                if seen.contains(&key) {
                    trace!(source = %source, path = %candidate.data_dir.display(), "duplicate candidate");
                    continue;
                }
                if !is_valid_data_dir(&candidate.data_dir) {
                    trace!(source = %source, path = %candidate.data_dir.display(), "not a data directory");
                    continue;
                }
                seen.insert(key);

                match build_instance(&candidate, source) {
                    Ok(instance) => result.instances.push(instance),
                    Err(e) => {
                        warn!(error = %e, "instance skipped");
                        result.errors.push(e);
                    }
                }
            }

            debug!(
                source = %source,
                found = result.instances.len() - before,
                "source scanned"
            );
        }

        info!(
            instances = result.instances.len(),
            errors = result.errors.len(),
            skipped = result.skipped_sources.len(),
            "detection complete"
        );
        result
    }
}

/// Convenience wrapper: detection with the default sources.
pub fn detect() -> DetectionResult {
    Detector::new().detect()
}

/// Builds an instance from a validated data directory.
///
/// `PG_VERSION` is required; `postgresql.conf` is best-effort. A live
/// `postmaster.pid` marks the instance running and its port wins over the
/// configured one.
fn build_instance(candidate: &Candidate, source: Source) -> Result<Instance, DetectError> {
    let data_dir = std::path::absolute(&candidate.data_dir)
        .unwrap_or_else(|_| candidate.data_dir.clone());

    let version = read_version(&data_dir).map_err(|error| DetectError::Instance {
        data_dir: data_dir.clone(),
        error,
    })?;

    let config = parse_config(&data_dir);
    let log_dir = resolve_log_dir(&data_dir, &config.log_directory);

    let mut port = config.port;
    let mut running = false;
    match parse_postmaster_pid(&data_dir) {
        Ok(info) if process::is_process_alive(info.pid) => {
            running = true;
            if info.port > 0 {
                port = info.port;
            }
        }
        Ok(info) => debug!(pid = info.pid, "stale postmaster.pid"),
        Err(e) if e.is_not_found() => {}
        Err(e) => debug!(error = %e, "unusable postmaster.pid"),
    }

    Ok(Instance {
        data_dir,
        version,
        source,
        source_detail: candidate.detail.clone(),
        port,
        log_dir,
        log_pattern: config.log_filename,
        running,
    })
}

/// Normalizes a path for identity comparison.
///
/// Absolute, without `.`/`..`/trailing or duplicate separators, and
/// lowercased on case-insensitive platforms. Purely lexical: symlinks are
/// not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }

    if CASE_INSENSITIVE_FS {
        PathBuf::from(cleaned.to_string_lossy().to_lowercase())
    } else {
        cleaned
    }
}
