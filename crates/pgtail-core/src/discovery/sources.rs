//! Detection sources: each turns one discovery signal into candidates.

use std::path::PathBuf;

use tracing::debug;

use super::paths::{self, KnownPath};
use super::process;
use super::{DetectError, Source};

/// A directory proposed by a source, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub data_dir: PathBuf,
    pub detail: String,
}

impl Candidate {
    pub fn new(data_dir: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            detail: detail.into(),
        }
    }
}

/// Candidates plus non-fatal errors from one source.
#[derive(Debug, Default)]
pub struct SourceScan {
    pub candidates: Vec<Candidate>,
    pub errors: Vec<DetectError>,
}

/// One discovery strategy.
///
/// `scan` returns `Err` only when the source could not be scanned at all;
/// the detector then records it as skipped and moves on.
pub trait ScanSource {
    fn source(&self) -> Source;

    fn scan(&self) -> Result<SourceScan, DetectError>;
}

/// Running server processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSource;

impl ScanSource for ProcessSource {
    fn source(&self) -> Source {
        Source::Process
    }

    fn scan(&self) -> Result<SourceScan, DetectError> {
        let processes =
            process::find_running_postgres().map_err(|e| DetectError::SourceFailed {
                source: Source::Process,
                reason: e.to_string(),
            })?;

        Ok(SourceScan {
            candidates: processes
                .into_iter()
                .map(|p| Candidate::new(p.data_dir, format!("pid {}", p.pid)))
                .collect(),
            errors: Vec::new(),
        })
    }
}

/// pgrx development clusters under `<home>/.pgrx`.
#[derive(Debug, Clone)]
pub struct PgrxSource {
    home: Option<PathBuf>,
}

impl PgrxSource {
    pub fn new(home: Option<PathBuf>) -> Self {
        Self { home }
    }

    pub fn from_env() -> Self {
        Self::new(dirs::home_dir())
    }
}

impl ScanSource for PgrxSource {
    fn source(&self) -> Source {
        Source::Pgrx
    }

    fn scan(&self) -> Result<SourceScan, DetectError> {
        let home = self.home.as_ref().ok_or_else(|| DetectError::SourceFailed {
            source: Source::Pgrx,
            reason: "home directory not found".to_string(),
        })?;

        let dirs = paths::pgrx_data_dirs(home).map_err(|e| DetectError::SourceFailed {
            source: Source::Pgrx,
            reason: format!("{}: {}", home.join(".pgrx").display(), e),
        })?;

        Ok(SourceScan {
            candidates: dirs.into_iter().map(|d| Candidate::new(d, "pgrx")).collect(),
            errors: Vec::new(),
        })
    }
}

/// The `PGDATA` environment variable.
#[derive(Debug, Clone)]
pub struct PgDataSource {
    pgdata: Option<PathBuf>,
}

impl PgDataSource {
    pub fn new(pgdata: Option<PathBuf>) -> Self {
        Self { pgdata }
    }

    pub fn from_env() -> Self {
        Self::new(paths::pgdata_from_env())
    }
}

impl ScanSource for PgDataSource {
    fn source(&self) -> Source {
        Source::EnvVar
    }

    fn scan(&self) -> Result<SourceScan, DetectError> {
        Ok(SourceScan {
            candidates: self
                .pgdata
                .iter()
                .map(|d| Candidate::new(d.clone(), "PGDATA"))
                .collect(),
            errors: Vec::new(),
        })
    }
}

/// Package-manager and installer default locations.
#[derive(Debug, Clone)]
pub struct KnownPathSource {
    paths: Vec<KnownPath>,
}

impl KnownPathSource {
    pub fn new(paths: Vec<KnownPath>) -> Self {
        Self { paths }
    }

    pub fn from_env() -> Self {
        Self::new(paths::known_paths())
    }
}

impl ScanSource for KnownPathSource {
    fn source(&self) -> Source {
        Source::KnownPath
    }

    fn scan(&self) -> Result<SourceScan, DetectError> {
        let mut scan = SourceScan::default();
        let mut failed = 0;

        for known in &self.paths {
            let expansion = match paths::expand_pattern(&known.pattern) {
                Ok(expansion) => expansion,
                Err(e) => {
                    failed += 1;
                    scan.errors.push(DetectError::Scan {
                        source: Source::KnownPath,
                        message: format!("invalid pattern {:?}: {}", known.pattern, e),
                    });
                    continue;
                }
            };

            for e in expansion.errors {
                scan.errors.push(DetectError::Scan {
                    source: Source::KnownPath,
                    message: e.to_string(),
                });
            }
            debug!(pattern = %known.pattern, matches = expansion.paths.len(), "known path expanded");
            scan.candidates.extend(
                expansion
                    .paths
                    .into_iter()
                    .map(|p| Candidate::new(p, known.detail.clone())),
            );
        }

        if failed > 0 && failed == self.paths.len() {
            return Err(DetectError::SourceFailed {
                source: Source::KnownPath,
                reason: "no usable path patterns".to_string(),
            });
        }
        Ok(scan)
    }
}
