//! Discovered instance model.

use std::path::PathBuf;

use serde::Serialize;

/// How an instance was found. Declaration order is detection priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// A running postgres/postmaster process with `-D`.
    Process,
    /// A pgrx development data directory (`~/.pgrx/data-*`).
    Pgrx,
    /// The `PGDATA` environment variable.
    EnvVar,
    /// A package-manager or installer default location.
    KnownPath,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::Process => "process",
            Source::Pgrx => "pgrx",
            Source::EnvVar => "env-var",
            Source::KnownPath => "known-path",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A discovered PostgreSQL installation.
///
/// Built once per detection pass and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub data_dir: PathBuf,
    pub version: String,
    pub source: Source,
    /// Human label for the source, e.g. `"brew"`, `"apt"`, `"pid 1234"`.
    pub source_detail: String,
    pub port: u16,
    pub log_dir: PathBuf,
    /// Raw `log_filename` setting; empty if not configured.
    pub log_pattern: String,
    pub running: bool,
}

impl Instance {
    /// One-line description, e.g. `PostgreSQL 16 on :5432 (running) /var/lib/... [known-path: apt]`.
    pub fn summary(&self) -> String {
        let state = if self.running { "running" } else { "stopped" };
        let detail = if self.source_detail.is_empty() {
            self.source.label().to_string()
        } else {
            format!("{}: {}", self.source.label(), self.source_detail)
        };
        format!(
            "PostgreSQL {} on :{} ({}) {} [{}]",
            self.version,
            self.port,
            state,
            self.data_dir.display(),
            detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_order_is_priority() {
        assert!(Source::Process < Source::Pgrx);
        assert!(Source::Pgrx < Source::EnvVar);
        assert!(Source::EnvVar < Source::KnownPath);
    }

    #[test]
    fn test_summary() {
        let instance = Instance {
            data_dir: PathBuf::from("/var/lib/postgresql/16/main"),
            version: "16".to_string(),
            source: Source::KnownPath,
            source_detail: "apt".to_string(),
            port: 5433,
            log_dir: PathBuf::from("/var/lib/postgresql/16/main/log"),
            log_pattern: String::new(),
            running: false,
        };
        assert_eq!(
            instance.summary(),
            "PostgreSQL 16 on :5433 (stopped) /var/lib/postgresql/16/main [known-path: apt]"
        );
    }
}
