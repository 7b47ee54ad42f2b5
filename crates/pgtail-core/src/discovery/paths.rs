//! Candidate data directories from well-known filesystem locations.
//!
//! Three inputs feed this scanner:
//! - package-manager / installer defaults, expressed as glob patterns
//! - pgrx development clusters under `~/.pgrx/data-*`
//! - the `PGDATA` environment variable

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glob::{GlobError, PatternError};

/// pgrx keeps one cluster per major version in `~/.pgrx/data-<ver>`.
const PGRX_DIR: &str = ".pgrx";
const PGRX_DATA_PREFIX: &str = "data-";

/// A glob pattern for a default data directory location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPath {
    pub pattern: String,
    /// Installer label, e.g. `"brew"` or `"apt"`.
    pub detail: String,
}

impl KnownPath {
    pub fn new(pattern: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            detail: detail.into(),
        }
    }
}

/// Result of expanding one glob pattern.
#[derive(Debug, Default)]
pub struct Expansion {
    pub paths: Vec<PathBuf>,
    /// Entries the glob walker could not read (permissions, races).
    pub errors: Vec<GlobError>,
}

/// Default data directory locations for the current platform.
pub fn known_paths() -> Vec<KnownPath> {
    let home = dirs::home_dir();
    platform_paths(home.as_deref())
}

#[cfg(target_os = "macos")]
fn platform_paths(home: Option<&Path>) -> Vec<KnownPath> {
    let mut paths = vec![
        KnownPath::new("/opt/homebrew/var/postgres*", "brew"),
        KnownPath::new("/usr/local/var/postgres*", "brew"),
        KnownPath::new("/Library/PostgreSQL/*/data", "installer"),
    ];
    if let Some(home) = home {
        paths.push(KnownPath::new(
            format!(
                "{}/Library/Application Support/Postgres/var-*",
                escape_path(home)
            ),
            "postgres.app",
        ));
    }
    paths
}

#[cfg(target_os = "windows")]
fn platform_paths(_home: Option<&Path>) -> Vec<KnownPath> {
    let mut paths = vec![KnownPath::new(
        r"C:\Program Files\PostgreSQL\*\data",
        "installer",
    )];
    if let Ok(program_data) = env::var("PROGRAMDATA")
        && !program_data.is_empty()
    {
        paths.push(KnownPath::new(
            format!(r"{}\PostgreSQL\*\data", glob::Pattern::escape(&program_data)),
            "installer",
        ));
    }
    paths
}

#[cfg(target_os = "linux")]
fn platform_paths(_home: Option<&Path>) -> Vec<KnownPath> {
    vec![
        KnownPath::new("/var/lib/postgresql/*/*", "apt"),
        KnownPath::new("/var/lib/pgsql/*/data", "yum"),
        KnownPath::new("/var/lib/pgsql/data", "yum"),
        KnownPath::new("/var/lib/postgres/data", "pacman"),
        KnownPath::new("/usr/local/pgsql/data", "source"),
        KnownPath::new("/home/linuxbrew/.linuxbrew/var/postgres*", "brew"),
    ]
}

#[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
fn platform_paths(_home: Option<&Path>) -> Vec<KnownPath> {
    vec![
        KnownPath::new("/var/db/postgres/data*", "pkg"),
        KnownPath::new("/usr/local/pgsql/data", "source"),
    ]
}

/// Expands a glob pattern into matching directories.
pub fn expand_pattern(pattern: &str) -> Result<Expansion, PatternError> {
    let mut expansion = Expansion::default();
    for entry in glob::glob(pattern)? {
        match entry {
            Ok(path) if path.is_dir() => expansion.paths.push(path),
            Ok(_) => {}
            Err(e) => expansion.errors.push(e),
        }
    }
    Ok(expansion)
}

/// Lists pgrx data directories under `<home>/.pgrx`.
///
/// A missing `.pgrx` directory yields an empty list.
pub fn pgrx_data_dirs(home: &Path) -> io::Result<Vec<PathBuf>> {
    let root = home.join(PGRX_DIR);
    let entries = match fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(PGRX_DATA_PREFIX) && entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Reads `PGDATA`, expanding a leading `~`. Unset or blank yields `None`.
pub fn pgdata_from_env() -> Option<PathBuf> {
    let value = env::var("PGDATA").ok()?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some(expand_tilde(value))
}

/// Expands `~` and `~/...` to the home directory. Other paths are returned as-is.
pub fn expand_tilde(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
            .or_else(|| path.strip_prefix("~\\"))
    };

    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(target_os = "macos")]
fn escape_path(path: &Path) -> String {
    glob::Pattern::escape(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_paths_not_empty() {
        let paths = known_paths();
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| !p.detail.is_empty()));
    }

    #[test]
    fn test_expand_pattern_directories_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("data-15")).unwrap();
        fs::create_dir(dir.path().join("data-16")).unwrap();
        fs::write(dir.path().join("data-file"), "").unwrap();

        let pattern = format!("{}/data-*", glob::Pattern::escape(&dir.path().to_string_lossy()));
        let mut expansion = expand_pattern(&pattern).unwrap();
        expansion.paths.sort();
        assert_eq!(
            expansion.paths,
            vec![dir.path().join("data-15"), dir.path().join("data-16")]
        );
        assert!(expansion.errors.is_empty());
    }

    #[test]
    fn test_expand_pattern_invalid() {
        assert!(expand_pattern("/tmp/[").is_err());
    }

    #[test]
    fn test_pgrx_data_dirs() {
        let home = tempfile::tempdir().unwrap();
        assert!(pgrx_data_dirs(home.path()).unwrap().is_empty());

        let pgrx = home.path().join(".pgrx");
        fs::create_dir_all(pgrx.join("data-16")).unwrap();
        fs::create_dir_all(pgrx.join("16.4")).unwrap();
        fs::write(pgrx.join("data-17"), "not a dir").unwrap();

        assert_eq!(pgrx_data_dirs(home.path()).unwrap(), vec![pgrx.join("data-16")]);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("rel"), PathBuf::from("rel"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~"), home);
            assert_eq!(expand_tilde("~/pg/data"), home.join("pg/data"));
        }
        // Only a leading "~/" is expanded.
        assert_eq!(expand_tilde("~user/x"), PathBuf::from("~user/x"));
    }
}
