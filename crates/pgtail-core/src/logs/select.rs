//! Active log file selection.
//!
//! The server names its log files after `log_filename`, a `strftime`
//! pattern. Each conversion is turned into a glob wildcard of the width it
//! produces, so `postgresql-%Y-%m-%d_%H%M%S.log` becomes
//! `postgresql-????-??-??_??????.log`. The newest matching file is active.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glob::Pattern;
use tracing::debug;

use super::tailer::TailError;

/// Server default for `log_filename`.
pub const DEFAULT_LOG_FILENAME: &str = "postgresql-%Y-%m-%d_%H%M%S.log";

/// Tried in order when the configured pattern matches nothing.
pub const FALLBACK_PATTERNS: &[&str] = &["postgresql-*.log", "postgres-*.log", "*.log"];

/// The chosen log file and the glob that selected it.
#[derive(Debug, Clone)]
pub struct Selection {
    pub path: PathBuf,
    pub pattern: Pattern,
}

/// Translates a `strftime`-style `log_filename` into a glob.
///
/// Fixed-width conversions become that many `?`; variable-width ones
/// (`%A`, `%B`, `%Z`, `%s`) become `*`; unknown conversions become one `?`.
/// Literal text is glob-escaped.
pub fn log_filename_to_glob(log_filename: &str) -> String {
    let mut glob = String::new();
    let mut literal = String::new();
    let mut chars = log_filename.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        let Some(conversion) = chars.next() else {
            literal.push('%');
            break;
        };
        if conversion == '%' {
            literal.push('%');
            continue;
        }

        glob.push_str(&Pattern::escape(&literal));
        literal.clear();
        glob.push_str(conversion_wildcard(conversion));
    }
    glob.push_str(&Pattern::escape(&literal));
    glob
}

fn conversion_wildcard(conversion: char) -> &'static str {
    match conversion {
        'Y' | 'G' => "????",
        'y' | 'g' | 'm' | 'd' | 'e' | 'H' | 'I' | 'M' | 'S' | 'p' | 'U' | 'W' | 'V' | 'C' => "??",
        'j' | 'a' | 'b' | 'h' => "???",
        'u' | 'w' => "?",
        'z' => "?????",
        'F' => "????-??-??",
        'T' => "??:??:??",
        'R' => "??:??",
        'A' | 'B' | 'Z' | 's' => "*",
        _ => "?",
    }
}

/// Picks the most recently modified file in `dir` for `log_filename`.
///
/// Falls back to `FALLBACK_PATTERNS` when the configured pattern matches
/// nothing. An empty `log_filename` means the server default.
pub fn select_log_file(dir: &Path, log_filename: &str) -> Result<Selection, TailError> {
    let files = list_files(dir)?;

    let log_filename = if log_filename.trim().is_empty() {
        DEFAULT_LOG_FILENAME
    } else {
        log_filename.trim()
    };
    let primary = log_filename_to_glob(log_filename);

    for glob in std::iter::once(primary.as_str()).chain(FALLBACK_PATTERNS.iter().copied()) {
        let Ok(pattern) = Pattern::new(glob) else {
            debug!(glob, "unusable log file pattern");
            continue;
        };
        if let Some(path) = newest_match(&files, &pattern) {
            debug!(path = %path.display(), glob, "selected log file");
            return Ok(Selection { path, pattern });
        }
    }

    Err(TailError::NoLogFile {
        dir: dir.to_path_buf(),
        pattern: log_filename.to_string(),
    })
}

/// Newest file in `dir` matching `pattern`, if any.
pub fn newest_in_dir(dir: &Path, pattern: &Pattern) -> Result<Option<PathBuf>, TailError> {
    Ok(newest_match(&list_files(dir)?, pattern))
}

struct FileEntry {
    path: PathBuf,
    name: String,
    modified: SystemTime,
}

fn list_files(dir: &Path) -> Result<Vec<FileEntry>, TailError> {
    let entries = fs::read_dir(dir).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
            TailError::LogDirMissing(dir.to_path_buf())
        }
        _ => TailError::LogDirUnreadable {
            path: dir.to_path_buf(),
            source,
        },
    })?;

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(FileEntry {
            path: entry.path(),
            name: entry.file_name().to_string_lossy().into_owned(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(files)
}

/// Ties on mtime go to the lexically greatest name (timestamped names sort by time).
fn newest_match(files: &[FileEntry], pattern: &Pattern) -> Option<PathBuf> {
    files
        .iter()
        .filter(|f| pattern.matches(&f.name))
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
        .map(|f| f.path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn touch(path: &Path, age: Duration) {
        fs::write(path, "x\n").unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_glob_translation() {
        assert_eq!(
            log_filename_to_glob("postgresql-%Y-%m-%d_%H%M%S.log"),
            "postgresql-????-??-??_??????.log"
        );
        assert_eq!(log_filename_to_glob("postgresql-%a.log"), "postgresql-???.log");
        assert_eq!(log_filename_to_glob("pg-%j.log"), "pg-???.log");
        assert_eq!(log_filename_to_glob("pg-%A.log"), "pg-*.log");
        assert_eq!(log_filename_to_glob("pg-%Q.log"), "pg-?.log");
        assert_eq!(log_filename_to_glob("100%%.log"), "100%.log");
        assert_eq!(log_filename_to_glob("trailing%"), "trailing%");
        assert_eq!(log_filename_to_glob("odd[1].log"), "odd[[]1[]].log");
    }

    #[test]
    fn test_translated_glob_matches_real_names() {
        let pattern = Pattern::new(&log_filename_to_glob(DEFAULT_LOG_FILENAME)).unwrap();
        assert!(pattern.matches("postgresql-2024-01-15_102345.log"));
        assert!(!pattern.matches("postgresql-2024-01-15.log"));

        let pattern = Pattern::new(&log_filename_to_glob("odd[1].log")).unwrap();
        assert!(pattern.matches("odd[1].log"));
    }

    #[test]
    fn test_select_newest_primary_match() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("postgresql-Mon.log"), Duration::from_secs(120));
        touch(&dir.path().join("postgresql-Tue.log"), Duration::from_secs(10));
        touch(&dir.path().join("other.log"), Duration::ZERO);

        let selection = select_log_file(dir.path(), "postgresql-%a.log").unwrap();
        assert_eq!(selection.path, dir.path().join("postgresql-Tue.log"));
    }

    #[test]
    fn test_select_falls_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("postgres-1.log"), Duration::from_secs(60));
        touch(&dir.path().join("server.log"), Duration::ZERO);

        let selection = select_log_file(dir.path(), "nomatch-%Y.log").unwrap();
        assert_eq!(selection.path, dir.path().join("postgres-1.log"));
        assert_eq!(selection.pattern.as_str(), "postgres-*.log");

        fs::remove_file(dir.path().join("postgres-1.log")).unwrap();
        let selection = select_log_file(dir.path(), "nomatch-%Y.log").unwrap();
        assert_eq!(selection.path, dir.path().join("server.log"));
    }

    #[test]
    fn test_select_default_pattern_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("postgresql-2024-01-15_000000.log"), Duration::ZERO);

        let selection = select_log_file(dir.path(), "").unwrap();
        assert_eq!(selection.pattern.as_str(), "postgresql-????-??-??_??????.log");
    }

    #[test]
    fn test_select_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            select_log_file(&dir.path().join("missing"), ""),
            Err(TailError::LogDirMissing(_))
        ));
        assert!(matches!(
            select_log_file(dir.path(), ""),
            Err(TailError::NoLogFile { .. })
        ));

        fs::create_dir(dir.path().join("sub.log")).unwrap();
        assert!(matches!(
            select_log_file(dir.path(), ""),
            Err(TailError::NoLogFile { .. })
        ));
    }
}
