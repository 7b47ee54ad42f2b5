//! `postgresql.conf` reader.
//!
//! Only the settings needed to locate and tail the server log are extracted:
//! `port`, `log_directory`, `log_filename` and `log_destination`.
//! Everything else in the file is ignored.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::debug;

/// Port the server listens on when `port` is not configured.
pub const DEFAULT_PORT: u16 = 5432;

const CONF_FILE: &str = "postgresql.conf";
const AUTO_CONF_FILE: &str = "postgresql.auto.conf";

/// Debian/Ubuntu keep cluster configuration outside the data directory.
const DEBIAN_DATA_ROOT: &str = "/var/lib/postgresql";
const DEBIAN_CONF_ROOT: &str = "/etc/postgresql";

/// Subset of `postgresql.conf` relevant to log discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub port: u16,
    pub log_directory: String,
    pub log_filename: String,
    pub log_destination: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_directory: String::new(),
            log_filename: String::new(),
            log_destination: String::new(),
        }
    }
}

impl Config {
    /// Applies every recognized assignment in `content` on top of `self`.
    ///
    /// Later assignments win, both within one file and across files.
    fn apply(&mut self, content: &str) {
        for line in content.lines() {
            let Some((key, value)) = parse_assignment(line) else {
                continue;
            };

            match key.as_str() {
                "port" => match value.trim().parse::<u16>() {
                    Ok(port) if port > 0 => self.port = port,
                    _ => debug!(value = %value, "ignoring unparseable port"),
                },
                "log_directory" => self.log_directory = value,
                "log_filename" => self.log_filename = value,
                "log_destination" => self.log_destination = value,
                _ => {}
            }
        }
    }
}

/// Reads `postgresql.conf` (and `postgresql.auto.conf`) for a data directory.
///
/// Never fails: a missing or unreadable file yields the defaults.
pub fn parse_config(data_dir: &Path) -> Config {
    let mut config = Config::default();

    let conf_path = config_file_path(data_dir);
    match fs::read_to_string(&conf_path) {
        Ok(content) => config.apply(&content),
        Err(e) => debug!(path = %conf_path.display(), error = %e, "postgresql.conf not readable"),
    }

    // ALTER SYSTEM settings override the main file.
    if let Ok(content) = fs::read_to_string(data_dir.join(AUTO_CONF_FILE)) {
        config.apply(&content);
    }

    config
}

/// Parses `postgresql.conf` content.
pub fn parse_config_str(content: &str) -> Config {
    let mut config = Config::default();
    config.apply(content);
    config
}

/// Locates the main config file, falling back to the Debian layout
/// (`/etc/postgresql/<ver>/<cluster>/`) when the data directory has none.
fn config_file_path(data_dir: &Path) -> PathBuf {
    let local = data_dir.join(CONF_FILE);
    if local.exists() {
        return local;
    }

    match debian_conf_dir(data_dir) {
        Some(dir) if dir.join(CONF_FILE).exists() => dir.join(CONF_FILE),
        _ => local,
    }
}

/// Maps `/var/lib/postgresql/<ver>/<cluster>` to `/etc/postgresql/<ver>/<cluster>`.
fn debian_conf_dir(data_dir: &Path) -> Option<PathBuf> {
    let rest = data_dir.strip_prefix(DEBIAN_DATA_ROOT).ok()?;
    let parts: Vec<_> = rest
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s),
            _ => None,
        })
        .collect();

    match parts.as_slice() {
        [version, cluster] => Some(Path::new(DEBIAN_CONF_ROOT).join(version).join(cluster)),
        _ => None,
    }
}

/// Splits one config line into a lowercased key and its unquoted value.
///
/// Accepts `key = value`, `key=value` and `key value`. Returns `None` for
/// blank lines, comments and lines without a value.
fn parse_assignment(line: &str) -> Option<(String, String)> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let key_end = line
        .find(|c: char| c == '=' || c.is_whitespace() || c == '#')
        .unwrap_or(line.len());
    let key = &line[..key_end];
    if key.is_empty() {
        return None;
    }

    let rest = line[key_end..].trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim_start();
    if rest.is_empty() || rest.starts_with('#') {
        return None;
    }

    Some((key.to_ascii_lowercase(), parse_value(rest)))
}

/// Parses a value: quoted (single or double) or bare up to an inline comment.
fn parse_value(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(quote @ ('\'' | '"')) => {
            let mut value = String::new();
            let mut chars = chars.peekable();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(&next) = chars.peek() {
                        value.push(next);
                        chars.next();
                    }
                } else if c == quote {
                    // A doubled quote is an escaped quote.
                    if chars.peek() == Some(&quote) {
                        value.push(quote);
                        chars.next();
                    } else {
                        break;
                    }
                } else {
                    value.push(c);
                }
            }
            value
        }
        _ => {
            let end = raw.find('#').unwrap_or(raw.len());
            raw[..end].trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_comment_only() {
        assert_eq!(parse_config_str(""), Config::default());

        let config = parse_config_str("# comment\n\n   # indented comment\n");
        assert_eq!(config.port, 5432);
        assert!(config.log_directory.is_empty());
        assert!(config.log_filename.is_empty());
        assert!(config.log_destination.is_empty());
    }

    #[test]
    fn test_quoted_and_bare_values() {
        let content = "\
port = 5433
log_directory = 'pg_log'
log_filename = \"postgresql-%Y-%m-%d.log\"
log_destination=stderr
";
        let config = parse_config_str(content);
        assert_eq!(config.port, 5433);
        assert_eq!(config.log_directory, "pg_log");
        assert_eq!(config.log_filename, "postgresql-%Y-%m-%d.log");
        assert_eq!(config.log_destination, "stderr");
    }

    #[test]
    fn test_inline_comments() {
        let content = "\
port=5434   # change requires restart
log_directory = '/var/log/pg # not a comment'   # trailing
log_destination = 'stderr'# glued comment
";
        let config = parse_config_str(content);
        assert_eq!(config.port, 5434);
        assert_eq!(config.log_directory, "/var/log/pg # not a comment");
        assert_eq!(config.log_destination, "stderr");
    }

    #[test]
    fn test_commented_out_setting_ignored() {
        let config = parse_config_str("#port = 6000\n#log_directory = 'x'\n");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.log_directory.is_empty());
    }

    #[test]
    fn test_unparseable_port_keeps_default() {
        assert_eq!(parse_config_str("port = abc\n").port, DEFAULT_PORT);
        assert_eq!(parse_config_str("port = 0\n").port, DEFAULT_PORT);
        assert_eq!(parse_config_str("port = 99999\n").port, DEFAULT_PORT);
    }

    #[test]
    fn test_last_assignment_wins_and_keys_case_insensitive() {
        let config = parse_config_str("port = 5433\nPORT = 5444\n");
        assert_eq!(config.port, 5444);
    }

    #[test]
    fn test_optional_equals_and_escaped_quotes() {
        let config = parse_config_str("log_filename 'it''s.log'\nlog_directory 'a\\'b'\n");
        assert_eq!(config.log_filename, "it's.log");
        assert_eq!(config.log_directory, "a'b");
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = parse_config_str("shared_buffers = 128MB\nmax_connections = 100\n");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_config_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(parse_config(dir.path()), Config::default());
    }

    #[test]
    fn test_parse_config_auto_conf_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("postgresql.conf"),
            "port = 5433\nlog_directory = 'log'\n",
        )
        .unwrap();
        fs::write(dir.path().join("postgresql.auto.conf"), "port = '5440'\n").unwrap();

        let config = parse_config(dir.path());
        assert_eq!(config.port, 5440);
        assert_eq!(config.log_directory, "log");
    }

    #[test]
    fn test_debian_conf_dir() {
        assert_eq!(
            debian_conf_dir(Path::new("/var/lib/postgresql/16/main")),
            Some(PathBuf::from("/etc/postgresql/16/main"))
        );
        assert_eq!(debian_conf_dir(Path::new("/var/lib/postgresql/16")), None);
        assert_eq!(debian_conf_dir(Path::new("/srv/pg/16/main")), None);
    }
}
