//! Running PostgreSQL server discovery via the OS process table.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, trace};

/// Process name fragments identifying a PostgreSQL server.
const SERVER_NAMES: &[&str] = &["postgres", "postmaster"];

/// A running server process with an extractable data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub data_dir: PathBuf,
    pub cmdline: String,
}

/// Enumerates OS processes and returns PostgreSQL servers started with `-D`.
///
/// Processes matching the name filter but without a data directory argument
/// (backends, auxiliary processes, tools) are skipped.
///
/// Returns `Err` if the process table could not be read at all.
pub fn find_running_postgres() -> io::Result<Vec<ProcessInfo>> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing()
            .with_cmd(UpdateKind::OnlyIfNotSet)
            .with_cwd(UpdateKind::OnlyIfNotSet),
    );

    if system.processes().is_empty() {
        return Err(io::Error::other("process table unavailable"));
    }

    let mut found = Vec::new();
    for (pid, process) in system.processes() {
        let name = process.name().to_string_lossy();
        if !is_postgres_process_name(&name) {
            continue;
        }

        let cmdline = join_cmdline(process.cmd());
        let Some(data_dir) = extract_data_dir(&cmdline) else {
            trace!(pid = pid.as_u32(), cmdline = %cmdline, "postgres process without -D");
            continue;
        };

        let data_dir = resolve_against_cwd(PathBuf::from(data_dir), process.cwd());
        debug!(pid = pid.as_u32(), data_dir = %data_dir.display(), "found postgres process");
        found.push(ProcessInfo {
            pid: pid.as_u32(),
            name: name.into_owned(),
            data_dir,
            cmdline,
        });
    }

    // HashMap iteration order is arbitrary; keep scans reproducible.
    found.sort_by_key(|p| p.pid);
    Ok(found)
}

/// Returns `true` if a process with `pid` currently exists.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

/// Case-insensitive match against the server process names.
pub fn is_postgres_process_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SERVER_NAMES.iter().any(|n| name.contains(n))
}

/// Extracts the data directory from a server command line.
///
/// Tried in order, first match wins: `-D <path>`, `-D<path>`,
/// `--data <path>`, `--data=<path>`.
pub fn extract_data_dir(cmdline: &str) -> Option<String> {
    let tokens = tokenize_cmdline(cmdline);

    let separate = |flag: &str| {
        tokens
            .windows(2)
            .find(|w| w[0] == flag && !w[1].is_empty())
            .map(|w| w[1].clone())
    };
    let joined = |prefix: &str| {
        tokens
            .iter()
            .find_map(|t| t.strip_prefix(prefix).filter(|v| !v.is_empty()))
            .map(str::to_string)
    };

    separate("-D")
        .or_else(|| joined("-D"))
        .or_else(|| separate("--data"))
        .or_else(|| joined("--data="))
        .filter(|dir| !dir.is_empty())
}

/// Splits a command line on whitespace, keeping quoted segments intact.
///
/// Quotes may start mid-token (`-D"/x y"`); the quote characters are removed.
pub fn tokenize_cmdline(cmdline: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in cmdline.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }

    tokens
}

/// Rebuilds a command line from argv so that `tokenize_cmdline` yields argv back.
fn join_cmdline(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| quote_arg(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Double-quotes an argument with whitespace or quotes in it. An embedded
/// `"` closes the quote and is emitted as `'"'`.
fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' {
            quoted.push_str("\"'\"'\"");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('"');
    quoted
}

/// A relative `-D` is relative to the server's working directory.
fn resolve_against_cwd(data_dir: PathBuf, cwd: Option<&Path>) -> PathBuf {
    match cwd {
        Some(cwd) if data_dir.is_relative() => cwd.join(data_dir),
        _ => data_dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_data_dir_variants() {
        assert_eq!(
            extract_data_dir("/usr/lib/postgresql/16/bin/postgres -D /x"),
            Some("/x".to_string())
        );
        assert_eq!(extract_data_dir("postgres -D/x"), Some("/x".to_string()));
        assert_eq!(extract_data_dir("postgres --data /x"), Some("/x".to_string()));
        assert_eq!(extract_data_dir("postgres --data=/x"), Some("/x".to_string()));
    }

    #[test]
    fn test_extract_data_dir_quoted() {
        assert_eq!(
            extract_data_dir("postgres -D \"/x y\""),
            Some("/x y".to_string())
        );
        assert_eq!(
            extract_data_dir("postgres -D '/x y' -p 5433"),
            Some("/x y".to_string())
        );
        assert_eq!(
            extract_data_dir(
                r#""C:\Program Files\PostgreSQL\16\bin\postgres.exe" -D "C:\Program Files\PostgreSQL\16\data""#
            ),
            Some(r"C:\Program Files\PostgreSQL\16\data".to_string())
        );
    }

    #[test]
    fn test_extract_data_dir_missing() {
        assert_eq!(extract_data_dir("postgres: checkpointer"), None);
        assert_eq!(extract_data_dir("postgres -p 5432"), None);
        assert_eq!(extract_data_dir("postgres -D"), None);
        assert_eq!(extract_data_dir(""), None);
    }

    #[test]
    fn test_extract_data_dir_skips_empty_value() {
        assert_eq!(
            extract_data_dir("postgres -D \"\" --data /x"),
            Some("/x".to_string())
        );
        assert_eq!(extract_data_dir("postgres -D '' --data=/y"), Some("/y".to_string()));
    }

    #[test]
    fn test_extract_data_dir_pattern_order() {
        // "-D <path>" is tried before "--data=<path>" regardless of position.
        assert_eq!(
            extract_data_dir("postgres --data=/b -D /a"),
            Some("/a".to_string())
        );
    }

    #[test]
    fn test_tokenize_cmdline() {
        assert_eq!(
            tokenize_cmdline("  a  'b c'\t\"d e\" f"),
            vec!["a", "b c", "d e", "f"]
        );
        assert_eq!(tokenize_cmdline("-D\"/x y\""), vec!["-D/x y"]);
        assert_eq!(tokenize_cmdline("a \"\" b"), vec!["a", "", "b"]);
        assert!(tokenize_cmdline("   ").is_empty());
    }

    #[test]
    fn test_is_postgres_process_name() {
        assert!(is_postgres_process_name("postgres"));
        assert!(is_postgres_process_name("postgres.exe"));
        assert!(is_postgres_process_name("Postmaster"));
        assert!(!is_postgres_process_name("pg_ctl"));
        assert!(!is_postgres_process_name("bash"));
    }

    #[test]
    fn test_join_cmdline_quotes_spaces() {
        let args: Vec<OsString> = vec!["postgres".into(), "-D".into(), "/x y".into()];
        let cmdline = join_cmdline(&args);
        assert_eq!(cmdline, "postgres -D \"/x y\"");
        assert_eq!(extract_data_dir(&cmdline), Some("/x y".to_string()));
    }

    #[test]
    fn test_join_cmdline_tokenizes_back() {
        let argv = [
            "postgres",
            "-D",
            "/srv/it's \"quoted\" data",
            "-c",
            "cluster_name='main'",
            "",
            "--data=/a\"b",
        ];
        let args: Vec<OsString> = argv.iter().map(OsString::from).collect();
        assert_eq!(tokenize_cmdline(&join_cmdline(&args)), argv);
        assert_eq!(
            extract_data_dir(&join_cmdline(&args)),
            Some("/srv/it's \"quoted\" data".to_string())
        );
    }

    #[test]
    fn test_resolve_against_cwd() {
        assert_eq!(
            resolve_against_cwd(PathBuf::from("data"), Some(Path::new("/srv/pg"))),
            PathBuf::from("/srv/pg/data")
        );
        assert_eq!(
            resolve_against_cwd(PathBuf::from("/abs"), Some(Path::new("/srv/pg"))),
            PathBuf::from("/abs")
        );
        assert_eq!(
            resolve_against_cwd(PathBuf::from("data"), None),
            PathBuf::from("data")
        );
    }

    #[test]
    fn test_is_process_alive() {
        assert!(is_process_alive(std::process::id()));
        assert!(!is_process_alive(0));
    }
}
