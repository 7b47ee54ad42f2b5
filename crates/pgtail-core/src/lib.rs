//! pgtail-core - PostgreSQL instance discovery and log tailing.
//!
//! Provides:
//! - `datadir` - readers for `postgresql.conf`, `PG_VERSION` and `postmaster.pid`
//! - `discovery` - multi-source instance detection with deduplication
//! - `logs` - log file tailing, line parsing and severity filtering
//!
//! Data flow:
//!
//! ```text
//! Detector ──► Vec<Instance> ──► Tailer(log_dir, log_pattern)
//!                                    │ raw lines
//!                                    ▼
//!                              parse_line ──► LogEntry ──► Filter ──► consumer
//! ```

pub mod datadir;
pub mod discovery;
pub mod logs;

pub use datadir::{Config, ConfigError, PostmasterInfo};
pub use discovery::{DetectError, DetectionResult, Detector, Instance, Source};
pub use logs::{
    EntryGate, Filter, LogEntry, LogLevel, TailError, Tailer, TailerConfig, TailerState, WatchMode,
};
