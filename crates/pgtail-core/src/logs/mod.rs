//! Log tailing, parsing and filtering.
//!
//! A `Tailer` follows the active log file of one instance and produces
//! `LogEntry` values; consumers narrow them with a `Filter` (or an
//! `EntryGate`, which keeps continuation lines with their parent entry).

mod filter;
mod level;
mod parser;
mod queue;
pub mod select;
mod tailer;

pub use filter::{EntryGate, Filter};
pub use level::{LogLevel, UnknownLevel, parse_log_level};
pub use parser::{LogEntry, parse_line};
pub use tailer::{
    DEFAULT_ENTRY_CAPACITY, DEFAULT_ERROR_CAPACITY, DEFAULT_POLL_INTERVAL, TailError, Tailer,
    TailerConfig, TailerState, WatchMode,
};
