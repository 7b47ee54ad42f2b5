//! Live tail of a PostgreSQL log directory.
//!
//! `Tailer::start` picks the active log file, seeks to its end and spawns
//! one worker thread. The worker either reacts to native filesystem events
//! (`notify`) or polls on a fixed interval; the choice is made once at start.
//!
//! ```text
//! Created ──start()──► Running(Event | Polling) ──stop()──► Stopped
//!                          │      ▲
//!                          ▼      │ rotation: drain old file, open new at 0
//!                         (switch)
//! ```
//!
//! Output goes through two drop-oldest queues: parsed entries and
//! non-fatal runtime errors. The worker owns the file handle and watcher;
//! `stop()` signals it, waits for it to exit, and the queues close when its
//! senders drop.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, select};
use glob::Pattern;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, trace, warn};

use super::parser::{LogEntry, parse_line};
use super::queue::{DropOldestSender, drop_oldest};
use super::select::{Selection, newest_in_dir, select_log_file};
use crate::discovery::Instance;

/// Interval between checks in polling mode.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Parsed entries buffered for the consumer.
pub const DEFAULT_ENTRY_CAPACITY: usize = 100;
/// Runtime errors buffered for the consumer.
pub const DEFAULT_ERROR_CAPACITY: usize = 10;

/// Upper bound on lines read before re-checking the stop signal.
const MAX_LINES_PER_READ: usize = 10_000;

/// Error type for tailing.
#[derive(Debug)]
pub enum TailError {
    /// The log directory does not exist or is not a directory.
    LogDirMissing(PathBuf),
    /// The log directory exists but cannot be listed.
    LogDirUnreadable { path: PathBuf, source: io::Error },
    /// No file in the log directory matches the pattern or any fallback.
    NoLogFile { dir: PathBuf, pattern: String },
    /// The selected log file could not be opened.
    Open { path: PathBuf, source: io::Error },
    /// A read failed while tailing. Tailing continues.
    Read { path: PathBuf, source: io::Error },
    /// The native watcher reported an error. Tailing continues.
    Watch(String),
    /// `start()` was called on a running tailer.
    AlreadyStarted,
    /// `start()` was called after `stop()`.
    Stopped,
    /// The worker thread could not be spawned.
    Spawn(io::Error),
}

impl std::fmt::Display for TailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TailError::LogDirMissing(path) => {
                write!(f, "log directory {} does not exist", path.display())
            }
            TailError::LogDirUnreadable { path, source } => {
                write!(f, "log directory {}: {}", path.display(), source)
            }
            TailError::NoLogFile { dir, pattern } => write!(
                f,
                "no log file matching {:?} in {}",
                pattern,
                dir.display()
            ),
            TailError::Open { path, source } => {
                write!(f, "open {}: {}", path.display(), source)
            }
            TailError::Read { path, source } => {
                write!(f, "read {}: {}", path.display(), source)
            }
            TailError::Watch(msg) => write!(f, "watch error: {}", msg),
            TailError::AlreadyStarted => write!(f, "tailer already started"),
            TailError::Stopped => write!(f, "tailer stopped"),
            TailError::Spawn(e) => write!(f, "spawn tailer thread: {}", e),
        }
    }
}

impl std::error::Error for TailError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TailError::LogDirUnreadable { source, .. }
            | TailError::Open { source, .. }
            | TailError::Read { source, .. } => Some(source),
            TailError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Tailer settings.
#[derive(Debug, Clone)]
pub struct TailerConfig {
    pub poll_interval: Duration,
    pub entry_capacity: usize,
    pub error_capacity: usize,
    /// Skip native notification and poll even where events are available.
    pub force_polling: bool,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            entry_capacity: DEFAULT_ENTRY_CAPACITY,
            error_capacity: DEFAULT_ERROR_CAPACITY,
            force_polling: false,
        }
    }
}

/// How the worker learns about new data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Event,
    Polling,
}

/// Lifecycle of a tailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    Created,
    Running(WatchMode),
    Stopped,
}

/// Tails the active log file of one PostgreSQL log directory.
pub struct Tailer {
    log_dir: PathBuf,
    log_pattern: String,
    config: TailerConfig,
    state: TailerState,
    entries: Receiver<LogEntry>,
    errors: Receiver<TailError>,
    /// Producer ends, held until `start()` hands them to the worker.
    outputs: Option<(DropOldestSender<LogEntry>, DropOldestSender<TailError>)>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Tailer {
    pub fn new(log_dir: impl Into<PathBuf>, log_pattern: impl Into<String>) -> Self {
        Self::with_config(log_dir, log_pattern, TailerConfig::default())
    }

    pub fn with_config(
        log_dir: impl Into<PathBuf>,
        log_pattern: impl Into<String>,
        config: TailerConfig,
    ) -> Self {
        let (entry_tx, entries) = drop_oldest(config.entry_capacity);
        let (error_tx, errors) = drop_oldest(config.error_capacity);
        Self {
            log_dir: log_dir.into(),
            log_pattern: log_pattern.into(),
            config,
            state: TailerState::Created,
            entries,
            errors,
            outputs: Some((entry_tx, error_tx)),
            stop_tx: None,
            worker: None,
        }
    }

    /// Tailer for a discovered instance's log directory and pattern.
    pub fn for_instance(instance: &Instance, config: TailerConfig) -> Self {
        Self::with_config(&instance.log_dir, &instance.log_pattern, config)
    }

    /// Selects the active log file, seeks to its end and starts the worker.
    ///
    /// Fails without starting anything if the directory is missing or
    /// unreadable, or holds no matching file.
    pub fn start(&mut self) -> Result<(), TailError> {
        match self.state {
            TailerState::Created => {}
            TailerState::Running(_) => return Err(TailError::AlreadyStarted),
            TailerState::Stopped => return Err(TailError::Stopped),
        }

        let Selection { path, pattern } = select_log_file(&self.log_dir, &self.log_pattern)?;
        let file = LogFile::open(&path, false)?;
        let Some((entries, errors)) = self.outputs.take() else {
            return Err(TailError::Stopped);
        };

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let worker = Worker {
            dir: self.log_dir.clone(),
            log_pattern: self.log_pattern.clone(),
            pattern,
            file,
            entries,
            errors,
            stop: stop_rx,
        };

        let driver = self.select_driver();
        let mode = driver.mode();
        info!(
            path = %path.display(),
            mode = ?mode,
            "tailing log file"
        );

        let handle = thread::Builder::new()
            .name("pgtail-tailer".to_string())
            .spawn(move || match driver {
                Driver::Event { watcher, events } => worker.run_events(watcher, events),
                Driver::Polling { interval } => worker.run_polling(interval),
            });

        match handle {
            Ok(handle) => {
                self.worker = Some(handle);
                self.stop_tx = Some(stop_tx);
                self.state = TailerState::Running(mode);
                Ok(())
            }
            Err(e) => {
                self.state = TailerState::Stopped;
                Err(TailError::Spawn(e))
            }
        }
    }

    /// Stops the worker and closes both queues. Idempotent.
    ///
    /// Entries already queued remain readable until drained.
    pub fn stop(&mut self) {
        if self.state == TailerState::Stopped {
            return;
        }
        self.state = TailerState::Stopped;

        // Disconnecting the stop channel wakes the worker.
        drop(self.stop_tx.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("tailer worker panicked");
        }
        // Never started: close the queues here.
        drop(self.outputs.take());
        debug!(dir = %self.log_dir.display(), "tailer stopped");
    }

    /// Parsed entries, newest `entry_capacity` retained.
    pub fn entries(&self) -> Receiver<LogEntry> {
        self.entries.clone()
    }

    /// Non-fatal runtime errors, newest `error_capacity` retained.
    pub fn errors(&self) -> Receiver<TailError> {
        self.errors.clone()
    }

    pub fn state(&self) -> TailerState {
        self.state
    }

    /// Active watch mode, if running.
    pub fn mode(&self) -> Option<WatchMode> {
        match self.state {
            TailerState::Running(mode) => Some(mode),
            _ => None,
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn select_driver(&self) -> Driver {
        if self.config.force_polling || !native_notification_supported() {
            return Driver::Polling {
                interval: self.config.poll_interval,
            };
        }

        match build_watcher(&self.log_dir) {
            Ok((watcher, events)) => Driver::Event { watcher, events },
            Err(e) => {
                warn!(error = %e, "native file watching unavailable, polling instead");
                Driver::Polling {
                    interval: self.config.poll_interval,
                }
            }
        }
    }
}

impl Drop for Tailer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Platforms where `notify` uses a kernel facility rather than its own polling.
fn native_notification_supported() -> bool {
    cfg!(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "windows",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly",
    ))
}

type EventRx = Receiver<notify::Result<Event>>;

fn build_watcher(dir: &Path) -> notify::Result<(RecommendedWatcher, EventRx)> {
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let mut watcher = notify::recommended_watcher(move |event| {
        if event_tx.send(event).is_err() {
            trace!("watch event dropped because worker is gone");
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok((watcher, event_rx))
}

enum Driver {
    Event {
        watcher: RecommendedWatcher,
        events: EventRx,
    },
    Polling {
        interval: Duration,
    },
}

impl Driver {
    fn mode(&self) -> WatchMode {
        match self {
            Driver::Event { .. } => WatchMode::Event,
            Driver::Polling { .. } => WatchMode::Polling,
        }
    }
}

/// Background side of a tailer. Owns the file handle exclusively.
struct Worker {
    dir: PathBuf,
    log_pattern: String,
    /// Glob that selected the current file; rotation targets must match it.
    pattern: Pattern,
    file: LogFile,
    entries: DropOldestSender<LogEntry>,
    errors: DropOldestSender<TailError>,
    stop: Receiver<()>,
}

impl Worker {
    fn run_events(mut self, watcher: RecommendedWatcher, events: EventRx) {
        // Dropped when the loop exits, after the stop signal is observed.
        let _watcher = watcher;
        let stop = self.stop.clone();

        self.read_available();
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(events) -> msg => match msg {
                    Ok(Ok(event)) => self.handle_event(event),
                    Ok(Err(e)) => self.report(TailError::Watch(e.to_string())),
                    Err(_) => break,
                },
            }
        }
        debug!("event loop exited");
    }

    fn run_polling(mut self, interval: Duration) {
        let ticker = crossbeam_channel::tick(interval);
        let stop = self.stop.clone();

        self.read_available();
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => self.poll_once(),
            }
        }
        debug!("poll loop exited");
    }

    fn handle_event(&mut self, event: Event) {
        let target = match event.kind {
            EventKind::Create(_) => event.paths.first(),
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
                event.paths.last()
            }
            _ => None,
        };

        if let Some(path) = target
            && self.is_rotation_target(path)
        {
            self.switch_to(path.to_path_buf());
        }
        self.read_available();
    }

    /// A new file in the watched directory that matches the active pattern.
    ///
    /// The current name qualifies too when it now refers to a different file
    /// (moved away and recreated, or renamed over).
    fn is_rotation_target(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        if !self.pattern.matches(&name.to_string_lossy()) || !path.is_file() {
            return false;
        }
        self.file.path.file_name() != path.file_name() || !self.file.is_same_file(path)
    }

    /// Size decrease means truncation or replacement: select again.
    fn poll_once(&mut self) {
        match std::fs::metadata(&self.file.path) {
            Ok(metadata) => {
                let size = metadata.len();
                let previous = std::mem::replace(&mut self.file.last_size, size);
                if size < previous {
                    debug!(
                        path = %self.file.path.display(),
                        previous,
                        size,
                        "log file shrank"
                    );
                    self.rescan();
                }
            }
            // Mid-rotation; the next tick sees the new state.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => self.report(TailError::Read {
                path: self.file.path.clone(),
                source,
            }),
        }
        self.read_available();
    }

    fn rescan(&mut self) {
        let next = match select_log_file(&self.dir, &self.log_pattern) {
            Ok(selection) => {
                self.pattern = selection.pattern;
                selection.path
            }
            Err(e) => {
                // Keep the current pattern; fall back to the newest match for it.
                match newest_in_dir(&self.dir, &self.pattern) {
                    Ok(Some(path)) => path,
                    _ => {
                        self.report(e);
                        return;
                    }
                }
            }
        };
        if next == self.file.path {
            // Truncated in place or replaced under the same name.
            self.reopen();
        } else {
            self.switch_to(next);
        }
    }

    fn reopen(&mut self) {
        match LogFile::open(&self.file.path, true) {
            Ok(file) => {
                debug!(path = %file.path.display(), "log file reopened from start");
                self.file = file;
            }
            Err(e) => self.report(e),
        }
    }

    /// Drains the current file, then reads `path` from its beginning.
    fn switch_to(&mut self, path: PathBuf) {
        self.read_available();
        if let Some(rest) = self.file.take_partial() {
            self.emit(rest);
        }

        match LogFile::open(&path, true) {
            Ok(file) => {
                info!(
                    from = %self.file.path.display(),
                    to = %path.display(),
                    "log file rotated"
                );
                self.file = file;
            }
            Err(e) => self.report(e),
        }
    }

    /// Reads and emits complete lines until EOF or a stop request.
    fn read_available(&mut self) {
        loop {
            let (lines, status) = self.file.read_lines(MAX_LINES_PER_READ);
            for line in lines {
                self.emit(line);
            }
            match status {
                Ok(more) => {
                    if !more || self.stop_requested() {
                        return;
                    }
                }
                Err(source) => {
                    self.report(TailError::Read {
                        path: self.file.path.clone(),
                        source,
                    });
                    return;
                }
            }
        }
    }

    fn emit(&self, line: String) {
        if line.trim().is_empty() {
            return;
        }
        let dropped = self.entries.push(parse_line(&line));
        if dropped > 0 {
            trace!(dropped, "entry queue full, dropped oldest");
        }
    }

    fn report(&self, error: TailError) {
        debug!(error = %error, "tail error");
        self.errors.push(error);
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }
}

/// An open log file with a partial-line buffer.
struct LogFile {
    path: PathBuf,
    reader: BufReader<File>,
    /// Bytes of a line not yet terminated by a newline.
    partial: Vec<u8>,
    /// File size at the last poll check.
    last_size: u64,
}

impl LogFile {
    /// Opens `path` at its start or its end.
    fn open(path: &Path, from_start: bool) -> Result<Self, TailError> {
        let open_err = |source| TailError::Open {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(open_err)?;
        let size = file.metadata().map_err(open_err)?.len();
        if !from_start {
            file.seek(SeekFrom::End(0)).map_err(open_err)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            partial: Vec::new(),
            last_size: size,
        })
    }

    /// Reads up to `max` complete lines. The flag is `true` if more may remain.
    ///
    /// Lines read before an error are returned alongside it.
    fn read_lines(&mut self, max: usize) -> (Vec<String>, io::Result<bool>) {
        if let Err(e) = self.rewind_if_truncated() {
            return (Vec::new(), Err(e));
        }
        read_lines_from(&mut self.reader, &mut self.partial, max)
    }

    /// Whether `path` still names the file behind the open handle.
    #[cfg(unix)]
    fn is_same_file(&self, path: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;

        match (self.reader.get_ref().metadata(), std::fs::metadata(path)) {
            (Ok(open), Ok(named)) => open.dev() == named.dev() && open.ino() == named.ino(),
            _ => false,
        }
    }

    /// Without file identity, a create event for the current name is a new file.
    #[cfg(not(unix))]
    fn is_same_file(&self, _path: &Path) -> bool {
        false
    }

    /// A handle positioned past EOF was truncated in place; restart at 0.
    fn rewind_if_truncated(&mut self) -> io::Result<()> {
        let len = self.reader.get_ref().metadata()?.len();
        let pos = self.reader.stream_position()?;
        if len < pos {
            self.reader.seek(SeekFrom::Start(0))?;
            self.partial.clear();
        }
        Ok(())
    }

    fn take_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.partial)
            .trim_end_matches('\r')
            .to_string();
        self.partial.clear();
        Some(line)
    }
}

/// Splits complete lines off `reader`, keeping an unterminated tail in `partial`.
///
/// Trailing `\n` / `\r\n` are stripped and invalid UTF-8 is replaced.
fn read_lines_from(
    reader: &mut impl BufRead,
    partial: &mut Vec<u8>,
    max: usize,
) -> (Vec<String>, io::Result<bool>) {
    let mut lines = Vec::new();
    loop {
        let n = match reader.read_until(b'\n', partial) {
            Ok(n) => n,
            Err(e) => return (lines, Err(e)),
        };
        if n == 0 || partial.last() != Some(&b'\n') {
            return (lines, Ok(false));
        }

        partial.pop();
        if partial.last() == Some(&b'\r') {
            partial.pop();
        }
        lines.push(String::from_utf8_lossy(&partial[..]).into_owned());
        partial.clear();

        if lines.len() >= max {
            return (lines, Ok(true));
        }
    }
}
