//! Severity allow-list.

use super::level::LogLevel;
use super::parser::LogEntry;

/// Set of allowed levels. The empty set means "allow everything".
///
/// Not synchronized; owned by one tailing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filter {
    mask: u16,
}

impl Filter {
    /// An allow-all filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the allowed set. Passing no levels restores allow-all.
    pub fn set(&mut self, levels: impl IntoIterator<Item = LogLevel>) {
        self.mask = levels.into_iter().fold(0, |mask, level| mask | level.bit());
    }

    /// Allows `min` and every level above it in PostgreSQL order.
    pub fn set_min_level(&mut self, min: LogLevel) {
        self.set(LogLevel::ALL.into_iter().filter(|level| *level >= min));
    }

    /// Restores allow-all.
    pub fn clear(&mut self) {
        self.mask = 0;
    }

    /// `true` when no explicit levels are set.
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    pub fn allow(&self, level: LogLevel) -> bool {
        self.mask == 0 || self.mask & level.bit() != 0
    }

    /// Explicitly allowed levels, lowest first. Empty for allow-all.
    pub fn levels(&self) -> Vec<LogLevel> {
        LogLevel::ALL
            .into_iter()
            .filter(|level| self.mask & level.bit() != 0)
            .collect()
    }
}

/// Applies a `Filter` to a stream of entries.
///
/// Continuation lines carry no level of their own; they follow the
/// decision made for the most recent primary entry.
#[derive(Debug, Clone)]
pub struct EntryGate {
    filter: Filter,
    last_allowed: bool,
}

impl Default for EntryGate {
    fn default() -> Self {
        Self::new(Filter::new())
    }
}

impl EntryGate {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            last_allowed: true,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut Filter {
        &mut self.filter
    }

    /// Returns `true` if `entry` should reach the consumer.
    pub fn admit(&mut self, entry: &LogEntry) -> bool {
        if entry.is_continuation {
            return self.last_allowed;
        }
        self.last_allowed = self.filter.allow(entry.level);
        self.last_allowed
    }
}
