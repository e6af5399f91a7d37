// Where the driver reports what it is doing

use std::sync::Mutex;
use log::Level;

/// Sink for driver diagnostics. The driver owns one and never logs through globals
/// directly, so a test can swap in a [`MemorySink`] and inspect what was said.
pub trait Diagnostics {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Forwards to the `log` facade under a fixed target.
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    target: &'static str,
}

impl LogSink {
    pub fn new(target: &'static str) -> Self {
        LogSink { target }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        LogSink::new("DistBcl2Qseq")
    }
}

impl Diagnostics for LogSink {
    fn debug(&self, msg: &str) {
        log::debug!(target: self.target, "{}", msg);
    }

    fn info(&self, msg: &str) {
        log::info!(target: self.target, "{}", msg);
    }

    fn error(&self, msg: &str) {
        log::error!(target: self.target, "{}", msg);
    }
}

/// Keeps every message in memory, in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any message at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle))
    }

    fn push(&self, level: Level, msg: &str) {
        let mut guard = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((level, msg.to_string()));
    }
}

impl Diagnostics for MemorySink {
    fn debug(&self, msg: &str) {
        self.push(Level::Debug, msg);
    }

    fn info(&self, msg: &str) {
        self.push(Level::Info, msg);
    }

    fn error(&self, msg: &str) {
        self.push(Level::Error, msg);
    }
}

impl<D: Diagnostics + ?Sized> Diagnostics for &D {
    fn debug(&self, msg: &str) {
        (**self).debug(msg);
    }

    fn info(&self, msg: &str) {
        (**self).info(msg);
    }

    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
}
