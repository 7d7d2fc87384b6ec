//! Pluggable logging for the ndt7 client
//!
//! Logging is disabled by default. Callers opt in by registering one or more
//! sinks (console, file, or their own `LogSink` implementation) and flipping
//! the global switch. Every entry carries a timestamp, a level and the
//! session id of the current process.

use chrono::{DateTime, Utc};
use colored::Colorize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, RwLock};
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log record handed to every registered sink
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Timestamp when the entry was created
    pub timestamp: DateTime<Utc>,
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Session id, stable for the lifetime of the process
    pub session_id: Uuid,
}

impl LogEntry {
    /// Render the entry as a single plain-text line
    pub fn to_line(&self) -> String {
        format!(
            "{} [{}] [{}] {}",
            self.timestamp.to_rfc3339(),
            self.level,
            self.session_id,
            self.message
        )
    }
}

/// Destination for log entries
pub trait LogSink: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// Sink writing colored lines to stderr
pub struct ConsoleSink {
    use_color: bool,
}

impl ConsoleSink {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }
}

impl LogSink for ConsoleSink {
    fn log(&self, entry: &LogEntry) {
        let line = entry.to_line();
        if self.use_color {
            let colored_line = match entry.level {
                LogLevel::Debug => line.dimmed(),
                LogLevel::Info => line.normal(),
                LogLevel::Warn => line.yellow(),
                LogLevel::Error => line.red(),
            };
            eprintln!("{}", colored_line);
        } else {
            eprintln!("{}", line);
        }
    }
}

/// Sink appending plain-text lines to a file
pub struct FileSink {
    path: PathBuf,
    file: Mutex<Option<std::fs::File>>,
}

impl FileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// Path this sink appends to
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn log(&self, entry: &LogEntry) {
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if guard.is_none() {
            *guard = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .ok();
        }
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", entry.to_line());
        }
    }
}

struct LoggerState {
    enabled: bool,
    min_level: LogLevel,
    sinks: Vec<Box<dyn LogSink>>,
    session_id: Uuid,
}

fn state() -> &'static RwLock<LoggerState> {
    static STATE: OnceLock<RwLock<LoggerState>> = OnceLock::new();
    STATE.get_or_init(|| {
        RwLock::new(LoggerState {
            enabled: false,
            min_level: LogLevel::Debug,
            sinks: Vec::new(),
            session_id: Uuid::new_v4(),
        })
    })
}

/// Enable or disable logging globally
pub fn set_enabled(enabled: bool) {
    if let Ok(mut state) = state().write() {
        state.enabled = enabled;
    }
}

/// Set the minimum level an entry must have to reach the sinks
pub fn set_min_level(level: LogLevel) {
    if let Ok(mut state) = state().write() {
        state.min_level = level;
    }
}

/// Register an additional sink
pub fn add_sink(sink: Box<dyn LogSink>) {
    if let Ok(mut state) = state().write() {
        state.sinks.push(sink);
    }
}

/// Remove every registered sink
pub fn remove_all_sinks() {
    if let Ok(mut state) = state().write() {
        state.sinks.clear();
    }
}

/// Emit one entry to all sinks, subject to the enable switch and level filter
pub fn log<S: Into<String>>(level: LogLevel, message: S) {
    let Ok(state) = state().read() else { return };
    if !state.enabled || level < state.min_level {
        return;
    }
    let entry = LogEntry {
        timestamp: Utc::now(),
        level,
        message: message.into(),
        session_id: state.session_id,
    };
    for sink in &state.sinks {
        sink.log(&entry);
    }
}

/// Emit a debug-level entry
pub fn debug<S: Into<String>>(message: S) {
    log(LogLevel::Debug, message);
}

/// Emit an info-level entry
pub fn info<S: Into<String>>(message: S) {
    log(LogLevel::Info, message);
}

/// Emit a warn-level entry
pub fn warn<S: Into<String>>(message: S) {
    log(LogLevel::Warn, message);
}

/// Emit an error-level entry
pub fn error<S: Into<String>>(message: S) {
    log(LogLevel::Error, message);
}
