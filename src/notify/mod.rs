//! User-visible status messages
//!
//! The service layer reports what happened through a `NotificationSink`,
//! so the same code can print to a terminal or be observed by tests.

use std::fmt;
use std::sync::Mutex;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Success => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{}", label)
    }
}

/// Receiver of status messages
pub trait NotificationSink: Send + Sync {
    fn notify(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.notify(Level::Info, message);
    }

    fn success(&self, message: &str) {
        self.notify(Level::Success, message);
    }

    fn warning(&self, message: &str) {
        self.notify(Level::Warning, message);
    }
}

/// Prints to the terminal: info and success on stdout, the rest on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink {
    quiet: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only warnings and errors get printed
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

impl NotificationSink for ConsoleSink {
    fn notify(&self, level: Level, message: &str) {
        match level {
            Level::Info | Level::Success if self.quiet => {}
            Level::Info | Level::Success => println!("{}", message),
            Level::Warning | Level::Error => eprintln!("{}: {}", level, message),
        }
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Whether any message at `level` contains `text`
    pub fn contains(&self, level: Level, text: &str) -> bool {
        self.messages()
            .iter()
            .any(|(l, m)| *l == level && m.contains(text))
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, level: Level, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, message.to_string()));
        }
    }
}
