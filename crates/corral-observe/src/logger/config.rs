use std::io::IsTerminal;

use crate::logger::{format::LoggerFormat, level::LoggerLevel};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: LoggerLevel,
    pub with_targets: bool,
    /// ANSI colors; only honoured by the text format.
    pub use_color: bool,
    /// Also log span open/close, e.g. around each supervisor poll.
    pub span_events: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: LoggerLevel::default(),
            with_targets: true,
            use_color: std::io::stderr().is_terminal(),
            span_events: false,
        }
    }
}
