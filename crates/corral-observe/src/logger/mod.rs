mod config;
mod error;
mod format;
mod install;
mod level;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;
pub use level::LoggerLevel;

/// Install the global `tracing` subscriber described by `cfg`.
///
/// Everything is written to stderr (or journald), so a launched container's
/// stdout stays free for the job itself.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    install::install(cfg)
}
