use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan, time::OffsetTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// One registry, with only the layer matching `cfg.format` switched on.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    if !cfg.format.is_available() {
        return Err(LoggerError::JournaldUnavailable);
    }
    let filter = EnvFilter::try_new(cfg.level.as_str()).map_err(|e| LoggerError::InvalidLevel {
        directive: cfg.level.to_string(),
        reason: e.to_string(),
    })?;
    let spans = if cfg.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let text = (cfg.format == LoggerFormat::Text).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_span_events(spans.clone())
            .with_timer(timer())
    });
    let json = (cfg.format == LoggerFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_span_events(spans.clone())
            .with_timer(timer())
    });

    #[cfg(all(target_os = "linux", feature = "journald"))]
    let journald = match cfg.format {
        LoggerFormat::Journald => Some(
            tracing_journald::layer()
                .map_err(|e| LoggerError::Init(format!("journald: {e}")))?,
        ),
        _ => None,
    };
    #[cfg(not(all(target_os = "linux", feature = "journald")))]
    let journald: Option<tracing_subscriber::layer::Identity> = None;

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(journald)
        .try_init()
        .map_err(init_error)
}

fn timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn init_error(e: TryInitError) -> LoggerError {
    let msg = e.to_string();
    if msg.contains("global default") || msg.contains("already") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::Init(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::level::LoggerLevel;

    // The global subscriber can be set once per process, so every install
    // attempt lives in this single test.
    #[test]
    fn second_install_is_rejected() {
        let cfg = LoggerConfig {
            level: LoggerLevel::new("warn").unwrap(),
            use_color: false,
            ..Default::default()
        };
        install(&cfg).unwrap();
        assert!(matches!(
            install(&cfg),
            Err(LoggerError::AlreadyInitialized)
        ));
    }
}
