use crate::config::LogLevel;
use crate::error::{RacoderError, Result};
use std::io::IsTerminal;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::ChronoLocal, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Initialize the global tracing subscriber.
///
/// The threshold comes from configuration; `RUST_LOG` overrides it when set.
/// Timestamps are rendered in UTC unless another timezone is configured,
/// in which case local time (as resolved through `TZ`) is used.
pub fn init_logging(level: LogLevel, timezone: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(level)))
        .map_err(|e| RacoderError::LoggingError(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    // Plain output when redirected to a file or a container log
    let layer = fmt::layer().with_ansi(std::io::stdout().is_terminal());

    let initialized = if is_utc(timezone) {
        registry
            .with(layer.with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string())))
            .try_init()
    } else {
        registry
            .with(layer.with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string())))
            .try_init()
    };

    initialized.map_err(|e| RacoderError::LoggingError(e.to_string()))
}

/// Filter directive for our own crate at the configured level, with
/// dependencies kept at `warn` or quieter.
fn filter_directive(level: LogLevel) -> String {
    let deps = std::cmp::min(level, LogLevel::Warn);
    format!("{},racoder={}", deps.as_filter(), level.as_filter())
}

fn is_utc(timezone: &str) -> bool {
    matches!(
        timezone.trim().to_ascii_uppercase().as_str(),
        "UTC" | "ETC/UTC" | "Z" | "GMT" | "ETC/GMT"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_caps_dependencies() {
        assert_eq!(filter_directive(LogLevel::Debug), "warn,racoder=debug");
        assert_eq!(filter_directive(LogLevel::Error), "error,racoder=error");
    }

    #[test]
    fn test_is_utc() {
        assert!(is_utc("UTC"));
        assert!(is_utc("Etc/UTC"));
        assert!(!is_utc("America/New_York"));
    }
}
