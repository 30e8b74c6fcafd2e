//! Logging setup and stage timing.

use crate::errors::AlarmflowError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, one line per event.
    #[default]
    Pretty,
    /// One JSON object per line with flattened fields.
    Json,
}

impl FromStr for LogFormat {
    type Err = AlarmflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(AlarmflowError::Config(format!("unknown log format '{other}'"))),
        }
    }
}

/// Installs the global subscriber.
///
/// `filter` uses `RUST_LOG` syntax; when `None`, `RUST_LOG` is read and the
/// level defaults to INFO.
pub fn init_tracing(format: LogFormat, filter: Option<&str>) -> Result<(), AlarmflowError> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| AlarmflowError::Config(format!("invalid log filter: {e}")))?,
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    };

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false);

    let result = match format {
        LogFormat::Pretty => builder.compact().try_init(),
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .try_init(),
    };

    result.map_err(|e| AlarmflowError::Config(format!("failed to install tracing subscriber: {e}")))
}

/// Measures how long a stage takes.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: &'static str,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the timer name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Logs the stage duration and item counts, returning the duration.
    pub fn finish(self, items_in: usize, items_out: usize) -> u64 {
        let duration_ms = self.elapsed_ms();
        tracing::info!(
            stage = self.name,
            items_in,
            items_out,
            duration_ms,
            "Stage completed"
        );
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let err = init_tracing(LogFormat::Pretty, Some("alarmflow=verbose")).unwrap_err();
        assert!(matches!(err, AlarmflowError::Config(_)));
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("persister");
        assert_eq!(timer.name(), "persister");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.finish(3, 3) >= 5);
    }
}
