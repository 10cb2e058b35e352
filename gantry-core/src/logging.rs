//! Logging configuration for Gantry applications.
//!
//! Structured logging built on `tracing`, defaulting to JSON output on
//! STDOUT. The `GANTRY_LOG` environment variable overrides the configured
//! level with a full `EnvFilter` directive string.
//!
//! # Examples
//!
//! ```no_run
//! use gantry_core::logging::*;
//!
//! let _guard = LogConfig::new()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init();
//!
//! info!("application started");
//! ```

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, writer::BoxMakeWriter},
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

// Re-export the macros so call sites use one import path
pub use tracing::{debug, error, info, trace, warn};

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Output format for log records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON, one record per line
    Json,
    /// Human-readable multi-line output
    Pretty,
    /// Single-line condensed output
    Compact,
}

/// Where log records are written
#[derive(Debug, Clone)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily-rotated file under `directory` with the given `prefix`
    RollingFile {
        directory: String,
        prefix: String,
    },
}

/// Logging configuration builder
#[derive(Debug, Clone)]
pub struct LogConfig {
    level: LogLevel,
    format: LogFormat,
    output: LogOutput,
    with_targets: bool,
    with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            with_targets: true,
            with_ansi: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_targets(mut self, enabled: bool) -> Self {
        self.with_targets = enabled;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// Install the global subscriber.
    ///
    /// Returns a worker guard when logging to a rolling file; the guard must
    /// stay alive for buffered records to be flushed. Calling `init` twice
    /// leaves the first subscriber in place.
    pub fn init(self) -> Option<WorkerGuard> {
        let filter = EnvFilter::try_from_env("GANTRY_LOG")
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()));

        let (writer, guard): (BoxMakeWriter, Option<WorkerGuard>) = match &self.output {
            LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), None),
            LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), None),
            LogOutput::RollingFile { directory, prefix } => {
                let appender = tracing_appender::rolling::daily(directory, prefix);
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                (BoxMakeWriter::new(non_blocking), Some(guard))
            }
        };

        let base = fmt::layer()
            .with_writer(writer)
            .with_target(self.with_targets)
            .with_ansi(self.with_ansi);

        let layer = match self.format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
        };

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init();

        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_conversion() {
        assert_eq!(LogLevel::Debug.to_tracing_level(), Level::DEBUG);
        assert_eq!(LogLevel::Error.as_str(), "error");
    }

    #[test]
    fn test_builder_defaults() {
        let config = LogConfig::new();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_init_is_idempotent() {
        let first = LogConfig::new().init();
        let second = LogConfig::new().level(LogLevel::Trace).init();
        assert!(first.is_none());
        assert!(second.is_none());
    }
}
