use std::io::{self, IsTerminal};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// All crates of the workspace, which receive the configured log level.
///
/// Third-party crates are logged at `INFO` unless `RUST_LOG` says otherwise.
const CRATE_NAMES: &[&str] = &[
    "tripwire_common",
    "tripwire_config",
    "tripwire_dsl",
    "tripwire_log",
    "tripwire_probes",
    "tripwire_runtime",
    "tripwire_sampling",
    "tripwire_snapshot",
];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  tripwire_probes::registry > registered probe
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z  INFO tripwire_probes::registry: registered probe
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2020-12-04T12:11:08.729716Z","level":"INFO","target":"tripwire_probes::registry","message":"registered probe"}
    /// ```
    Json,
}

/// The maximum verbosity of log messages emitted by the workspace crates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Disables all logging.
    Off,
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages and above.
    Info,
    /// Debug messages and above.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for the workspace crates.
    pub level: LogLevel,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE` variable to `full`.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Builds the default filter directives for the configured level.
fn default_directives(level: LogLevel) -> String {
    let mut directives = String::from("info");
    for name in CRATE_NAMES {
        directives.push(',');
        directives.push_str(name);
        directives.push('=');
        directives.push_str(level.as_directive());
    }
    directives
}

/// Initialize the logging system.
///
/// If the `RUST_LOG` environment variable is set, it takes precedence over the configured level.
/// Calling this more than once has no effect.
///
/// # Example
///
/// ```
/// let log_config = tripwire_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// tripwire_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        // SAFETY: Logging is initialized once during startup, before the host spawns threads that
        // could read the environment concurrently.
        unsafe { std::env::set_var("RUST_BACKTRACE", "full") };
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.level)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    let result = match (config.format, io::stderr().is_terminal()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => subscriber.pretty().try_init(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            subscriber.compact().with_ansi(false).try_init()
        }
        (LogFormat::Json, _) => subscriber
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .try_init(),
    };

    if result.is_err() {
        crate::debug!("logging was already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        let directives = default_directives(LogLevel::Debug);
        assert!(directives.starts_with("info,"));
        assert!(directives.contains("tripwire_probes=debug"));
        assert!(directives.contains("tripwire_dsl=debug"));
    }

    #[test]
    fn test_deserialize_config() {
        let config: LogConfig = serde_json::from_str(r#"{"level": "trace", "format": "json"}"#)
            .unwrap();
        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.enable_backtraces);
    }
}
