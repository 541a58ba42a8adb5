use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tripwire_dsl::MAX_MESSAGE_LENGTH;
use tripwire_log::LogConfig;
use tripwire_sampling::{
    DEFAULT_GLOBAL_SNAPSHOTS_PER_SECOND, DEFAULT_LOGS_PER_SECOND, DEFAULT_SNAPSHOTS_PER_SECOND,
};
use tripwire_snapshot::CaptureLimits;

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error in the value of a specific field.
    Field(&'static str),
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    inner: Option<Box<dyn Error + Send + Sync>>,
}

impl ConfigError {
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            inner: None,
        }
    }

    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            inner: Some(Box::new(inner)),
            ..Self::new(kind)
        }
    }

    fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(path.as_ref().to_path_buf());
        self
    }

    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::Field(name);
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => write!(f, "{}", self.kind),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::Field(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self.inner {
            Some(ref inner) => Some(inner.as_ref()),
            None => None,
        }
    }
}

enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yml",
            ConfigFormat::Json => "json",
        }
    }

    fn parse<T: DeserializeOwned>(&self, reader: impl io::Read) -> Result<T, ConfigError> {
        match self {
            ConfigFormat::Yaml => serde_yaml::from_reader(reader)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml)),
            ConfigFormat::Json => serde_json::from_reader(reader)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadJson)),
        }
    }
}

/// Rate limits applied to probes.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Maximum number of snapshots per second across all probes capturing snapshots.
    pub global_snapshots_per_second: u32,
    /// Rate of probes capturing snapshots that do not configure their own rate.
    pub default_snapshots_per_second: f64,
    /// Rate of probes only logging a message that do not configure their own rate.
    pub default_logs_per_second: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            global_snapshots_per_second: DEFAULT_GLOBAL_SNAPSHOTS_PER_SECOND,
            default_snapshots_per_second: DEFAULT_SNAPSHOTS_PER_SECOND,
            default_logs_per_second: DEFAULT_LOGS_PER_SECOND,
        }
    }
}

/// Default capture limits of probes that do not configure their own.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// How many levels of nested objects are captured.
    pub max_reference_depth: usize,
    /// Maximum number of elements or entries captured per collection.
    pub max_collection_size: usize,
    /// Maximum number of fields captured per object.
    pub max_field_count: usize,
    /// Maximum number of characters captured per string.
    pub max_length: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let limits = CaptureLimits::default();
        Self {
            max_reference_depth: limits.max_reference_depth,
            max_collection_size: limits.max_collection_size,
            max_field_count: limits.max_field_count,
            max_length: limits.max_length,
        }
    }
}

/// Settings of evaluated probe messages.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Maximum number of characters of a message before it is truncated.
    pub max_length: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_length: MAX_MESSAGE_LENGTH,
        }
    }
}

/// The raw values of the configuration file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigValues {
    /// Logging settings.
    pub logging: LogConfig,
    /// Rate limits.
    pub sampling: SamplingConfig,
    /// Default capture limits.
    pub capture: CaptureConfig,
    /// Message settings.
    pub message: MessageConfig,
}

impl ConfigValues {
    fn validate(self) -> Result<Self, ConfigError> {
        let sampling = &self.sampling;

        if sampling.global_snapshots_per_second == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue)
                .field("sampling.global_snapshots_per_second"));
        }

        if !is_positive_rate(sampling.default_snapshots_per_second) {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue)
                .field("sampling.default_snapshots_per_second"));
        }

        if !is_positive_rate(sampling.default_logs_per_second) {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue)
                .field("sampling.default_logs_per_second"));
        }

        Ok(self)
    }
}

fn is_positive_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Configuration of the probe engine.
#[derive(Clone, Debug, Default)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// The base name of configuration files.
    const FILE_NAME: &'static str = "config";

    /// Loads the configuration from a config folder.
    ///
    /// Reads `config.yml` if it exists, otherwise `config.json`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref().to_path_buf();

        let yaml = path.join(format!("{}.{}", Self::FILE_NAME, ConfigFormat::Yaml.extension()));
        let json = path.join(format!("{}.{}", Self::FILE_NAME, ConfigFormat::Json.extension()));

        let (file, format) = if yaml.exists() || !json.exists() {
            (yaml, ConfigFormat::Yaml)
        } else {
            (json, ConfigFormat::Json)
        };

        let reader = fs::File::open(&file)
            .map(io::BufReader::new)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&file))?;

        let values = format
            .parse::<ConfigValues>(reader)
            .map_err(|e| e.file(&file))?
            .validate()
            .map_err(|e| match e.source {
                ConfigErrorSource::Field(_) => e,
                _ => e.file(&file),
            })?;

        Ok(Config { values, path })
    }

    /// Creates a configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
        let values: ConfigValues = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml))?;

        Ok(Config {
            values: values.validate()?,
            path: PathBuf::new(),
        })
    }

    /// Creates a configuration from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let values: ConfigValues = serde_json::from_value(value)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadJson))?;

        Ok(Config {
            values: values.validate()?,
            path: PathBuf::new(),
        })
    }

    /// The folder the configuration was loaded from, empty if it was not loaded from a file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the raw configuration values.
    pub fn values(&self) -> &ConfigValues {
        &self.values
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Maximum number of snapshots per second across all probes.
    pub fn global_snapshots_per_second(&self) -> u32 {
        self.values.sampling.global_snapshots_per_second
    }

    /// The rate of a probe without an explicit sampling rate.
    pub fn default_rate(&self, captures_snapshot: bool) -> f64 {
        if captures_snapshot {
            self.values.sampling.default_snapshots_per_second
        } else {
            self.values.sampling.default_logs_per_second
        }
    }

    /// Capture limits of probes without explicit limits.
    pub fn capture_limits(&self) -> CaptureLimits {
        let capture = &self.values.capture;
        CaptureLimits {
            max_reference_depth: capture.max_reference_depth,
            max_collection_size: capture.max_collection_size,
            max_field_count: capture.max_field_count,
            max_length: capture.max_length,
        }
    }

    /// Maximum number of characters of an evaluated message.
    pub fn max_message_length(&self) -> usize {
        self.values.message.max_length
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;
    use similar_asserts::assert_eq;
    use tripwire_log::{LogFormat, LogLevel};

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.global_snapshots_per_second(), 25);
        assert_eq!(config.default_rate(true), 1.0);
        assert_eq!(config.default_rate(false), 5000.0);
        assert_eq!(config.capture_limits(), CaptureLimits::default());
        assert_eq!(config.max_message_length(), 8192);
        assert_eq!(config.logging().level, LogLevel::Info);
    }

    #[test]
    fn test_from_yaml_str() {
        let config = Config::from_yaml_str(
            r#"
logging:
  level: debug
  format: json
sampling:
  global_snapshots_per_second: 2
capture:
  max_reference_depth: 1
"#,
        )
        .unwrap();

        assert_eq!(config.logging().level, LogLevel::Debug);
        assert_eq!(config.logging().format, LogFormat::Json);
        assert_eq!(config.global_snapshots_per_second(), 2);
        assert_eq!(config.default_rate(true), 1.0);
        assert_eq!(config.capture_limits().max_reference_depth, 1);
        assert_eq!(config.capture_limits().max_length, 255);
    }

    #[test]
    fn test_from_path_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("config.yml")).unwrap();
        writeln!(file, "message:\n  max_length: 100").unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.max_message_length(), 100);
        assert_eq!(config.path(), dir.path());
    }

    #[test]
    fn test_from_path_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"sampling": {"default_logs_per_second": 10}}"#,
        )
        .unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.default_rate(false), 10.0);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(error.source().is_some());
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), "sampling: [").unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
        assert!(error.to_string().starts_with("could not parse yaml config file (file "));
    }

    #[test]
    fn test_invalid_values() {
        let error = Config::from_json_value(json!({
            "sampling": {"global_snapshots_per_second": 0}
        }))
        .unwrap_err();
        insta::assert_snapshot!(
            error,
            @"invalid config value (field sampling.global_snapshots_per_second)"
        );

        let error = Config::from_json_value(json!({
            "sampling": {"default_snapshots_per_second": -1.0}
        }))
        .unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
    }
}
