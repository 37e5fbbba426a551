use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::tf_error::ConfigError;

const DEFAULT_EDGE_RETENTION_SECONDS: u64 = 10;
const DEFAULT_TIMEOUT_SECONDS: u64 = 1;

/// Tuning knobs of a [`TfBuffer`](crate::TfBuffer).
///
/// In toml every duration is given in (fractional) seconds and every key is optional:
///
/// ```toml
/// edge_retention_duration = 10.0
/// reorder_tolerance = 0.05
/// default_timeout = 1.0
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TfBufferConfigFile")]
pub struct TfBufferConfig {
    /// How much history is kept per edge, measured back from its newest sample.
    pub edge_retention_duration: Duration,
    /// How far behind the newest sample of an edge a late transform is still accepted.
    pub reorder_tolerance: Duration,
    /// Applied when a lookup is made without an explicit timeout.
    pub default_timeout: Duration,
}

impl Default for TfBufferConfig {
    fn default() -> Self {
        Self {
            edge_retention_duration: Duration::from_secs(DEFAULT_EDGE_RETENTION_SECONDS),
            reorder_tolerance: Duration::ZERO,
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

impl TfBufferConfig {
    pub fn with_edge_retention_duration(mut self, duration: Duration) -> Self {
        self.edge_retention_duration = duration;
        self
    }

    pub fn with_reorder_tolerance(mut self, tolerance: Duration) -> Self {
        self.reorder_tolerance = tolerance;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: TfBufferConfigFile = toml::from_str(contents)?;
        file.try_into()
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(path.to_path_buf(), err))?;
        Self::from_toml_str(&contents)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TfBufferConfigFile {
    edge_retention_duration: f64,
    reorder_tolerance: f64,
    default_timeout: f64,
}

impl Default for TfBufferConfigFile {
    fn default() -> Self {
        let config = TfBufferConfig::default();
        Self {
            edge_retention_duration: config.edge_retention_duration.as_secs_f64(),
            reorder_tolerance: config.reorder_tolerance.as_secs_f64(),
            default_timeout: config.default_timeout.as_secs_f64(),
        }
    }
}

fn seconds(key: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|err| ConfigError::Invalid(key, err.to_string()))
}

impl TryFrom<TfBufferConfigFile> for TfBufferConfig {
    type Error = ConfigError;

    fn try_from(file: TfBufferConfigFile) -> Result<Self, Self::Error> {
        Ok(Self {
            edge_retention_duration: seconds(
                "edge_retention_duration",
                file.edge_retention_duration,
            )?,
            reorder_tolerance: seconds("reorder_tolerance", file.reorder_tolerance)?,
            default_timeout: seconds("default_timeout", file.default_timeout)?,
        })
    }
}
