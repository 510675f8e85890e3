//! Harness configuration loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid configuration.
//!
//! ```toml
//! host = "127.0.0.1"
//! port = 8080
//! default_timeout_ms = 10000
//! concurrency = 10
//!
//! [server]
//! executable = "./webserv"
//! config = "conf/default.conf"
//!
//! [thresholds]
//! stress = 0.8
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use derive_more::From;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::descriptor::Category;
use crate::lifecycle::ReadinessPolicy;
use crate::registry::RegistryOptions;
use crate::report::{Aggregator, Thresholds, DEFAULT_DEGRADED_FLOOR, DEFAULT_FAILURE_CAP};
use crate::target::Target;

#[derive(Debug, From)]
pub enum ConfigError {
    #[from(ignore)]
    IOError(std::io::Error),

    #[from(ignore)]
    DeserializationFailed(toml::de::Error),

    #[from(ignore)]
    UnknownCategory(String),

    #[from(ignore)]
    InvalidThreshold { category: String, value: f64 },

    /// A server executable was given without a configuration file for it.
    #[from(ignore)]
    MissingServerConfig(PathBuf),
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::DeserializationFailed(value)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Reads and deserializes a TOML file.
///
/// # Errors
///
/// Fails when the file cannot be read or does not match `T`.
pub fn from_path<T, V>(target: V) -> ConfigResult<T>
where
    T: DeserializeOwned,
    V: Into<PathBuf>,
{
    let target_path = target.into();
    let config_content = std::fs::read_to_string(target_path)?;
    let config_obj: T = toml::from_str(&config_content)?;
    Ok(config_obj)
}

/// Readiness polling settings for the server under test.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "probe_timeout_ms")]
    pub probe_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "interval_ms")]
    pub interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "startup_timeout_ms")]
    pub startup_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "settle_ms")]
    pub settle: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        let policy = ReadinessPolicy::new();
        Self {
            probe_timeout: policy.get_probe_timeout(),
            interval: policy.get_interval(),
            startup_timeout: policy.get_startup_timeout(),
            settle: policy.get_settle(),
        }
    }
}

/// How to launch the server under test. Absent means attach to a running server.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub executable: PathBuf,
    pub config: PathBuf,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "grace_period_ms", default = "default_grace_period")]
    pub grace_period: Duration,
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub host: String,
    pub port: u16,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "default_timeout_ms")]
    pub default_timeout: Duration,
    pub concurrency: usize,
    pub failure_cap: usize,
    pub degraded_floor: f64,
    pub host_header: String,
    pub readiness: ReadinessConfig,
    pub server: Option<ServerConfig>,
    pub thresholds: BTreeMap<String, f64>,
    pub only: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            default_timeout: Duration::from_secs(10),
            concurrency: 10,
            failure_cap: DEFAULT_FAILURE_CAP,
            degraded_floor: DEFAULT_DEGRADED_FLOOR,
            host_header: "localhost".to_owned(),
            readiness: ReadinessConfig::default(),
            server: None,
            thresholds: BTreeMap::new(),
            only: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// See [`from_path`].
    pub fn load<V: Into<PathBuf>>(path: V) -> ConfigResult<Self> {
        from_path(path)
    }

    #[must_use]
    pub fn target(&self) -> Target {
        Target::new(self.host.clone(), self.port)
    }

    #[must_use]
    pub const fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new()
            .probe_timeout(self.readiness.probe_timeout)
            .interval(self.readiness.interval)
            .startup_timeout(self.readiness.startup_timeout)
            .settle(self.readiness.settle)
    }

    /// Built-in thresholds overridden by the `[thresholds]` table.
    ///
    /// # Errors
    ///
    /// Unknown category names and rates outside `0.0..=1.0` are rejected.
    pub fn thresholds(&self) -> ConfigResult<Thresholds> {
        let mut thresholds = Thresholds::default();
        for (name, value) in &self.thresholds {
            let category = parse_category(name)?;
            if !(0.0..=1.0).contains(value) {
                return Err(ConfigError::InvalidThreshold {
                    category: name.clone(),
                    value: *value,
                });
            }
            thresholds = thresholds.with(category, *value);
        }
        Ok(thresholds)
    }

    /// The categories named in `only`, empty meaning all.
    ///
    /// # Errors
    ///
    /// Unknown category names are rejected.
    pub fn only_categories(&self) -> ConfigResult<Vec<Category>> {
        self.only.iter().map(|name| parse_category(name)).collect()
    }

    /// # Errors
    ///
    /// See [`Self::thresholds`].
    pub fn aggregator(&self) -> ConfigResult<Aggregator> {
        Ok(Aggregator::new(self.thresholds()?)
            .failure_cap(self.failure_cap)
            .degraded_floor(self.degraded_floor))
    }

    /// # Errors
    ///
    /// See [`Self::only_categories`].
    pub fn registry_options(&self) -> ConfigResult<RegistryOptions> {
        Ok(RegistryOptions::new()
            .host_header(self.host_header.clone())
            .concurrency(self.concurrency)
            .only(self.only_categories()?))
    }
}

fn parse_category(name: &str) -> ConfigResult<Category> {
    name.parse()
        .map_err(|_| ConfigError::UnknownCategory(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_is_all_defaults() {
        let config: HarnessConfig = toml::from_str("").unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.target(), Target::new("127.0.0.1", 8080));
        assert!(config.server.is_none());
        assert_eq!(config.readiness_policy().get_interval(), Duration::from_millis(500));
    }

    #[test]
    fn loads_a_full_document_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
host = "localhost"
port = 9090
default_timeout_ms = 2500
only = ["stress", "malformed"]

[readiness]
interval_ms = 100

[server]
executable = "./webserv"
config = "conf/test.conf"

[thresholds]
stress = 0.8
"#
        )
        .unwrap();

        let config = HarnessConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.default_timeout, Duration::from_millis(2500));
        assert_eq!(config.readiness.interval, Duration::from_millis(100));
        assert_eq!(config.readiness.startup_timeout, Duration::from_secs(10));

        let server = config.server.clone().unwrap();
        assert_eq!(server.executable, PathBuf::from("./webserv"));
        assert_eq!(server.grace_period, Duration::from_secs(5));

        let thresholds = config.thresholds().unwrap();
        assert!((thresholds.for_category(Category::Stress) - 0.8).abs() < f64::EPSILON);
        assert!((thresholds.for_category(Category::Timeout) - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.only_categories().unwrap(), [Category::Stress, Category::Malformed]);
    }

    #[test]
    fn bad_threshold_tables_are_rejected() {
        let unknown: HarnessConfig = toml::from_str("[thresholds]\nspeed = 0.5").unwrap();
        assert!(matches!(unknown.thresholds(), Err(ConfigError::UnknownCategory(name)) if name == "speed"));

        let out_of_range: HarnessConfig = toml::from_str("[thresholds]\nstress = 1.5").unwrap();
        assert!(matches!(out_of_range.thresholds(), Err(ConfigError::InvalidThreshold { .. })));
    }

    #[test]
    fn missing_file_and_bad_syntax_are_errors() {
        assert!(matches!(
            HarnessConfig::load("/definitely/not/here.toml"),
            Err(ConfigError::IOError(_))
        ));
        assert!(matches!(
            toml::from_str::<HarnessConfig>("port = \"eighty\"").map_err(ConfigError::from),
            Err(ConfigError::DeserializationFailed(_))
        ));
    }
}
