//! Executor configuration from YAML/JSON.
//!
//! ```yaml
//! max_attempts: 3
//! failure_threshold: 5
//! reset_timeout: 30s
//! backoff:
//!   strategy: exponential
//!   base_delay: 1s
//!   max_delay: 1m
//!   jitter: 0.1
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::error::ConfigError;
use crate::policy::RetryPolicy;

/// Serde helpers for durations written as `"250ms"`, `"1m 30s"`.
///
/// Plain numbers are accepted as seconds.
pub mod duration_human {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration such as \"1s\" or a number of seconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            humantime::parse_duration(v).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must not be negative"))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Duration, E> {
            Duration::try_from_secs_f64(v).map_err(E::custom)
        }
    }
}

/// File form of a [`RetryPolicy`]. Missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Invocations per call, including the first
    pub max_attempts: u32,

    /// Consecutive failures before a circuit opens
    pub failure_threshold: u32,

    /// Time an open circuit waits before probing
    #[serde(with = "duration_human")]
    pub reset_timeout: Duration,

    /// Delay between attempts
    pub backoff: BackoffConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        RetryPolicy::default().to_config()
    }
}

impl ExecutorConfig {
    /// Parse and validate YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`, `.yml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            Some("json") => Self::from_json(&content),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Check the values without building a policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        RetryPolicy::try_from(self.clone())?;
        Ok(())
    }

    /// Build the validated policy.
    pub fn into_policy(self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::try_from(self)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
