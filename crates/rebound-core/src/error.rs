//! Error types for policy and configuration handling.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Invalid retry or backoff parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("failure_threshold must be at least 1")]
    ZeroThreshold,

    #[error("base_delay must be positive")]
    ZeroBaseDelay,

    #[error("max_delay ({max:?}) must not be below base_delay ({base:?})")]
    MaxBelowBase { base: Duration, max: Duration },

    #[error("jitter must be in [0, 1), got {0}")]
    JitterOutOfRange(f64),

    #[error("Unknown backoff strategy: {0}")]
    UnknownStrategy(String),
}

/// Errors that can occur when loading an executor config.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(#[from] PolicyError),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// How serious a resilience failure is.
///
/// Ordered from least to most severe so callers can filter with `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected while a dependency is degraded (fail-fast, cancellation)
    Warning,
    /// The call failed after doing everything the policy allowed
    Error,
    /// The call tripped a circuit
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert_eq!(Severity::Critical.to_string(), "critical");
    }
}
