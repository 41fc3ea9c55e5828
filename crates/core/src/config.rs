// Process configuration (environment-driven)

use crate::domain::Namespace;
use crate::error::{AppError, Result};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_STORE_URL: &str = "FEEDQ_REDIS_URL";
pub const ENV_NAMESPACE: &str = "FEEDQ_NAMESPACE";
pub const ENV_LOG_FORMAT: &str = "FEEDQ_LOG_FORMAT";
pub const ENV_FETCH_INTERVAL: &str = "FEEDQ_FETCH_INTERVAL";

pub const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379";

/// Minutes between fetch rounds
pub const DEFAULT_FETCH_INTERVAL_MINUTES: u64 = 15;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!(
                "unknown log format '{}' (expected pretty or json)",
                other
            ))),
        }
    }
}

/// Settings shared by producers, workers and listeners
#[derive(Debug, Clone)]
pub struct Settings {
    pub store_url: String,
    pub namespace: Namespace,
    pub log_format: LogFormat,
    pub fetch_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_url: DEFAULT_STORE_URL.to_string(),
            namespace: Namespace::default(),
            log_format: LogFormat::default(),
            fetch_interval: Duration::from_secs(DEFAULT_FETCH_INTERVAL_MINUTES * 60),
        }
    }
}

impl Settings {
    /// Load from process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup (unset keys fall back to defaults)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(url) = lookup(ENV_STORE_URL) {
            settings.store_url = url;
        }

        if let Some(ns) = lookup(ENV_NAMESPACE) {
            settings.namespace = Namespace::new(ns)?;
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            settings.log_format = format.parse()?;
        }

        if let Some(minutes) = lookup(ENV_FETCH_INTERVAL) {
            let minutes: u64 = minutes.trim().parse().map_err(|_| {
                AppError::Config(format!("{} must be an integer, got '{}'", ENV_FETCH_INTERVAL, minutes))
            })?;
            if minutes == 0 {
                return Err(AppError::Config(format!("{} must be positive", ENV_FETCH_INTERVAL)));
            }
            settings.fetch_interval = Duration::from_secs(minutes * 60);
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.store_url, DEFAULT_STORE_URL);
        assert_eq!(settings.namespace.as_str(), "feedq:");
        assert_eq!(settings.log_format, LogFormat::Pretty);
        assert_eq!(settings.fetch_interval, Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (ENV_STORE_URL, "redis://cache:6380"),
            (ENV_NAMESPACE, "staging:"),
            (ENV_LOG_FORMAT, "JSON"),
            (ENV_FETCH_INTERVAL, "5"),
        ]))
        .unwrap();
        assert_eq!(settings.store_url, "redis://cache:6380");
        assert_eq!(settings.namespace.key("jobs"), "staging:jobs");
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.fetch_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_values() {
        for pairs in [
            [(ENV_LOG_FORMAT, "xml")],
            [(ENV_FETCH_INTERVAL, "soon")],
            [(ENV_FETCH_INTERVAL, "0")],
            [(ENV_NAMESPACE, "")],
        ] {
            let result = Settings::from_lookup(lookup(&pairs));
            assert!(matches!(result, Err(AppError::Config(_))));
        }
    }
}
