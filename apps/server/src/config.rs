//! Application configuration.

use pivotbot_alerts::MonitorConfig;
use pivotbot_engine::{DetectorConfig, DEFAULT_DIVERGENCE_LOOKBACK, DEFAULT_EPSILON};
use pivotbot_feeds::DEFAULT_BINANCE_ENDPOINTS;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// BTC monitor settings.
    pub btc: MonitorSettings,
    /// Multi-symbol (watch list) monitor settings.
    pub valerts: MonitorSettings,
    /// Kline hosts, tried in order.
    pub binance_endpoints: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            btc: MonitorSettings::default(),
            valerts: MonitorSettings::default(),
            binance_endpoints: DEFAULT_BINANCE_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Per-monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Whether this monitor runs.
    pub enabled: bool,
    /// Kline interval; one pivot session per candle.
    pub interval: String,
    /// Candles fetched per poll.
    pub candle_limit: u32,
    /// Seconds between iterations.
    pub poll_interval_secs: u64,
    /// Breach margin as a fraction of the level price.
    pub epsilon: f64,
    pub divergence_lookback: usize,
    /// Per-request timeout for the kline fetcher.
    pub request_timeout_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: "1d".to_string(),
            candle_limit: 250,
            poll_interval_secs: 60,
            epsilon: DEFAULT_EPSILON,
            divergence_lookback: DEFAULT_DIVERGENCE_LOOKBACK,
            request_timeout_secs: 10,
        }
    }
}

impl MonitorSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn to_monitor_config(&self, name: &str) -> MonitorConfig {
        MonitorConfig {
            name: name.to_string(),
            interval: self.interval.clone(),
            candle_limit: self.candle_limit,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            detector: DetectorConfig {
                epsilon: self.epsilon,
            },
            divergence_lookback: self.divergence_lookback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let raw = r#"{
            "valerts": { "enabled": false, "interval": "4h" },
            "binance_endpoints": ["https://example.test"]
        }"#;
        let config = AppConfig::from_json(raw).unwrap();

        assert_eq!(config.btc, MonitorSettings::default());
        assert!(!config.valerts.enabled);
        assert_eq!(config.valerts.interval, "4h");
        assert_eq!(config.valerts.candle_limit, 250);
        assert_eq!(config.binance_endpoints, vec!["https://example.test"]);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(AppConfig::load(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, b"{ \"btc\": ").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_monitor_config_conversion() {
        let settings = MonitorSettings {
            poll_interval_secs: 30,
            epsilon: 0.002,
            ..Default::default()
        };
        let config = settings.to_monitor_config("valerts");

        assert_eq!(config.name, "valerts");
        assert_eq!(config.interval, "1d");
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.detector.epsilon, 0.002);
        assert_eq!(config.divergence_lookback, DEFAULT_DIVERGENCE_LOOKBACK);
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.btc.enabled);
        assert_eq!(config.btc.epsilon, 0.001);
        assert_eq!(config.btc.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.binance_endpoints.len(), DEFAULT_BINANCE_ENDPOINTS.len());
    }
}
