use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Which device channel the coordinator speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Mqtt,
    Socket,
}

/// Runtime configuration, loaded from an optional YAML file with defaults
/// for local development.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub database_url: String,
    pub transport: TransportKind,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub socket_addr: String,
    pub result_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            database_url: "sqlite:activity_coordinator.db".to_string(),
            transport: TransportKind::Mqtt,
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            socket_addr: "127.0.0.1:5000".to_string(),
            result_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load the configuration file named by `COORDINATOR_CONFIG` (default
    /// `coordinator.yaml`), falling back to defaults when it does not
    /// exist. `DATABASE_URL` and `MQTT_HOST` override the file.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("COORDINATOR_CONFIG").unwrap_or_else(|_| "coordinator.yaml".to_string());
        let mut config = Self::load_from(Path::new(&path))?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(host) = std::env::var("MQTT_HOST") {
            config.mqtt_host = host;
        }
        Ok(config)
    }

    /// Load from a specific path; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.result_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.yaml");
        std::fs::write(&path, "transport: socket\nsocket_addr: \"10.0.0.7:5000\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.transport, TransportKind::Socket);
        assert_eq!(config.socket_addr, "10.0.0.7:5000");
        // untouched fields keep their defaults
        assert_eq!(config.mqtt_port, 1883);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.yaml");
        std::fs::write(&path, "transport: [not, a, scalar]\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
