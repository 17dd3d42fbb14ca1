//! Server configuration

use anyhow::Result;
use serde::Deserialize;

/// Server configuration, overridable via `TOPOLENS_`-prefixed environment
/// variables (`TOPOLENS_API_PORT`, `TOPOLENS_FIXTURE_PATH`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Path to the recorded cluster snapshot the fixture provider serves
    #[serde(default = "default_fixture_path")]
    pub fixture_path: String,

    /// Reasoning loop tick interval in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Context buffer retention window in hours
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,

    /// Hard cap on buffered snapshots
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,

    /// Lookback window for restart-loop analysis in hours
    #[serde(default = "default_restart_lookback_hours")]
    pub restart_lookback_hours: i64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_fixture_path() -> String {
    "fixtures/cluster.json".to_string()
}

fn default_tick_interval() -> u64 {
    30
}

fn default_retention_hours() -> i64 {
    24
}

fn default_max_snapshots() -> usize {
    1000
}

fn default_restart_lookback_hours() -> i64 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            fixture_path: default_fixture_path(),
            tick_interval_secs: default_tick_interval(),
            retention_hours: default_retention_hours(),
            max_snapshots: default_max_snapshots(),
            restart_lookback_hours: default_restart_lookback_hours(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("TOPOLENS"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.tick_interval_secs, 30);
        assert_eq!(config.retention_hours, 24);
        assert_eq!(config.max_snapshots, 1000);
    }
}
