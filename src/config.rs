use crate::query::publishers::DEFAULT_LIMIT;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration loaded from environment variables or TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// DuckDB database file holding the analytics tables.
    /// If not set, an empty in-memory database is used.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Number of organizations in the top publishers ranking.
    #[serde(default = "default_limit")]
    pub top_publishers_limit: usize,
    /// Number of content records listed on a publisher page.
    #[serde(default = "default_limit")]
    pub publisher_records_limit: usize,
    /// Dashboard origin for CORS restrictions on report routes.
    /// If not set, any origin may read reports.
    #[serde(default)]
    pub dashboard_origin: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

const fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: None,
            top_publishers_limit: default_limit(),
            publisher_records_limit: default_limit(),
            dashboard_origin: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Environment variables override file values:
    /// - `GA_REPORT_HOST` → host
    /// - `GA_REPORT_PORT` → port
    /// - `GA_REPORT_DATABASE` → database_path
    /// - `GA_REPORT_TOP_PUBLISHERS` → top_publishers_limit
    /// - `GA_REPORT_PUBLISHER_RECORDS` → publisher_records_limit
    /// - `GA_REPORT_DASHBOARD_ORIGIN` → dashboard_origin
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut config =
            config_path.map_or_else(Self::default, |path| match std::fs::read_to_string(path) {
                Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file: {e}, using defaults");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!("Failed to read config file: {e}, using defaults");
                    Self::default()
                }
            });

        if let Ok(host) = std::env::var("GA_REPORT_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("GA_REPORT_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }
        if let Ok(path) = std::env::var("GA_REPORT_DATABASE") {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Ok(val) = std::env::var("GA_REPORT_TOP_PUBLISHERS") {
            if let Ok(n) = val.parse() {
                config.top_publishers_limit = n;
            }
        }
        if let Ok(val) = std::env::var("GA_REPORT_PUBLISHER_RECORDS") {
            if let Ok(n) = val.parse() {
                config.publisher_records_limit = n;
            }
        }
        if let Ok(origin) = std::env::var("GA_REPORT_DASHBOARD_ORIGIN") {
            config.dashboard_origin = Some(origin);
        }

        config
    }
}
