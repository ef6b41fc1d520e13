//! Environment configuration

use std::env;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// In-memory storage when unset.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Events are not published when unset.
    pub nats_url: Option<String>,
    pub default_currency: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
            database_url: None,
            database_max_connections: 10,
            nats_url: None,
            default_currency: "USD".to_string(),
        }
    }
}

impl AppConfig {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse(var("PORT"), "PORT")?.unwrap_or(defaults.port),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse(var("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS")?.unwrap_or(defaults.database_max_connections),
            nats_url: var("NATS_URL"),
            default_currency: var("DEFAULT_CURRENCY").map(|c| c.to_uppercase()).unwrap_or(defaults.default_currency),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port).parse().map_err(|_| ConfigError::Invalid { name: "HOST", value: self.host.clone() })
    }
}

fn parse<T: std::str::FromStr>(value: Option<String>, name: &'static str) -> Result<Option<T>, ConfigError> {
    value.map(|v| v.parse().map_err(|_| ConfigError::Invalid { name, value: v })).transpose()
}
