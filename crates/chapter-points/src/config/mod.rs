use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::engine::ConditionChaining;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let storage = StorageConfig::from_parts(
            &env::var("APP_STORE").unwrap_or_else(|_| "memory".to_string()),
            env::var("APP_STORE_PATH").ok(),
        )?;

        let chaining_value =
            env::var("APP_CONDITION_CHAINING").unwrap_or_else(|_| "all_of".to_string());
        let condition_chaining = ConditionChaining::parse(&chaining_value)
            .ok_or(ConfigError::InvalidConditionChaining(chaining_value))?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage,
            engine: EngineConfig { condition_chaining },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Document store backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    File { path: PathBuf },
}

impl StorageConfig {
    const DEFAULT_PATH: &'static str = "data";

    fn from_parts(backend: &str, path: Option<String>) -> Result<Self, ConfigError> {
        match backend.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "file" | "json" => Ok(Self::File {
                path: PathBuf::from(
                    path.filter(|value| !value.trim().is_empty())
                        .unwrap_or_else(|| Self::DEFAULT_PATH.to_string()),
                ),
            }),
            other => Err(ConfigError::InvalidStorageBackend(other.to_string())),
        }
    }
}

/// Rule evaluation settings.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub condition_chaining: ConditionChaining,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidStorageBackend(String),
    InvalidConditionChaining(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidStorageBackend(value) => {
                write!(f, "APP_STORE must be 'memory' or 'file', got '{}'", value)
            }
            ConfigError::InvalidConditionChaining(value) => write!(
                f,
                "APP_CONDITION_CHAINING must be 'all_of' or 'sequential', got '{}'",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidStorageBackend(_)
            | ConfigError::InvalidConditionChaining(_) => None,
        }
    }
}
