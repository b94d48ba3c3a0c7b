use crate::error::AppError;
use db_pool::env_utils::parse_env_with_default;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which store implementation backs conversations, messages and relationships
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::Config(format!("unknown STORE_BACKEND: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!("unknown LOG_FORMAT: {other}"))),
        }
    }
}

/// Paging and size limits for message operations
#[derive(Debug, Clone, Copy)]
pub struct MessagingConfig {
    /// Page size used when the caller passes no limit
    pub page_size: i64,
    /// Upper clamp for caller-supplied limits
    pub max_page_size: i64,
    /// Maximum content length in characters
    pub max_length: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_page_size: 100,
            max_length: 10_000,
        }
    }
}

impl MessagingConfig {
    /// Resolve a caller-supplied limit to `1..=max_page_size`
    pub fn clamp_limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WsConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    pub port: u16,
    pub jwt_public_key_pem: String,
    pub messaging: MessagingConfig,
    pub ws: WsConfig,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            store_backend: StoreBackend::Postgres,
            port: 8085,
            jwt_public_key_pem: String::new(),
            messaging: MessagingConfig::default(),
            ws: WsConfig::default(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let defaults = Self::default();

        let store_backend = match env::var("STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.store_backend,
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config(
                "DATABASE_URL missing (required for the postgres backend)".into(),
            ));
        }

        let log_format = match env::var("LOG_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.log_format,
        };

        let messaging = MessagingConfig {
            page_size: parse_env_with_default("MESSAGE_PAGE_SIZE", defaults.messaging.page_size),
            max_page_size: parse_env_with_default(
                "MESSAGE_MAX_PAGE_SIZE",
                defaults.messaging.max_page_size,
            ),
            max_length: parse_env_with_default(
                "MESSAGE_MAX_LENGTH",
                defaults.messaging.max_length,
            ),
        };
        if messaging.page_size < 1 || messaging.max_page_size < messaging.page_size {
            return Err(AppError::Config(format!(
                "MESSAGE_PAGE_SIZE ({}) must be between 1 and MESSAGE_MAX_PAGE_SIZE ({})",
                messaging.page_size, messaging.max_page_size
            )));
        }

        let ws = WsConfig {
            heartbeat_interval: Duration::from_secs(parse_env_with_default(
                "WS_HEARTBEAT_INTERVAL_SECS",
                defaults.ws.heartbeat_interval.as_secs(),
            )),
            client_timeout: Duration::from_secs(parse_env_with_default(
                "WS_CLIENT_TIMEOUT_SECS",
                defaults.ws.client_timeout.as_secs(),
            )),
        };

        Ok(Self {
            database_url,
            store_backend,
            port: parse_env_with_default("PORT", defaults.port),
            jwt_public_key_pem: Self::load_jwt_public_key()?,
            messaging,
            ws,
            log_format,
        })
    }

    /// Inline PEM wins over a key file path
    fn load_jwt_public_key() -> Result<String, AppError> {
        if let Ok(pem) = env::var("JWT_PUBLIC_KEY_PEM") {
            if !pem.trim().is_empty() {
                return Ok(pem);
            }
        }

        let path = env::var("JWT_PUBLIC_KEY_FILE").map_err(|_| {
            AppError::Config("JWT_PUBLIC_KEY_PEM or JWT_PUBLIC_KEY_FILE must be set".into())
        })?;
        std::fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("failed to read JWT public key {path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "DATABASE_URL",
        "STORE_BACKEND",
        "PORT",
        "JWT_PUBLIC_KEY_PEM",
        "JWT_PUBLIC_KEY_FILE",
        "MESSAGE_PAGE_SIZE",
        "MESSAGE_MAX_PAGE_SIZE",
        "MESSAGE_MAX_LENGTH",
        "LOG_FORMAT",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_memory_backend_defaults() {
        clear_env();
        env::set_var("STORE_BACKEND", "memory");
        env::set_var("JWT_PUBLIC_KEY_PEM", "-----BEGIN PUBLIC KEY-----");

        let config = Config::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.port, 8085);
        assert_eq!(config.messaging.page_size, 50);
        assert_eq!(config.messaging.max_page_size, 100);
        assert_eq!(config.messaging.max_length, 10_000);
        assert_eq!(config.log_format, LogFormat::Text);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_postgres_backend_requires_database_url() {
        clear_env();
        env::set_var("JWT_PUBLIC_KEY_PEM", "-----BEGIN PUBLIC KEY-----");

        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_jwt_key_rejected() {
        clear_env();
        env::set_var("STORE_BACKEND", "memory");

        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_backend_rejected() {
        clear_env();
        env::set_var("STORE_BACKEND", "cassandra");
        env::set_var("JWT_PUBLIC_KEY_PEM", "key");

        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_clamp_limit() {
        let messaging = MessagingConfig::default();
        assert_eq!(messaging.clamp_limit(None), 50);
        assert_eq!(messaging.clamp_limit(Some(0)), 1);
        assert_eq!(messaging.clamp_limit(Some(-5)), 1);
        assert_eq!(messaging.clamp_limit(Some(20)), 20);
        assert_eq!(messaging.clamp_limit(Some(5000)), 100);
    }
}
