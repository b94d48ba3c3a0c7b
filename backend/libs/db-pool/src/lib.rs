//! Database connection pool management
//!
//! Pool creation, configuration and schema migration for PostgreSQL-backed
//! services (deadpool-postgres over tokio-postgres).

pub mod env_utils;
mod metrics;

use metrics::update_pool_metrics;
pub use metrics::acquire_with_metrics;

pub use deadpool_postgres::{Pool, PoolError};
use deadpool::managed::TimeoutType;
use deadpool::Runtime;
use deadpool_postgres::{Manager, ManagerConfig, RecyclingMethod};
use env_utils::parse_env_with_default;
use std::time::Duration;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, error, info};

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Service name for metrics labeling
    pub service_name: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Connection creation/verification timeout
    pub connect_timeout_secs: u64,
    /// Connection acquisition timeout (waiting for a free slot)
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 20,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
        }
    }
}

impl DbConfig {
    /// Create a new DbConfig from environment variables
    pub fn from_env(service_name: &str) -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable not set".to_string())?;
        Ok(Self::with_url(service_name, database_url))
    }

    /// Pool settings for an already known URL; sizing and timeouts still
    /// honour the `DB_*` environment overrides
    pub fn with_url(service_name: &str, database_url: impl Into<String>) -> Self {
        let defaults = Self::default();

        Self {
            service_name: service_name.to_string(),
            database_url: database_url.into(),
            max_connections: parse_env_with_default("DB_MAX_CONNECTIONS", defaults.max_connections),
            connect_timeout_secs: parse_env_with_default(
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            acquire_timeout_secs: parse_env_with_default(
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs,
            ),
        }
    }

    /// Log pool configuration details
    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            connect_timeout_secs = self.connect_timeout_secs,
            acquire_timeout_secs = self.acquire_timeout_secs,
            "Database pool configuration"
        );
    }
}

/// Build a deadpool-postgres pool and verify one connection
pub async fn create_pool(config: DbConfig) -> Result<Pool, PoolError> {
    debug!(
        service = %config.service_name,
        max = config.max_connections,
        "Creating database pool"
    );

    let pg_config: PgConfig = config.database_url.parse().map_err(PoolError::Backend)?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections as usize)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(Duration::from_secs(config.acquire_timeout_secs)))
        .build()
        .map_err(|e| {
            error!(service = %config.service_name, error = %e, "Pool build failed");
            PoolError::Closed
        })?;

    let verify = async {
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(PoolError::Backend)?;
        Ok::<(), PoolError>(())
    };

    match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), verify).await {
        Ok(Ok(())) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );

            update_pool_metrics(&pool, &config.service_name);
            let pool_clone = pool.clone();
            let service = config.service_name.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    update_pool_metrics(&pool_clone, &service);
                }
            });

            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            Err(e)
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(PoolError::Timeout(TimeoutType::Wait))
        }
    }
}

/// One embedded schema migration
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Apply pending migrations in version order
///
/// Applied versions are recorded in `schema_migrations`; each migration runs in
/// its own transaction together with its bookkeeping row.
pub async fn migrate(pool: &Pool, migrations: &[Migration]) -> Result<usize, PoolError> {
    let mut client = pool.get().await?;

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .await
        .map_err(PoolError::Backend)?;

    let mut ordered: Vec<&Migration> = migrations.iter().collect();
    ordered.sort_by_key(|m| m.version);

    let mut applied = 0;
    for migration in ordered {
        let tx = client.transaction().await.map_err(PoolError::Backend)?;
        let done = tx
            .query_opt(
                "SELECT 1 FROM schema_migrations WHERE version = $1",
                &[&migration.version],
            )
            .await
            .map_err(PoolError::Backend)?;
        if done.is_some() {
            continue;
        }

        tx.batch_execute(migration.sql)
            .await
            .map_err(PoolError::Backend)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)",
            &[&migration.version, &migration.name],
        )
        .await
        .map_err(PoolError::Backend)?;
        tx.commit().await.map_err(PoolError::Backend)?;

        info!(version = migration.version, name = migration.name, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_pool_env() {
        std::env::remove_var("DB_MAX_CONNECTIONS");
        std::env::remove_var("DB_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("DB_ACQUIRE_TIMEOUT_SECS");
    }

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.acquire_timeout_secs, 10);
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env_without_override() {
        clear_pool_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");

        let config = DbConfig::from_env("chat-signaling-service").unwrap();
        assert_eq!(config.service_name, "chat-signaling-service");
        assert_eq!(config.database_url, "postgres://localhost/test");
        assert_eq!(config.max_connections, 20);

        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial_test::serial]
    fn test_with_url_reads_overrides_without_database_url() {
        clear_pool_env();
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("DB_MAX_CONNECTIONS", "7");
        std::env::set_var("DB_ACQUIRE_TIMEOUT_SECS", "3");

        let config = DbConfig::with_url("chat-signaling-service", "postgres://db/chat");
        assert_eq!(config.database_url, "postgres://db/chat");
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.acquire_timeout_secs, 3);
        assert_eq!(config.connect_timeout_secs, 5);

        clear_pool_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env_with_override() {
        clear_pool_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("DB_MAX_CONNECTIONS", "4");

        let config = DbConfig::from_env("chat-signaling-service").unwrap();
        assert_eq!(config.max_connections, 4);

        clear_pool_env();
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial_test::serial]
    fn test_config_requires_database_url() {
        std::env::remove_var("DATABASE_URL");
        assert!(DbConfig::from_env("chat-signaling-service").is_err());
    }
}
