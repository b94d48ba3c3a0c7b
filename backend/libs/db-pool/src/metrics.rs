//! Prometheus metrics for the database connection pool

use deadpool_postgres::{Object, Pool, PoolError};
use prometheus::{register_histogram_vec, register_int_counter_vec, register_int_gauge_vec};
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec};
use std::time::Instant;

lazy_static::lazy_static! {
    /// Pool connection count by state (available/in_use/max)
    static ref DB_POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connections",
        "Database pool connection count by state",
        &["service", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref DB_POOL_ACQUIRE_DURATION: HistogramVec = register_histogram_vec!(
        "db_pool_acquire_duration_seconds",
        "Time to acquire connection from pool",
        &["service"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref DB_POOL_ACQUIRE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "db_pool_acquire_errors_total",
        "Connection acquisition errors",
        &["service", "error_type"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

/// Update connection pool gauges (called periodically)
pub(crate) fn update_pool_metrics(pool: &Pool, service: &str) {
    let status = pool.status();
    let available = status.available as i64;
    let in_use = status.size as i64 - available;

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "available"])
        .set(available);
    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "in_use"])
        .set(in_use);
    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "max"])
        .set(status.max_size as i64);
}

/// Acquire a connection from the pool and record latency and failures
///
/// Drop-in replacement for `pool.get().await`.
pub async fn acquire_with_metrics(pool: &Pool, service: &str) -> Result<Object, PoolError> {
    let start = Instant::now();
    let result = pool.get().await;

    DB_POOL_ACQUIRE_DURATION
        .with_label_values(&[service])
        .observe(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        let error_type = match e {
            PoolError::Timeout(_) => "timeout",
            PoolError::Closed => "closed",
            PoolError::Backend(_) => "backend",
            _ => "other",
        };
        DB_POOL_ACQUIRE_ERRORS
            .with_label_values(&[service, error_type])
            .inc();
    }

    result
}
