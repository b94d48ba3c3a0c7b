use db_pool::{create_pool, migrate, DbConfig, Migration, Pool};

const SERVICE: &str = "chat-signaling-service";

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "init",
    sql: include_str!("../migrations/0001_init.sql"),
}];

/// Build the pool and bring the schema up to date
pub async fn init_pool(database_url: &str) -> Result<Pool, db_pool::PoolError> {
    let cfg = DbConfig::with_url(SERVICE, database_url);
    cfg.log_config();

    let pool = create_pool(cfg).await?;
    let applied = migrate(&pool, MIGRATIONS).await?;
    tracing::info!(applied, "database migrations complete");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_unique() {
        let versions: Vec<i64> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
        assert!(MIGRATIONS.iter().all(|m| !m.sql.trim().is_empty()));
    }
}
