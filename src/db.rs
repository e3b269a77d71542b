use anyhow::{Context, Result};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio_postgres::NoTls;

/// Creates a new database connection pool.
///
/// # Arguments
///
/// * `database_url` - The URL of the PostgreSQL database.
/// * `max_size` - The maximum number of pooled connections.
///
/// # Returns
///
/// A `Result` containing the `Pool`.
pub fn create_pool(database_url: &str, max_size: usize) -> Result<Pool> {
    let mut cfg = Config::new();
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .context("DATABASE_URL must be a valid PostgreSQL connection string")?;

    if let Some(tokio_postgres::config::Host::Tcp(hostname)) = pg_config.get_hosts().first() {
        cfg.host = Some(hostname.to_string());
    }
    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }
    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }
    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }
    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.pool = Some(PoolConfig {
        max_size,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(2)),
            recycle: Some(Duration::from_secs(1)),
        },
        ..Default::default()
    });

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .context("Failed to create PostgreSQL pool")?;
    tracing::info!("✅ PostgreSQL pool initialized (max {} connections)", max_size);
    Ok(pool)
}

/// Opens a pooled Redis connection manager.
pub async fn connect_redis(redis_url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url).context("REDIS_URL must be a valid Redis URL")?;
    let manager = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    tracing::info!("✅ Redis Connection Manager initialized (pooled)");
    Ok(manager)
}
