// src/utils/db_connect.rs

use anyhow::{Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::info;
use std::env;
use std::time::Duration;
use tokio_postgres::{Config, NoTls};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Connection settings read from `POSTGRES_*` and `DB_POOL_MAX_SIZE`.
#[derive(Debug, Clone, PartialEq)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub pool_max_size: u32,
}

impl DbSettings {
    pub fn from_env() -> Self {
        Self {
            host: env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("POSTGRES_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse::<u16>()
                .unwrap_or(5432),
            dbname: env::var("POSTGRES_DB").unwrap_or_else(|_| "crm".to_string()),
            user: env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("POSTGRES_PASSWORD").unwrap_or_default(),
            pool_max_size: env::var("DB_POOL_MAX_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<u32>()
                .unwrap_or(10),
        }
    }

    fn pg_config(&self) -> Config {
        info!(
            "DB Config: Host={}, Port={}, DB={}, User={}",
            self.host, self.port, self.dbname, self.user
        );
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password);
        config.application_name("lead_dedupe");
        config.connect_timeout(Duration::from_secs(10));
        config
    }
}

/// Initializes the database connection pool and checks it with `SELECT 1`.
pub async fn connect(settings: &DbSettings) -> Result<PgPool> {
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(settings.pg_config(), NoTls);

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .min_idle(Some(1))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    {
        let conn = pool
            .get()
            .await
            .context("Failed to get test connection from pool")?;
        conn.query_one("SELECT 1", &[])
            .await
            .context("Test query 'SELECT 1' failed")?;
    }
    info!("Database connection pool initialized successfully.");
    Ok(pool)
}

/// (total connections, idle connections, in use)
pub fn get_pool_status(pool: &PgPool) -> (u32, u32, u32) {
    let state = pool.state();
    (
        state.connections,
        state.idle_connections,
        state.connections - state.idle_connections,
    )
}
