//! Connection pool management for the SQLite mapping store.

use std::str::FromStr;
use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_sqlite::{Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use tracing::{debug, info, instrument};

use crate::config::SqliteConfig;
use crate::error::Result;

/// Type alias for SQLite pool options.
pub type SqlitePoolOptions = PoolOptions<Sqlite>;

/// Creates a new SQLite connection pool from the given configuration.
///
/// In-memory databases get exactly one connection that is never recycled, so
/// the data lives as long as the pool.
#[instrument(skip(config), fields(url = %config.url))]
pub async fn create_pool(config: &SqliteConfig) -> Result<SqlitePool> {
    let mut connect = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(config.create_if_missing)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .foreign_keys(true);

    let options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        connect = connect.journal_mode(SqliteJournalMode::Wal);
        SqlitePoolOptions::new().max_connections(config.pool_size.max(1))
    };

    info!(
        in_memory = config.is_in_memory(),
        pool_size = config.pool_size,
        "Creating SQLite connection pool"
    );

    let pool = options.connect_with(connect).await?;

    debug!("SQLite connection pool created successfully");

    Ok(pool)
}
