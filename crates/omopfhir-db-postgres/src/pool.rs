//! Connection pool for an existing OMOP CDM database.
//!
//! The backend never creates tables, so connecting also checks that the
//! configured schema carries the vocabulary tables the queries read.

use std::time::Duration;

use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};

/// Reported as `application_name` in `pg_stat_activity`.
pub const APPLICATION_NAME: &str = "omopfhir";

/// Vocabulary tables every CDM schema must provide.
pub const CDM_VOCABULARY_TABLES: [&str; 4] =
    ["concept", "vocabulary", "relationship", "concept_relationship"];

/// Opens a pool against the CDM database.
#[instrument(skip(config), fields(url = %mask_password(&config.url), schema = %config.schema))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    config.validate()?;

    info!(
        pool_size = config.pool_size,
        min_connections = ?config.min_connections,
        connect_timeout_ms = config.connect_timeout_ms,
        "Connecting to OMOP CDM database"
    );

    let connect_options = config
        .url
        .parse::<PgConnectOptions>()?
        .application_name(APPLICATION_NAME);

    let min_connections = config
        .min_connections
        .unwrap_or(config.pool_size / 4)
        .clamp(1, config.pool_size);

    let mut options = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs.unwrap_or(1800)));

    if let Some(idle_timeout) = config.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(idle_timeout));
    }

    Ok(options.connect_with(connect_options).await?)
}

/// Checks that `schema` exists and holds every CDM vocabulary table.
///
/// # Errors
///
/// `Config` naming the missing tables, `Connection` when the query fails.
#[instrument(skip(pool))]
pub async fn verify_cdm_schema(pool: &PgPool, schema: &str) -> Result<()> {
    let wanted: Vec<String> = CDM_VOCABULARY_TABLES.iter().map(|t| (*t).to_string()).collect();
    let found: Vec<String> = query_scalar(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema::text = $1 AND table_name::text = ANY($2)",
    )
    .bind(schema)
    .bind(wanted)
    .fetch_all(pool)
    .await?;

    let missing = missing_tables(&found);
    if missing.len() == CDM_VOCABULARY_TABLES.len() {
        return Err(PostgresError::config(format!(
            "schema '{schema}' has no OMOP CDM vocabulary tables"
        )));
    }
    if !missing.is_empty() {
        return Err(PostgresError::config(format!(
            "schema '{schema}' is missing CDM tables: {}",
            missing.join(", ")
        )));
    }

    debug!("CDM vocabulary tables present");
    Ok(())
}

fn missing_tables(found: &[String]) -> Vec<&'static str> {
    CDM_VOCABULARY_TABLES
        .iter()
        .copied()
        .filter(|table| !found.iter().any(|f| f == table))
        .collect()
}

/// Masks the password in a database URL for logging.
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}
