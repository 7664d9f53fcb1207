//! Embedded migrations for the mapping tables.

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use sqlx_sqlite::SqlitePool;
use std::borrow::Cow;
use tracing::{info, instrument};

use crate::error::{Result, SqliteError};

/// Add new migrations here in chronological order as
/// `(version, description, sql)`.
macro_rules! embedded_migrations {
    () => {
        &[
            (
                20250101000001i64,
                "mapping_tables",
                include_str!("../migrations/20250101000001_mapping_tables.sql"),
            ),
            (
                20250101000002i64,
                "seed_state_map",
                include_str!("../migrations/20250101000002_seed_state_map.sql"),
            ),
        ]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Runs all pending migrations. Applied versions are tracked in
/// `_sqlx_migrations`.
///
/// # Errors
///
/// Returns an error if a migration fails to execute.
#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    let migrations = build_migrations();
    info!("Running {} embedded mapping-store migration(s)", migrations.len());

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| SqliteError::Migration(format!("Migration failed: {e}")))?;

    info!("Mapping-store migrations completed successfully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let migrations = build_migrations();
        assert_eq!(migrations.len(), 2);
        assert!(migrations.windows(2).all(|w| w[0].version < w[1].version));
    }
}
