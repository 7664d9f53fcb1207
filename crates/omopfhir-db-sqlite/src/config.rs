//! Configuration for the embedded mapping database.

use serde::{Deserialize, Serialize};

/// Configuration for the SQLite mapping store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// `sqlite://path/to/file.db` or `sqlite::memory:`
    pub url: String,

    /// Maximum number of pooled connections. In-memory databases always use one.
    pub pool_size: u32,

    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Create the database file if it does not exist.
    pub create_if_missing: bool,

    /// Whether to run migrations on startup.
    pub run_migrations: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://omopfhir-mapping.db".into(),
            pool_size: 4,
            busy_timeout_ms: 5000,
            create_if_missing: true,
            run_migrations: true,
        }
    }
}

impl SqliteConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// A private in-memory database, mostly for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    #[must_use]
    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    #[must_use]
    pub fn with_run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SqliteConfig::default();
        assert_eq!(config.url, "sqlite://omopfhir-mapping.db");
        assert!(config.run_migrations);
        assert!(!config.is_in_memory());
    }

    #[test]
    fn test_in_memory_config() {
        let config = SqliteConfig::in_memory().with_pool_size(8);
        assert!(config.is_in_memory());
        assert_eq!(config.pool_size, 8);
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: SqliteConfig =
            serde_json::from_str(r#"{"url": "sqlite:///var/lib/omopfhir/map.db"}"#).unwrap();
        assert_eq!(config.url, "sqlite:///var/lib/omopfhir/map.db");
        assert_eq!(config.busy_timeout_ms, 5000);
    }
}
