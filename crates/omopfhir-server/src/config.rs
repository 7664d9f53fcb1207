use std::net::SocketAddr;
use std::time::Duration;

use omopfhir_db_postgres::PostgresConfig;
use omopfhir_db_sqlite::SqliteConfig;
use omopfhir_mapping::ingest::{FileDisposition, ingestion_directory};
use omopfhir_mapping::IngestionSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// OMOP CDM holding the vocabulary tables
    #[serde(default)]
    pub cdm: CdmConfig,
    /// Embedded database with the local FHIR bindings
    #[serde(default)]
    pub mapping_store: MappingStoreConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if self.cdm.backend == CdmBackend::Postgres {
            self.cdm
                .postgres
                .validate()
                .map_err(|e| format!("cdm.postgres: {e}"))?;
        }
        if self.mapping_store.backend == MappingStoreBackend::Sqlite {
            let url = &self.mapping_store.sqlite.url;
            if !url.starts_with("sqlite:") {
                return Err("mapping_store.sqlite.url must start with 'sqlite:'".into());
            }
            if self.mapping_store.sqlite.pool_size == 0 {
                return Err("mapping_store.sqlite.pool_size must be > 0".into());
            }
        }
        if self.ingestion.interval_secs == 0 {
            return Err("ingestion.interval_secs must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CdmBackend {
    /// Empty in-memory tables, for trying things out
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CdmConfig {
    #[serde(default)]
    pub backend: CdmBackend,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MappingStoreBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MappingStoreConfig {
    #[serde(default)]
    pub backend: MappingStoreBackend,
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

/// Local mapping-file ingestion.
///
/// `processed` and `rejected` are either `delete` or a directory, relative
/// paths being resolved against `directory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Watched directory; unset or `none` disables ingestion.
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_processed")]
    pub processed: String,
    #[serde(default = "default_rejected")]
    pub rejected: String,
}

fn default_interval_secs() -> u64 {
    60
}
fn default_processed() -> String {
    omopfhir_mapping::ingest::PROCESSED_DIR.into()
}
fn default_rejected() -> String {
    omopfhir_mapping::ingest::REJECTED_DIR.into()
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            directory: None,
            interval_secs: default_interval_secs(),
            processed: default_processed(),
            rejected: default_rejected(),
        }
    }
}

impl IngestionConfig {
    /// Pipeline settings, `None` when ingestion is disabled.
    pub fn settings(&self) -> Option<IngestionSettings> {
        let directory = ingestion_directory(self.directory.as_deref())?;
        let processed = FileDisposition::from_setting(&self.processed, &directory);
        let rejected = FileDisposition::from_setting(&self.rejected, &directory);
        Some(
            IngestionSettings::new(directory)
                .with_processed(processed)
                .with_rejected(rejected),
        )
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use omopfhir_mapping::ingest::LOCAL_CODEMAPPING_FILE_PATH;
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "omopfhir.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }
        // Environment variable overrides, e.g., OMOPFHIR__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("OMOPFHIR")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let mut merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;

        if let Ok(directory) = std::env::var(LOCAL_CODEMAPPING_FILE_PATH) {
            merged.ingestion.directory = Some(directory);
        }

        merged.validate()?;
        Ok(merged)
    }
}
