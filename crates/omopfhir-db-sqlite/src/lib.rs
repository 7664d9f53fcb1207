//! Embedded SQLite backend for the OMOPonFHIR local mapping stores.
//!
//! The mapping tables live in their own small database, separate from the
//! OMOP CDM, so site-specific bindings survive CDM reloads. Migrations are
//! embedded in the binary and applied on startup.
//!
//! # Example
//!
//! ```ignore
//! use omopfhir_db_sqlite::{SqliteConfig, SqliteMappingStore};
//! use omopfhir_storage::VocabularyMapStore;
//!
//! let store = SqliteMappingStore::new(&SqliteConfig::new("sqlite://mapping.db")).await?;
//! let vocab = store.lookup_vocabulary_by_fhir_system("http://example.org/lab").await?;
//! ```

mod config;
mod error;
pub mod migrations;
mod pool;
mod store;

pub use config::SqliteConfig;
pub use error::{Result, SqliteError};
pub use pool::create_pool;
pub use store::SqliteMappingStore;
