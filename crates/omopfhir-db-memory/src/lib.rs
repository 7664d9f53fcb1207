//! In-memory storage backend for OMOPonFHIR.
//!
//! Provides [`InMemoryOmopStore`] for the OMOP vocabulary tables and
//! [`InMemoryMappingStore`] for the local mapping stores, both built on papaya
//! lock-free maps. Used for tests and for running without a CDM database.
//!
//! # Example
//!
//! ```ignore
//! use omopfhir_db_memory::InMemoryOmopStore;
//! use omopfhir_storage::OmopServices;
//!
//! let services = OmopServices::from_backend(Arc::new(InMemoryOmopStore::new()));
//! let concept = services.concepts.find_by_code("LOINC", "2345-7").await?;
//! ```

mod mapping;
pub mod query;
mod storage;

use std::sync::Arc;

pub use mapping::InMemoryMappingStore;
pub use storage::InMemoryOmopStore;

use omopfhir_storage::{MappingStores, OmopServices};

/// OMOP services over a fresh in-memory store.
pub fn create_omop_services() -> (Arc<InMemoryOmopStore>, OmopServices) {
    let store = Arc::new(InMemoryOmopStore::new());
    let services = OmopServices::from_backend(store.clone());
    (store, services)
}

/// Mapping stores over a fresh in-memory store.
pub fn create_mapping_stores() -> MappingStores {
    MappingStores::from_backend(Arc::new(InMemoryMappingStore::new()))
}
