//! Stores, resolver and pipeline shared by the handlers.

use std::sync::Arc;

use anyhow::Context;
use omopfhir_db_postgres::{PostgresOmopStore, mask_password};
use omopfhir_db_sqlite::SqliteMappingStore;
use omopfhir_mapping::{
    ConceptIdAllocator, ConceptResolver, IngestionSettings, LocalMappingIngestionPipeline,
};
use omopfhir_storage::{MappingStores, OmopServices};

use crate::config::{AppConfig, CdmBackend, MappingStoreBackend};

#[derive(Clone)]
pub struct AppState {
    pub services: OmopServices,
    pub stores: MappingStores,
    pub resolver: ConceptResolver,
    /// `None` when no ingestion directory is configured.
    pub pipeline: Option<Arc<LocalMappingIngestionPipeline>>,
}

impl AppState {
    pub fn new(
        services: OmopServices,
        stores: MappingStores,
        ingestion: Option<IngestionSettings>,
    ) -> Self {
        let resolver = ConceptResolver::new(services.concepts.clone(), &stores);
        let pipeline = ingestion.map(|settings| {
            let allocator = Arc::new(ConceptIdAllocator::new(services.concepts.clone()));
            Arc::new(LocalMappingIngestionPipeline::new(
                services.clone(),
                &stores,
                allocator,
                settings,
            ))
        });
        Self {
            services,
            stores,
            resolver,
            pipeline,
        }
    }

    /// Connects the configured backends.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let services = match cfg.cdm.backend {
            CdmBackend::Memory => {
                tracing::warn!("Using an empty in-memory OMOP CDM");
                omopfhir_db_memory::create_omop_services().1
            }
            CdmBackend::Postgres => {
                let url = mask_password(&cfg.cdm.postgres.url);
                let store = PostgresOmopStore::new(cfg.cdm.postgres.clone())
                    .await
                    .with_context(|| format!("connecting to OMOP CDM at {url}"))?;
                tracing::info!(url = %url, schema = %store.schema(), "Connected to OMOP CDM");
                OmopServices::from_backend(Arc::new(store))
            }
        };

        let stores = match cfg.mapping_store.backend {
            MappingStoreBackend::Memory => omopfhir_db_memory::create_mapping_stores(),
            MappingStoreBackend::Sqlite => {
                let store = SqliteMappingStore::new(&cfg.mapping_store.sqlite)
                    .await
                    .with_context(|| {
                        format!("opening mapping store at {}", cfg.mapping_store.sqlite.url)
                    })?;
                tracing::info!(url = %cfg.mapping_store.sqlite.url, "Opened mapping store");
                MappingStores::from_backend(Arc::new(store))
            }
        };

        Ok(Self::new(services, stores, cfg.ingestion.settings()))
    }
}
