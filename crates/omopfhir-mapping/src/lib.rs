//! # omopfhir-mapping
//!
//! FHIR/OMOP code translation and local mapping ingestion.
//!
//! - [`ConceptResolver`] turns FHIR codings into OMOP concepts and back
//! - [`ConceptIdAllocator`] hands out ids for locally generated concepts
//! - [`ingest`] loads site-specific mapping files from a watched directory
//!
//! ## Example
//!
//! ```ignore
//! use omopfhir_core::Coding;
//! use omopfhir_mapping::ConceptResolver;
//!
//! let resolver = ConceptResolver::new(services.concepts.clone(), &stores);
//! let glucose = resolver
//!     .resolve_omop_concept(&Coding::new("http://loinc.org", "2345-7"))
//!     .await?;
//! ```

pub mod allocator;
pub mod error;
pub mod ingest;
pub mod resolver;

pub use allocator::{ConceptIdAllocator, LOCAL_CONCEPT_ID_START};
pub use error::{MappingError, Result};
pub use ingest::{
    IngestionHandle, IngestionReport, IngestionScheduler, IngestionSettings,
    LocalMappingIngestionPipeline, PassSummary,
};
pub use resolver::ConceptResolver;
