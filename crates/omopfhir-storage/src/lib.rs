//! # omopfhir-storage
//!
//! Storage abstraction layer for the OMOP/FHIR mapping engine.
//!
//! This crate defines the traits and types that storage backends implement.
//! It contains no implementations; those live in `omopfhir-db-memory`,
//! `omopfhir-db-postgres` and `omopfhir-db-sqlite`.
//!
//! ## Overview
//!
//! Two families of traits are defined:
//! - the OMOP service layer ([`ConceptService`], [`VocabularyService`],
//!   [`RelationshipService`], [`ConceptRelationshipService`]) over the CDM
//!   vocabulary tables
//! - the local mapping stores ([`VocabularyMapStore`], [`CodeMapStore`],
//!   [`StateMapStore`]) holding site-specific FHIR bindings
//!
//! Every lookup returns `Ok(None)` when nothing matches; an `Err` means the
//! backend itself failed and callers must not treat it as "not found".
//!
//! ## Example
//!
//! ```ignore
//! use omopfhir_storage::{ConceptService, StorageError};
//!
//! async fn loinc_concept(
//!     concepts: &dyn ConceptService,
//!     code: &str,
//! ) -> Result<Option<i64>, StorageError> {
//!     Ok(concepts.find_by_code("LOINC", code).await?.map(|c| c.id))
//! }
//! ```

mod error;
pub mod params;
mod traits;
mod types;

use std::sync::Arc;

pub use error::{ErrorCategory, StorageError};
pub use params::{
    BooleanRelationship, ConceptField, Condition, Operator, ParameterType, ParameterWrapper,
    SortSpec, concept_code_params, concept_name_code_params,
};
pub use traits::{
    CodeMapStore, ConceptMatch, ConceptRelationshipService, ConceptService, RelationshipService,
    StateMapStore, VocabularyMapStore, VocabularyService,
};
pub use types::{CodeMapEntry, TwoLetterStateMapEntry, Upsert, VocabularyMapEntry};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

pub type DynConceptService = Arc<dyn ConceptService>;
pub type DynVocabularyService = Arc<dyn VocabularyService>;
pub type DynRelationshipService = Arc<dyn RelationshipService>;
pub type DynConceptRelationshipService = Arc<dyn ConceptRelationshipService>;
pub type DynVocabularyMapStore = Arc<dyn VocabularyMapStore>;
pub type DynCodeMapStore = Arc<dyn CodeMapStore>;
pub type DynStateMapStore = Arc<dyn StateMapStore>;

/// The four OMOP CDM services, usually backed by one database.
#[derive(Clone)]
pub struct OmopServices {
    pub concepts: DynConceptService,
    pub vocabularies: DynVocabularyService,
    pub relationships: DynRelationshipService,
    pub concept_relationships: DynConceptRelationshipService,
}

impl OmopServices {
    /// Uses one backend for all four services.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ConceptService
            + VocabularyService
            + RelationshipService
            + ConceptRelationshipService
            + 'static,
    {
        Self {
            concepts: backend.clone(),
            vocabularies: backend.clone(),
            relationships: backend.clone(),
            concept_relationships: backend,
        }
    }
}

/// The three local mapping stores.
#[derive(Clone)]
pub struct MappingStores {
    pub vocabulary_map: DynVocabularyMapStore,
    pub code_map: DynCodeMapStore,
    pub state_map: DynStateMapStore,
}

impl MappingStores {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: VocabularyMapStore + CodeMapStore + StateMapStore + 'static,
    {
        Self {
            vocabulary_map: backend.clone(),
            code_map: backend.clone(),
            state_map: backend,
        }
    }
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use omopfhir_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::params::{
        BooleanRelationship, ConceptField, Operator, ParameterType, ParameterWrapper, SortSpec,
    };
    pub use crate::traits::{
        CodeMapStore, ConceptMatch, ConceptRelationshipService, ConceptService,
        RelationshipService, StateMapStore, VocabularyMapStore, VocabularyService,
    };
    pub use crate::types::{CodeMapEntry, TwoLetterStateMapEntry, Upsert, VocabularyMapEntry};
    pub use crate::{MappingStores, OmopServices, StorageResult};
}
