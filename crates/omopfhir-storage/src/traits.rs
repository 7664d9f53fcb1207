//! Storage traits for the OMOP service layer and the local mapping stores.

use async_trait::async_trait;
use omopfhir_core::{
    Coding, Concept, ConceptRelationship, ConceptRelationshipKey, Relationship, Vocabulary,
};

use crate::error::StorageError;
use crate::params::{ParameterWrapper, SortSpec, concept_code_params, concept_name_code_params};
use crate::types::{CodeMapEntry, TwoLetterStateMapEntry, Upsert, VocabularyMapEntry};

/// Natural key used by [`ConceptService::create_if_absent`] to decide whether
/// a concept already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptMatch {
    /// Same `(vocabulary_id, concept_code)`.
    VocabularyAndCode,
    /// Same `(concept_name, vocabulary_id, concept_code)`; used for metadata
    /// concepts that share a vocabulary and code.
    NameVocabularyAndCode,
}

impl ConceptMatch {
    pub fn params_for(&self, concept: &Concept) -> Vec<ParameterWrapper> {
        match self {
            Self::VocabularyAndCode => {
                concept_code_params(&concept.vocabulary_id, &concept.concept_code)
            }
            Self::NameVocabularyAndCode => concept_name_code_params(
                &concept.name,
                &concept.vocabulary_id,
                &concept.concept_code,
            ),
        }
    }

    pub fn matches(&self, existing: &Concept, candidate: &Concept) -> bool {
        let same_code = existing.vocabulary_id == candidate.vocabulary_id
            && existing.concept_code == candidate.concept_code;
        match self {
            Self::VocabularyAndCode => same_code,
            Self::NameVocabularyAndCode => same_code && existing.name == candidate.name,
        }
    }
}

/// Access to the OMOP `concept` table.
///
/// Lookups return `Ok(None)` when nothing matches; `Err` always means the
/// backend could not answer.
#[async_trait]
pub trait ConceptService: Send + Sync {
    /// Searches concepts matching every wrapper, skipping `offset` rows and
    /// returning at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidQuery` for malformed wrappers.
    async fn search_with_params(
        &self,
        offset: usize,
        limit: usize,
        params: &[ParameterWrapper],
        sort: Option<&SortSpec>,
    ) -> Result<Vec<Concept>, StorageError>;

    async fn find_by_id(&self, concept_id: i64) -> Result<Option<Concept>, StorageError>;

    /// Inserts a concept.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the id is taken.
    async fn create(&self, concept: &Concept) -> Result<Concept, StorageError>;

    /// Inserts `concept` unless a row with the same natural key exists, as one
    /// atomic operation.
    async fn create_if_absent(
        &self,
        concept: &Concept,
        key: ConceptMatch,
    ) -> Result<Upsert<Concept>, StorageError>;

    /// Largest `concept_id` currently stored, `0` for an empty table.
    async fn get_largest_id(&self) -> Result<i64, StorageError>;

    /// Exact `(vocabulary_id, concept_code)` lookup.
    async fn find_by_code(
        &self,
        vocabulary_id: &str,
        concept_code: &str,
    ) -> Result<Option<Concept>, StorageError> {
        let params = concept_code_params(vocabulary_id, concept_code);
        let found = self.search_with_params(0, 1, &params, None).await?;
        Ok(found.into_iter().next())
    }
}

/// Access to the OMOP `vocabulary` table.
#[async_trait]
pub trait VocabularyService: Send + Sync {
    async fn find_by_id(&self, vocabulary_id: &str) -> Result<Option<Vocabulary>, StorageError>;

    async fn create(&self, vocabulary: &Vocabulary) -> Result<Vocabulary, StorageError>;

    async fn create_if_absent(
        &self,
        vocabulary: &Vocabulary,
    ) -> Result<Upsert<Vocabulary>, StorageError>;
}

/// Access to the OMOP `relationship` table.
#[async_trait]
pub trait RelationshipService: Send + Sync {
    async fn find_by_id(&self, relationship_id: &str)
    -> Result<Option<Relationship>, StorageError>;

    async fn create(&self, relationship: &Relationship) -> Result<Relationship, StorageError>;

    async fn create_if_absent(
        &self,
        relationship: &Relationship,
    ) -> Result<Upsert<Relationship>, StorageError>;
}

/// Access to the OMOP `concept_relationship` table.
#[async_trait]
pub trait ConceptRelationshipService: Send + Sync {
    async fn find_by_id(
        &self,
        key: &ConceptRelationshipKey,
    ) -> Result<Option<ConceptRelationship>, StorageError>;

    async fn create(
        &self,
        concept_relationship: &ConceptRelationship,
    ) -> Result<ConceptRelationship, StorageError>;

    async fn create_if_absent(
        &self,
        concept_relationship: &ConceptRelationship,
    ) -> Result<Upsert<ConceptRelationship>, StorageError>;
}

/// Persistent OMOP vocabulary id ↔ FHIR system bindings for vocabularies the
/// static registry does not know.
#[async_trait]
pub trait VocabularyMapStore: Send + Sync {
    async fn save(&self, entry: &VocabularyMapEntry) -> Result<(), StorageError>;

    /// Overwrites both system fields of the entry with the same vocabulary id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such entry exists.
    async fn update(&self, entry: &VocabularyMapEntry) -> Result<(), StorageError>;

    /// Removes an entry. Deleting a missing entry is not an error.
    async fn delete(&self, omop_vocabulary_id: &str) -> Result<(), StorageError>;

    async fn get(&self) -> Result<Vec<VocabularyMapEntry>, StorageError>;

    /// Vocabulary id whose URL system or other-system name equals
    /// `fhir_system_name` (trimmed, case-sensitive).
    async fn lookup_vocabulary_by_fhir_system(
        &self,
        fhir_system_name: &str,
    ) -> Result<Option<String>, StorageError>;

    /// URL system of the vocabulary, falling back to its other-system name.
    async fn lookup_fhir_system_by_vocabulary(
        &self,
        omop_vocabulary_id: &str,
    ) -> Result<Option<String>, StorageError>;
}

/// Persistent OMOP concept id ↔ FHIR coding bindings.
#[async_trait]
pub trait CodeMapStore: Send + Sync {
    async fn save(&self, entry: &CodeMapEntry) -> Result<(), StorageError>;

    /// Overwrites system, code and display of the entry for the same concept.
    async fn update(&self, entry: &CodeMapEntry) -> Result<(), StorageError>;

    async fn delete(&self, omop_concept: i64) -> Result<(), StorageError>;

    async fn get(&self) -> Result<Vec<CodeMapEntry>, StorageError>;

    /// Concept id bound to `(system, code)`; `Ok(None)` when either is blank.
    async fn lookup_omop_concept_by_coding(
        &self,
        system: &str,
        code: &str,
    ) -> Result<Option<i64>, StorageError>;

    async fn lookup_coding_by_omop_concept(
        &self,
        omop_concept: i64,
    ) -> Result<Option<Coding>, StorageError>;

    /// Exact match on the stored display text.
    async fn lookup_coding_by_display_text(
        &self,
        text: &str,
    ) -> Result<Option<Coding>, StorageError>;
}

/// US state name to two-letter abbreviation lookup.
#[async_trait]
pub trait StateMapStore: Send + Sync {
    async fn save(&self, entry: &TwoLetterStateMapEntry) -> Result<(), StorageError>;

    async fn update(&self, entry: &TwoLetterStateMapEntry) -> Result<(), StorageError>;

    async fn delete(&self, state_name: &str) -> Result<(), StorageError>;

    async fn get(&self) -> Result<Vec<TwoLetterStateMapEntry>, StorageError>;

    async fn lookup_two_letter(&self, state_name: &str) -> Result<Option<String>, StorageError>;
}
