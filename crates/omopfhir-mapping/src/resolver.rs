//! Translation between FHIR codings and OMOP concepts.
//!
//! A FHIR system URI is first looked up in the compiled
//! [`StaticCodeSystemRegistry`], then in the site's [`VocabularyMapStore`].
//! Codings whose system has no vocabulary at all can still be bound to a
//! concept one by one through the [`CodeMapStore`].
//!
//! [`VocabularyMapStore`]: omopfhir_storage::VocabularyMapStore
//! [`CodeMapStore`]: omopfhir_storage::CodeMapStore

use omopfhir_core::{Coding, CodingMatch, Concept, StaticCodeSystemRegistry};
use omopfhir_storage::{DynCodeMapStore, DynConceptService, DynVocabularyMapStore, MappingStores};
use tracing::debug;

use crate::error::{MappingError, Result};

/// Single entry point for FHIR/OMOP code translation.
#[derive(Clone)]
pub struct ConceptResolver {
    registry: &'static StaticCodeSystemRegistry,
    concepts: DynConceptService,
    vocabulary_map: DynVocabularyMapStore,
    code_map: DynCodeMapStore,
}

impl ConceptResolver {
    /// Resolver over the global registry.
    pub fn new(concepts: DynConceptService, stores: &MappingStores) -> Self {
        Self::with_registry(StaticCodeSystemRegistry::global(), concepts, stores)
    }

    pub fn with_registry(
        registry: &'static StaticCodeSystemRegistry,
        concepts: DynConceptService,
        stores: &MappingStores,
    ) -> Self {
        Self {
            registry,
            concepts,
            vocabulary_map: stores.vocabulary_map.clone(),
            code_map: stores.code_map.clone(),
        }
    }

    /// OMOP vocabulary id for a FHIR system, registry first.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a blank system; storage failures.
    pub async fn vocabulary_for_system(&self, system: &str) -> Result<Option<String>> {
        if let Some(vocabulary) = self.registry.vocabulary_for_uri(system)? {
            return Ok(Some(vocabulary.to_string()));
        }
        Ok(self
            .vocabulary_map
            .lookup_vocabulary_by_fhir_system(system)
            .await?)
    }

    /// FHIR system for an OMOP vocabulary id, registry first.
    pub async fn system_for_vocabulary(&self, vocabulary_id: &str) -> Result<Option<String>> {
        if let Some(uri) = self.registry.uri_for_vocabulary(vocabulary_id)? {
            return Ok(Some(uri.to_string()));
        }
        Ok(self
            .vocabulary_map
            .lookup_fhir_system_by_vocabulary(vocabulary_id)
            .await?)
    }

    /// Finds the concept a coding denotes.
    ///
    /// Returns `Ok(None)` when the system is known but no concept carries the
    /// code.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` when the coding lacks a system or a code
    /// - `UnknownSystem` when neither the registry, the vocabulary map nor the
    ///   code map knows the system
    /// - `Storage` when a backend fails
    pub async fn resolve_omop_concept(&self, coding: &Coding) -> Result<Option<Concept>> {
        let system = coding
            .system_str()
            .ok_or_else(|| MappingError::invalid_input("coding has no system"))?;
        let code = coding
            .code_str()
            .ok_or_else(|| MappingError::invalid_input("coding has no code"))?;

        if let Some(vocabulary) = self.vocabulary_for_system(system).await? {
            return Ok(self.concepts.find_by_code(&vocabulary, code).await?);
        }

        match self.code_map.lookup_omop_concept_by_coding(system, code).await? {
            Some(concept_id) => Ok(self.concepts.find_by_id(concept_id).await?),
            None => Err(MappingError::UnknownSystem(system.to_string())),
        }
    }

    /// Builds the FHIR coding for a concept, with the concept name as display.
    ///
    /// # Errors
    ///
    /// `UnknownVocabulary` when the vocabulary has no FHIR system and the
    /// concept has no code-map binding.
    pub async fn resolve_coding(&self, concept: &Concept) -> Result<Coding> {
        if let Some(system) = self.system_for_vocabulary(&concept.vocabulary_id).await? {
            return Ok(Coding::new(system, concept.concept_code.clone())
                .with_display(concept.name.clone()));
        }

        match self.code_map.lookup_coding_by_omop_concept(concept.id).await? {
            Some(mut coding) => {
                if coding.display.as_deref().is_none_or(|d| d.trim().is_empty()) {
                    coding.display = Some(concept.name.clone());
                }
                Ok(coding)
            }
            None => Err(MappingError::UnknownVocabulary(
                concept.vocabulary_id.clone(),
            )),
        }
    }

    pub fn compare_codings(&self, a: &Coding, b: &Coding) -> CodingMatch {
        a.compare(b)
    }

    /// First coding that resolves to a concept wins.
    ///
    /// Codings with bad input or an unknown system are skipped; storage
    /// failures abort the search.
    pub async fn search_concept_for_codeable_concept(
        &self,
        codings: &[Coding],
    ) -> Result<Option<Concept>> {
        for coding in codings {
            match self.resolve_omop_concept(coding).await {
                Ok(Some(concept)) => return Ok(Some(concept)),
                Ok(None) => {}
                Err(e) if e.is_input_error() => {
                    debug!(system = ?coding.system, code = ?coding.code, error = %e, "skipping coding");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Resolves free text through the code map's display texts.
    pub async fn resolve_source_string(&self, text: &str) -> Result<Option<Concept>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MappingError::invalid_input("source text is empty"));
        }
        match self.code_map.lookup_coding_by_display_text(text).await? {
            Some(coding) => self.resolve_omop_concept(&coding).await,
            None => Ok(None),
        }
    }

    pub async fn concept_by_id(&self, concept_id: i64) -> Result<Option<Concept>> {
        Ok(self.concepts.find_by_id(concept_id).await?)
    }
}
