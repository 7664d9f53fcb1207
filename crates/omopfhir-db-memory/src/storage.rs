use std::sync::Arc;

use async_trait::async_trait;
use omopfhir_core::{
    Concept, ConceptRelationship, ConceptRelationshipKey, Relationship, Vocabulary,
};
use omopfhir_storage::{
    ConceptMatch, ConceptRelationshipService, ConceptService, ParameterWrapper,
    RelationshipService, SortSpec, StorageError, Upsert, VocabularyService,
};
use papaya::HashMap as PapayaHashMap;
use tokio::sync::Mutex;

use crate::query;

/// In-memory OMOP vocabulary tables.
///
/// Reads go through papaya lock-free maps. Writes are serialized by a single
/// mutex so that insert-if-absent stays atomic across the natural-key scan.
#[derive(Debug, Default)]
pub struct InMemoryOmopStore {
    concepts: Arc<PapayaHashMap<i64, Concept>>,
    vocabularies: Arc<PapayaHashMap<String, Vocabulary>>,
    relationships: Arc<PapayaHashMap<String, Relationship>>,
    concept_relationships: Arc<PapayaHashMap<ConceptRelationshipKey, ConceptRelationship>>,
    writes: Mutex<()>,
}

impl InMemoryOmopStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concept_count(&self) -> usize {
        self.concepts.pin().len()
    }

    pub fn vocabulary_count(&self) -> usize {
        self.vocabularies.pin().len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.pin().len()
    }

    pub fn concept_relationship_count(&self) -> usize {
        self.concept_relationships.pin().len()
    }

    /// All stored concept relationships, ordered by key.
    pub fn concept_relationships(&self) -> Vec<ConceptRelationship> {
        let guard = self.concept_relationships.pin();
        let mut rows: Vec<_> = guard.iter().map(|(_, v)| v.clone()).collect();
        rows.sort_by_key(ConceptRelationship::key);
        rows
    }

    fn find_concept_by_key(&self, candidate: &Concept, key: ConceptMatch) -> Option<Concept> {
        let guard = self.concepts.pin();
        guard
            .iter()
            .map(|(_, c)| c)
            .filter(|c| key.matches(c, candidate))
            .min_by_key(|c| c.id)
            .cloned()
    }

    fn insert_concept(&self, concept: &Concept) -> Result<Concept, StorageError> {
        let guard = self.concepts.pin();
        if guard.get(&concept.id).is_some() {
            return Err(StorageError::already_exists(
                "concept",
                concept.id.to_string(),
            ));
        }
        guard.insert(concept.id, concept.clone());
        Ok(concept.clone())
    }
}

#[async_trait]
impl ConceptService for InMemoryOmopStore {
    async fn search_with_params(
        &self,
        offset: usize,
        limit: usize,
        params: &[ParameterWrapper],
        sort: Option<&SortSpec>,
    ) -> Result<Vec<Concept>, StorageError> {
        let mut matched = Vec::new();
        {
            let guard = self.concepts.pin();
            for (_, concept) in guard.iter() {
                if query::matches_all(concept, params)? {
                    matched.push(concept.clone());
                }
            }
        }
        matched.sort_by(|a, b| query::compare(a, b, sort));
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_by_id(&self, concept_id: i64) -> Result<Option<Concept>, StorageError> {
        Ok(self.concepts.pin().get(&concept_id).cloned())
    }

    async fn create(&self, concept: &Concept) -> Result<Concept, StorageError> {
        let _write = self.writes.lock().await;
        self.insert_concept(concept)
    }

    async fn create_if_absent(
        &self,
        concept: &Concept,
        key: ConceptMatch,
    ) -> Result<Upsert<Concept>, StorageError> {
        let _write = self.writes.lock().await;
        if let Some(existing) = self.find_concept_by_key(concept, key) {
            return Ok(Upsert::Existing(existing));
        }
        self.insert_concept(concept).map(Upsert::Created)
    }

    async fn get_largest_id(&self) -> Result<i64, StorageError> {
        let guard = self.concepts.pin();
        Ok(guard.iter().map(|(id, _)| *id).max().unwrap_or(0))
    }
}

#[async_trait]
impl VocabularyService for InMemoryOmopStore {
    async fn find_by_id(&self, vocabulary_id: &str) -> Result<Option<Vocabulary>, StorageError> {
        Ok(self.vocabularies.pin().get(vocabulary_id).cloned())
    }

    async fn create(&self, vocabulary: &Vocabulary) -> Result<Vocabulary, StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.vocabularies.pin();
        if guard.get(vocabulary.id.as_str()).is_some() {
            return Err(StorageError::already_exists("vocabulary", &vocabulary.id));
        }
        guard.insert(vocabulary.id.clone(), vocabulary.clone());
        Ok(vocabulary.clone())
    }

    async fn create_if_absent(
        &self,
        vocabulary: &Vocabulary,
    ) -> Result<Upsert<Vocabulary>, StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.vocabularies.pin();
        if let Some(existing) = guard.get(vocabulary.id.as_str()) {
            return Ok(Upsert::Existing(existing.clone()));
        }
        guard.insert(vocabulary.id.clone(), vocabulary.clone());
        Ok(Upsert::Created(vocabulary.clone()))
    }
}

#[async_trait]
impl RelationshipService for InMemoryOmopStore {
    async fn find_by_id(
        &self,
        relationship_id: &str,
    ) -> Result<Option<Relationship>, StorageError> {
        Ok(self.relationships.pin().get(relationship_id).cloned())
    }

    async fn create(&self, relationship: &Relationship) -> Result<Relationship, StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.relationships.pin();
        if guard.get(relationship.id.as_str()).is_some() {
            return Err(StorageError::already_exists("relationship", &relationship.id));
        }
        guard.insert(relationship.id.clone(), relationship.clone());
        Ok(relationship.clone())
    }

    async fn create_if_absent(
        &self,
        relationship: &Relationship,
    ) -> Result<Upsert<Relationship>, StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.relationships.pin();
        if let Some(existing) = guard.get(relationship.id.as_str()) {
            return Ok(Upsert::Existing(existing.clone()));
        }
        guard.insert(relationship.id.clone(), relationship.clone());
        Ok(Upsert::Created(relationship.clone()))
    }
}

#[async_trait]
impl ConceptRelationshipService for InMemoryOmopStore {
    async fn find_by_id(
        &self,
        key: &ConceptRelationshipKey,
    ) -> Result<Option<ConceptRelationship>, StorageError> {
        Ok(self.concept_relationships.pin().get(key).cloned())
    }

    async fn create(
        &self,
        concept_relationship: &ConceptRelationship,
    ) -> Result<ConceptRelationship, StorageError> {
        let _write = self.writes.lock().await;
        let key = concept_relationship.key();
        let guard = self.concept_relationships.pin();
        if guard.get(&key).is_some() {
            return Err(StorageError::already_exists(
                "concept_relationship",
                format!(
                    "{}/{}/{}",
                    key.source_concept_id, key.target_concept_id, key.relationship_id
                ),
            ));
        }
        guard.insert(key, concept_relationship.clone());
        Ok(concept_relationship.clone())
    }

    async fn create_if_absent(
        &self,
        concept_relationship: &ConceptRelationship,
    ) -> Result<Upsert<ConceptRelationship>, StorageError> {
        let _write = self.writes.lock().await;
        let key = concept_relationship.key();
        let guard = self.concept_relationships.pin();
        if let Some(existing) = guard.get(&key) {
            return Ok(Upsert::Existing(existing.clone()));
        }
        guard.insert(key, concept_relationship.clone());
        Ok(Upsert::Created(concept_relationship.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omopfhir_storage::{ConceptField, Operator, ParameterType};

    fn concept(id: i64, name: &str, vocab: &str, code: &str) -> Concept {
        let mut c = Concept::vocabulary_metadata(id, name);
        c.vocabulary_id = vocab.into();
        c.concept_code = code.into();
        c.domain_id = "Measurement".into();
        c
    }

    #[tokio::test]
    async fn test_concept_create_and_find() {
        let store = InMemoryOmopStore::new();
        ConceptService::create(&store, &concept(10, "Glucose", "LOINC", "2345-7")).await.unwrap();

        let found = ConceptService::find_by_id(&store, 10).await.unwrap().unwrap();
        assert_eq!(found.name, "Glucose");
        assert!(ConceptService::find_by_id(&store, 11).await.unwrap().is_none());

        let by_code = store.find_by_code("LOINC", "2345-7").await.unwrap();
        assert_eq!(by_code.map(|c| c.id), Some(10));
        assert!(store.find_by_code("SNOMED", "2345-7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_concept_id_is_rejected() {
        let store = InMemoryOmopStore::new();
        ConceptService::create(&store, &concept(10, "A", "V", "1")).await.unwrap();
        let err = ConceptService::create(&store, &concept(10, "B", "V", "2")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_create_if_absent_returns_existing() {
        let store = InMemoryOmopStore::new();
        let first = ConceptService::create_if_absent(
            &store,
            &concept(10, "A", "V", "1"), ConceptMatch::VocabularyAndCode)
            .await
            .unwrap();
        assert!(first.was_created());

        let second = ConceptService::create_if_absent(
            &store,
            &concept(11, "A", "V", "1"), ConceptMatch::VocabularyAndCode)
            .await
            .unwrap();
        assert!(!second.was_created());
        assert_eq!(second.get().id, 10);
        assert_eq!(store.concept_count(), 1);

        let other_name = ConceptService::create_if_absent(
            &store,
            &concept(12, "B", "V", "1"), ConceptMatch::NameVocabularyAndCode)
            .await
            .unwrap();
        assert!(other_name.was_created());
    }

    #[tokio::test]
    async fn test_largest_id() {
        let store = InMemoryOmopStore::new();
        assert_eq!(store.get_largest_id().await.unwrap(), 0);
        ConceptService::create(&store, &concept(5, "A", "V", "1")).await.unwrap();
        ConceptService::create(&store, &concept(2_000_000_003, "B", "V", "2")).await.unwrap();
        assert_eq!(store.get_largest_id().await.unwrap(), 2_000_000_003);
    }

    #[tokio::test]
    async fn test_search_paging_and_sort() {
        let store = InMemoryOmopStore::new();
        for (id, name) in [(3, "c"), (1, "a"), (2, "b")] {
            ConceptService::create(&store, &concept(id, name, "V", &id.to_string())).await.unwrap();
        }
        let all = ParameterWrapper::new(ParameterType::String).with_condition(
            "vocabularyId",
            Operator::Equal,
            "V",
        );

        let page = store.search_with_params(1, 1, &[all.clone()], None).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, 2);

        let sort = SortSpec::descending(ConceptField::ConceptName);
        let sorted = store
            .search_with_params(0, 10, &[all], Some(&sort))
            .await
            .unwrap();
        let names: Vec<_> = sorted.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_vocabulary_and_relationship_upserts() {
        let store = InMemoryOmopStore::new();
        let vocab = Vocabulary {
            id: "LOCAL".into(),
            name: "Local".into(),
            reference: "http://example.org/local".into(),
            version: "2026-01-01".into(),
            vocabulary_concept_id: 2_000_000_000,
        };
        assert!(VocabularyService::create_if_absent(&store, &vocab).await.unwrap().was_created());
        assert!(!VocabularyService::create_if_absent(&store, &vocab).await.unwrap().was_created());
        assert!(VocabularyService::create(&store, &vocab).await.is_err());

        let rel = Relationship::equivalence("LOCAL", "LOINC");
        assert!(RelationshipService::create_if_absent(&store, &rel).await.unwrap().was_created());
        assert!(!RelationshipService::create_if_absent(&store, &rel).await.unwrap().was_created());

        let cr = ConceptRelationship::new(1, 2, rel.id.clone());
        assert!(ConceptRelationshipService::create_if_absent(&store, &cr).await.unwrap().was_created());
        assert!(!ConceptRelationshipService::create_if_absent(&store, &cr).await.unwrap().was_created());
        assert_eq!(store.concept_relationship_count(), 1);
        let found = ConceptRelationshipService::find_by_id(&store, &cr.key())
            .await
            .unwrap();
        assert_eq!(found, Some(cr));
    }
}
