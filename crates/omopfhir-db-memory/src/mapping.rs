//! In-memory implementation of the local mapping stores.

use async_trait::async_trait;
use omopfhir_core::Coding;
use omopfhir_storage::{
    CodeMapEntry, CodeMapStore, StateMapStore, StorageError, TwoLetterStateMapEntry,
    VocabularyMapEntry, VocabularyMapStore,
};
use papaya::HashMap as PapayaHashMap;
use tokio::sync::Mutex;

/// Vocabulary map, code map and state map held in papaya maps.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    vocabulary_map: PapayaHashMap<String, VocabularyMapEntry>,
    code_map: PapayaHashMap<i64, CodeMapEntry>,
    state_map: PapayaHashMap<String, TwoLetterStateMapEntry>,
    writes: Mutex<()>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VocabularyMapStore for InMemoryMappingStore {
    async fn save(&self, entry: &VocabularyMapEntry) -> Result<(), StorageError> {
        entry.validate()?;
        let _write = self.writes.lock().await;
        let guard = self.vocabulary_map.pin();
        if guard.get(entry.omop_vocabulary_id.as_str()).is_some() {
            return Err(StorageError::already_exists(
                "fhir_omop_vocabulary_map",
                &entry.omop_vocabulary_id,
            ));
        }
        guard.insert(entry.omop_vocabulary_id.clone(), entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &VocabularyMapEntry) -> Result<(), StorageError> {
        entry.validate()?;
        let _write = self.writes.lock().await;
        let guard = self.vocabulary_map.pin();
        if guard.get(entry.omop_vocabulary_id.as_str()).is_none() {
            return Err(StorageError::not_found(
                "fhir_omop_vocabulary_map",
                &entry.omop_vocabulary_id,
            ));
        }
        guard.insert(entry.omop_vocabulary_id.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, omop_vocabulary_id: &str) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        self.vocabulary_map.pin().remove(omop_vocabulary_id.trim());
        Ok(())
    }

    async fn get(&self) -> Result<Vec<VocabularyMapEntry>, StorageError> {
        let guard = self.vocabulary_map.pin();
        let mut entries: Vec<_> = guard.iter().map(|(_, e)| e.clone()).collect();
        entries.sort_by(|a, b| a.omop_vocabulary_id.cmp(&b.omop_vocabulary_id));
        Ok(entries)
    }

    async fn lookup_vocabulary_by_fhir_system(
        &self,
        fhir_system_name: &str,
    ) -> Result<Option<String>, StorageError> {
        if fhir_system_name.trim().is_empty() {
            return Ok(None);
        }
        let guard = self.vocabulary_map.pin();
        Ok(guard
            .iter()
            .map(|(_, e)| e)
            .filter(|e| e.matches_system(fhir_system_name))
            .map(|e| e.omop_vocabulary_id.clone())
            .min())
    }

    async fn lookup_fhir_system_by_vocabulary(
        &self,
        omop_vocabulary_id: &str,
    ) -> Result<Option<String>, StorageError> {
        let guard = self.vocabulary_map.pin();
        Ok(guard
            .get(omop_vocabulary_id.trim())
            .and_then(|e| e.fhir_system().map(str::to_string)))
    }
}

#[async_trait]
impl CodeMapStore for InMemoryMappingStore {
    async fn save(&self, entry: &CodeMapEntry) -> Result<(), StorageError> {
        entry.validate()?;
        let _write = self.writes.lock().await;
        let guard = self.code_map.pin();
        if guard.get(&entry.omop_concept).is_some() {
            return Err(StorageError::already_exists(
                "fhir_omop_code_map",
                entry.omop_concept.to_string(),
            ));
        }
        guard.insert(entry.omop_concept, entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &CodeMapEntry) -> Result<(), StorageError> {
        entry.validate()?;
        let _write = self.writes.lock().await;
        let guard = self.code_map.pin();
        if guard.get(&entry.omop_concept).is_none() {
            return Err(StorageError::not_found(
                "fhir_omop_code_map",
                entry.omop_concept.to_string(),
            ));
        }
        guard.insert(entry.omop_concept, entry.clone());
        Ok(())
    }

    async fn delete(&self, omop_concept: i64) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        self.code_map.pin().remove(&omop_concept);
        Ok(())
    }

    async fn get(&self) -> Result<Vec<CodeMapEntry>, StorageError> {
        let guard = self.code_map.pin();
        let mut entries: Vec<_> = guard.iter().map(|(_, e)| e.clone()).collect();
        entries.sort_by_key(|e| e.omop_concept);
        Ok(entries)
    }

    async fn lookup_omop_concept_by_coding(
        &self,
        system: &str,
        code: &str,
    ) -> Result<Option<i64>, StorageError> {
        let (system, code) = (system.trim(), code.trim());
        if system.is_empty() || code.is_empty() {
            return Ok(None);
        }
        let guard = self.code_map.pin();
        Ok(guard
            .iter()
            .map(|(_, e)| e)
            .filter(|e| e.fhir_system == system && e.fhir_code == code)
            .map(|e| e.omop_concept)
            .min())
    }

    async fn lookup_coding_by_omop_concept(
        &self,
        omop_concept: i64,
    ) -> Result<Option<Coding>, StorageError> {
        Ok(self
            .code_map
            .pin()
            .get(&omop_concept)
            .map(CodeMapEntry::to_coding))
    }

    async fn lookup_coding_by_display_text(
        &self,
        text: &str,
    ) -> Result<Option<Coding>, StorageError> {
        let guard = self.code_map.pin();
        Ok(guard
            .iter()
            .map(|(_, e)| e)
            .filter(|e| e.fhir_display == text)
            .min_by_key(|e| e.omop_concept)
            .map(CodeMapEntry::to_coding))
    }
}

#[async_trait]
impl StateMapStore for InMemoryMappingStore {
    async fn save(&self, entry: &TwoLetterStateMapEntry) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.state_map.pin();
        if guard.get(entry.state_name.as_str()).is_some() {
            return Err(StorageError::already_exists(
                "two_letter_state_map",
                &entry.state_name,
            ));
        }
        guard.insert(entry.state_name.clone(), entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &TwoLetterStateMapEntry) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.state_map.pin();
        if guard.get(entry.state_name.as_str()).is_none() {
            return Err(StorageError::not_found("two_letter_state_map", &entry.state_name));
        }
        guard.insert(entry.state_name.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, state_name: &str) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        self.state_map.pin().remove(state_name.trim());
        Ok(())
    }

    async fn get(&self) -> Result<Vec<TwoLetterStateMapEntry>, StorageError> {
        let guard = self.state_map.pin();
        let mut entries: Vec<_> = guard.iter().map(|(_, e)| e.clone()).collect();
        entries.sort_by(|a, b| a.state_name.cmp(&b.state_name));
        Ok(entries)
    }

    async fn lookup_two_letter(&self, state_name: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .state_map
            .pin()
            .get(state_name.trim())
            .map(|e| e.two_letter.clone()))
    }
}
