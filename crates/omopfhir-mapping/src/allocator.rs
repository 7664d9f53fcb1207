//! Concept ids for locally generated concepts.

use omopfhir_storage::{DynConceptService, StorageError};
use tokio::sync::Mutex;
use tracing::trace;

/// First id handed out to a locally generated concept. Standard OMOP
/// vocabularies stay below it.
pub const LOCAL_CONCEPT_ID_START: i64 = 2_000_000_000;

/// Hands out concept ids at or above [`LOCAL_CONCEPT_ID_START`].
///
/// Each allocation re-reads the largest id in the concept table, so the
/// counter heals itself after restarts or rows inserted by other tools.
/// Allocations within one process are serialized; two processes sharing a
/// CDM can still collide, which `create_if_absent` then reports.
pub struct ConceptIdAllocator {
    concepts: DynConceptService,
    last: Mutex<i64>,
}

impl ConceptIdAllocator {
    pub fn new(concepts: DynConceptService) -> Self {
        Self::with_start(concepts, LOCAL_CONCEPT_ID_START)
    }

    /// Allocator whose first id is at least `start`.
    pub fn with_start(concepts: DynConceptService, start: i64) -> Self {
        Self {
            concepts,
            last: Mutex::new(start - 1),
        }
    }

    /// Next free id: `max(last + 1, largest_existing + 1)`.
    pub async fn next_id(&self) -> Result<i64, StorageError> {
        let mut last = self.last.lock().await;
        let largest = self.concepts.get_largest_id().await?;
        let next = (*last + 1).max(largest + 1);
        *last = next;
        trace!(concept_id = next, largest, "allocated concept id");
        Ok(next)
    }

    /// Last id handed out, or `start - 1` before the first allocation.
    pub async fn last_allocated(&self) -> i64 {
        *self.last.lock().await
    }
}

impl std::fmt::Debug for ConceptIdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptIdAllocator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omopfhir_core::Concept;
    use omopfhir_db_memory::create_omop_services;

    #[tokio::test]
    async fn test_seeded_at_local_start() {
        let (_, services) = create_omop_services();
        services
            .concepts
            .create(&Concept::vocabulary_metadata(3004501, "LOINC"))
            .await
            .unwrap();

        let allocator = ConceptIdAllocator::new(services.concepts.clone());
        assert_eq!(allocator.next_id().await.unwrap(), LOCAL_CONCEPT_ID_START);
        assert_eq!(allocator.next_id().await.unwrap(), LOCAL_CONCEPT_ID_START + 1);
    }

    #[tokio::test]
    async fn test_follows_table_maximum() {
        let (_, services) = create_omop_services();
        let allocator = ConceptIdAllocator::new(services.concepts.clone());
        let first = allocator.next_id().await.unwrap();

        // another writer inserted well above the counter
        services
            .concepts
            .create(&Concept::vocabulary_metadata(first + 100, "Other"))
            .await
            .unwrap();
        assert_eq!(allocator.next_id().await.unwrap(), first + 101);
    }

    #[tokio::test]
    async fn test_strictly_increasing_without_inserts() {
        let (_, services) = create_omop_services();
        let allocator = ConceptIdAllocator::new(services.concepts.clone());
        let mut previous = allocator.last_allocated().await;
        for _ in 0..10 {
            let next = allocator.next_id().await.unwrap();
            assert!(next > previous);
            assert!(next >= LOCAL_CONCEPT_ID_START);
            previous = next;
        }
    }
}
