//! SQLite implementation of the local mapping stores.

use async_trait::async_trait;
use omopfhir_core::Coding;
use omopfhir_storage::{
    CodeMapEntry, CodeMapStore, StateMapStore, StorageError, TwoLetterStateMapEntry,
    VocabularyMapEntry, VocabularyMapStore,
};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_sqlite::SqlitePool;
use tracing::debug;

use crate::config::SqliteConfig;
use crate::error::query_error;
use crate::{migrations, pool};

const VOCABULARY_MAP: &str = "fhir_omop_vocabulary_map";
const CODE_MAP: &str = "fhir_omop_code_map";
const STATE_MAP: &str = "two_letter_state_map";

/// Vocabulary map, code map and state map in one embedded database.
#[derive(Debug, Clone)]
pub struct SqliteMappingStore {
    pool: SqlitePool,
}

impl SqliteMappingStore {
    /// Opens the database and, if configured, applies pending migrations.
    pub async fn new(config: &SqliteConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Wraps an existing pool. Migrations are not run.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl VocabularyMapStore for SqliteMappingStore {
    async fn save(&self, entry: &VocabularyMapEntry) -> Result<(), StorageError> {
        entry.validate()?;
        query(
            "INSERT INTO fhir_omop_vocabulary_map (omop_vocabulary_id, fhir_url_system, other_system) \
             VALUES (?1, ?2, ?3)",
        )
        .bind(&entry.omop_vocabulary_id)
        .bind(&entry.fhir_url_system)
        .bind(&entry.other_system_name)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error(e, VOCABULARY_MAP, &entry.omop_vocabulary_id))?;
        debug!(vocabulary = %entry.omop_vocabulary_id, "Saved vocabulary map entry");
        Ok(())
    }

    async fn update(&self, entry: &VocabularyMapEntry) -> Result<(), StorageError> {
        entry.validate()?;
        let result = query(
            "UPDATE fhir_omop_vocabulary_map SET fhir_url_system = ?2, other_system = ?3 \
             WHERE omop_vocabulary_id = ?1",
        )
        .bind(&entry.omop_vocabulary_id)
        .bind(&entry.fhir_url_system)
        .bind(&entry.other_system_name)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error(e, VOCABULARY_MAP, &entry.omop_vocabulary_id))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(VOCABULARY_MAP, &entry.omop_vocabulary_id));
        }
        Ok(())
    }

    async fn delete(&self, omop_vocabulary_id: &str) -> Result<(), StorageError> {
        let id = omop_vocabulary_id.trim();
        query("DELETE FROM fhir_omop_vocabulary_map WHERE omop_vocabulary_id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(e, VOCABULARY_MAP, id))?;
        Ok(())
    }

    async fn get(&self) -> Result<Vec<VocabularyMapEntry>, StorageError> {
        let rows: Vec<(String, Option<String>, Option<String>)> = query_as(
            "SELECT omop_vocabulary_id, fhir_url_system, other_system \
             FROM fhir_omop_vocabulary_map ORDER BY omop_vocabulary_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error(e, VOCABULARY_MAP, "*"))?;

        Ok(rows
            .into_iter()
            .map(|(omop_vocabulary_id, url, other)| VocabularyMapEntry {
                omop_vocabulary_id,
                fhir_url_system: non_blank(url),
                other_system_name: non_blank(other),
            })
            .collect())
    }

    async fn lookup_vocabulary_by_fhir_system(
        &self,
        fhir_system_name: &str,
    ) -> Result<Option<String>, StorageError> {
        let name = fhir_system_name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        let row: Option<(String,)> = query_as(
            "SELECT omop_vocabulary_id FROM fhir_omop_vocabulary_map \
             WHERE fhir_url_system = ?1 OR other_system = ?1 \
             ORDER BY omop_vocabulary_id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error(e, VOCABULARY_MAP, name))?;
        Ok(row.map(|(id,)| id))
    }

    async fn lookup_fhir_system_by_vocabulary(
        &self,
        omop_vocabulary_id: &str,
    ) -> Result<Option<String>, StorageError> {
        let id = omop_vocabulary_id.trim();
        let row: Option<(Option<String>, Option<String>)> = query_as(
            "SELECT fhir_url_system, other_system FROM fhir_omop_vocabulary_map \
             WHERE omop_vocabulary_id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error(e, VOCABULARY_MAP, id))?;
        Ok(row.and_then(|(url, other)| non_blank(url).or(non_blank(other))))
    }
}

#[async_trait]
impl CodeMapStore for SqliteMappingStore {
    async fn save(&self, entry: &CodeMapEntry) -> Result<(), StorageError> {
        entry.validate()?;
        let key = entry.omop_concept.to_string();
        query(
            "INSERT INTO fhir_omop_code_map (omop_concept, fhir_system, fhir_code, fhir_display) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(entry.omop_concept)
        .bind(&entry.fhir_system)
        .bind(&entry.fhir_code)
        .bind(&entry.fhir_display)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error(e, CODE_MAP, &key))?;
        debug!(concept = entry.omop_concept, "Saved code map entry");
        Ok(())
    }

    async fn update(&self, entry: &CodeMapEntry) -> Result<(), StorageError> {
        entry.validate()?;
        let key = entry.omop_concept.to_string();
        let result = query(
            "UPDATE fhir_omop_code_map SET fhir_system = ?2, fhir_code = ?3, fhir_display = ?4 \
             WHERE omop_concept = ?1",
        )
        .bind(entry.omop_concept)
        .bind(&entry.fhir_system)
        .bind(&entry.fhir_code)
        .bind(&entry.fhir_display)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error(e, CODE_MAP, &key))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(CODE_MAP, key));
        }
        Ok(())
    }

    async fn delete(&self, omop_concept: i64) -> Result<(), StorageError> {
        query("DELETE FROM fhir_omop_code_map WHERE omop_concept = ?1")
            .bind(omop_concept)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(e, CODE_MAP, &omop_concept.to_string()))?;
        Ok(())
    }

    async fn get(&self) -> Result<Vec<CodeMapEntry>, StorageError> {
        let rows: Vec<(i64, String, String, String)> = query_as(
            "SELECT omop_concept, fhir_system, fhir_code, fhir_display \
             FROM fhir_omop_code_map ORDER BY omop_concept",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error(e, CODE_MAP, "*"))?;

        Ok(rows
            .into_iter()
            .map(|(omop_concept, fhir_system, fhir_code, fhir_display)| CodeMapEntry {
                omop_concept,
                fhir_system,
                fhir_code,
                fhir_display,
            })
            .collect())
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
        let row: Option<(i64,)> = query_as(
            "SELECT omop_concept FROM fhir_omop_code_map \
             WHERE fhir_system = ?1 AND fhir_code = ?2 ORDER BY omop_concept LIMIT 1",
        )
        .bind(system)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error(e, CODE_MAP, &format!("{system}|{code}")))?;
        Ok(row.map(|(id,)| id))
    }

    async fn lookup_coding_by_omop_concept(
        &self,
        omop_concept: i64,
    ) -> Result<Option<Coding>, StorageError> {
        let row: Option<(String, String, String)> = query_as(
            "SELECT fhir_system, fhir_code, fhir_display FROM fhir_omop_code_map \
             WHERE omop_concept = ?1",
        )
        .bind(omop_concept)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error(e, CODE_MAP, &omop_concept.to_string()))?;
        Ok(row.map(|(fhir_system, fhir_code, fhir_display)| {
            CodeMapEntry {
                omop_concept,
                fhir_system,
                fhir_code,
                fhir_display,
            }
            .to_coding()
        }))
    }

    async fn lookup_coding_by_display_text(
        &self,
        text: &str,
    ) -> Result<Option<Coding>, StorageError> {
        let row: Option<(i64, String, String, String)> = query_as(
            "SELECT omop_concept, fhir_system, fhir_code, fhir_display FROM fhir_omop_code_map \
             WHERE fhir_display = ?1 ORDER BY omop_concept LIMIT 1",
        )
        .bind(text)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error(e, CODE_MAP, text))?;
        Ok(row.map(|(omop_concept, fhir_system, fhir_code, fhir_display)| {
            CodeMapEntry {
                omop_concept,
                fhir_system,
                fhir_code,
                fhir_display,
            }
            .to_coding()
        }))
    }
}

#[async_trait]
impl StateMapStore for SqliteMappingStore {
    async fn save(&self, entry: &TwoLetterStateMapEntry) -> Result<(), StorageError> {
        query("INSERT INTO two_letter_state_map (state_name, two_letter) VALUES (?1, ?2)")
            .bind(&entry.state_name)
            .bind(&entry.two_letter)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(e, STATE_MAP, &entry.state_name))?;
        Ok(())
    }

    async fn update(&self, entry: &TwoLetterStateMapEntry) -> Result<(), StorageError> {
        let result = query("UPDATE two_letter_state_map SET two_letter = ?2 WHERE state_name = ?1")
            .bind(&entry.state_name)
            .bind(&entry.two_letter)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(e, STATE_MAP, &entry.state_name))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(STATE_MAP, &entry.state_name));
        }
        Ok(())
    }

    async fn delete(&self, state_name: &str) -> Result<(), StorageError> {
        let name = state_name.trim();
        query("DELETE FROM two_letter_state_map WHERE state_name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(e, STATE_MAP, name))?;
        Ok(())
    }

    async fn get(&self) -> Result<Vec<TwoLetterStateMapEntry>, StorageError> {
        let rows: Vec<(String, String)> = query_as(
            "SELECT state_name, two_letter FROM two_letter_state_map ORDER BY state_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error(e, STATE_MAP, "*"))?;
        Ok(rows
            .into_iter()
            .map(|(state_name, two_letter)| TwoLetterStateMapEntry {
                state_name,
                two_letter,
            })
            .collect())
    }

    async fn lookup_two_letter(&self, state_name: &str) -> Result<Option<String>, StorageError> {
        let name = state_name.trim();
        let row: Option<(String,)> =
            query_as("SELECT two_letter FROM two_letter_state_map WHERE state_name = ?1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| query_error(e, STATE_MAP, name))?;
        Ok(row.map(|(two_letter,)| two_letter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteMappingStore {
        SqliteMappingStore::new(&SqliteConfig::in_memory())
            .await
            .expect("in-memory store")
    }

    #[tokio::test]
    async fn test_vocabulary_map_round_trip() {
        let store = store().await;
        let entry = VocabularyMapEntry::for_system("LOCAL1", "http://example.org/local1").unwrap();
        VocabularyMapStore::save(&store, &entry).await.unwrap();

        assert_eq!(
            store
                .lookup_vocabulary_by_fhir_system("http://example.org/local1")
                .await
                .unwrap()
                .as_deref(),
            Some("LOCAL1")
        );
        assert_eq!(
            store
                .lookup_fhir_system_by_vocabulary("LOCAL1")
                .await
                .unwrap()
                .as_deref(),
            Some("http://example.org/local1")
        );
        assert_eq!(VocabularyMapStore::get(&store).await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_vocabulary_map_primary_key() {
        let store = store().await;
        let entry = VocabularyMapEntry::for_system("LOCAL1", "Local One").unwrap();
        VocabularyMapStore::save(&store, &entry).await.unwrap();
        let err = VocabularyMapStore::save(&store, &entry).await.unwrap_err();
        assert!(err.is_already_exists());

        let missing = VocabularyMapEntry::for_system("NOPE", "x").unwrap();
        let err = VocabularyMapStore::update(&store, &missing).await.unwrap_err();
        assert!(err.is_not_found());

        VocabularyMapStore::delete(&store, "LOCAL1").await.unwrap();
        VocabularyMapStore::delete(&store, "LOCAL1").await.unwrap();
        assert!(
            store
                .lookup_vocabulary_by_fhir_system("Local One")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_code_map_asymmetric_lookup() {
        let store = store().await;
        let entry = CodeMapEntry::new(99001, "http://loinc.org", "1234-5", "Test").unwrap();
        CodeMapStore::save(&store, &entry).await.unwrap();

        assert_eq!(
            store
                .lookup_omop_concept_by_coding("http://loinc.org", "1234-5")
                .await
                .unwrap(),
            Some(99001)
        );
        let coding = store.lookup_coding_by_omop_concept(99001).await.unwrap().unwrap();
        assert_eq!(coding.system.as_deref(), Some("http://loinc.org"));
        assert_eq!(coding.code.as_deref(), Some("1234-5"));
        assert_eq!(coding.display.as_deref(), Some("Test"));

        assert_eq!(
            store.lookup_omop_concept_by_coding("http://loinc.org", "").await.unwrap(),
            None
        );
        assert_eq!(
            store.lookup_coding_by_display_text("Test").await.unwrap(),
            Some(coding)
        );
    }

    #[tokio::test]
    async fn test_code_map_update_and_delete() {
        let store = store().await;
        let entry = CodeMapEntry::new(7, "http://a", "x", "").unwrap();
        CodeMapStore::save(&store, &entry).await.unwrap();

        let updated = CodeMapEntry::new(7, "http://b", "y", "Why").unwrap();
        CodeMapStore::update(&store, &updated).await.unwrap();
        assert_eq!(CodeMapStore::get(&store).await.unwrap(), vec![updated]);

        CodeMapStore::delete(&store, 7).await.unwrap();
        assert!(CodeMapStore::get(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_map_is_seeded() {
        let store = store().await;
        assert_eq!(
            store.lookup_two_letter("Georgia").await.unwrap().as_deref(),
            Some("GA")
        );
        assert_eq!(
            store.lookup_two_letter(" Puerto Rico ").await.unwrap().as_deref(),
            Some("PR")
        );
        assert!(store.lookup_two_letter("Atlantis").await.unwrap().is_none());

        StateMapStore::update(&store, &TwoLetterStateMapEntry::new("Georgia", "GE"))
            .await
            .unwrap();
        assert_eq!(
            store.lookup_two_letter("Georgia").await.unwrap().as_deref(),
            Some("GE")
        );
    }

    #[tokio::test]
    async fn test_file_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("map.db").display());

        let first = SqliteMappingStore::new(&SqliteConfig::new(&url)).await.unwrap();
        let entry = VocabularyMapEntry::for_system("LOCAL1", "http://x").unwrap();
        VocabularyMapStore::save(&first, &entry).await.unwrap();
        first.pool().close().await;

        let second = SqliteMappingStore::new(&SqliteConfig::new(&url)).await.unwrap();
        assert_eq!(
            second
                .lookup_fhir_system_by_vocabulary("LOCAL1")
                .await
                .unwrap()
                .as_deref(),
            Some("http://x")
        );
    }
}
