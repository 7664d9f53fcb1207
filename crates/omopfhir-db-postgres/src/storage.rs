//! PostgreSQL implementation of the OMOP service traits.

use async_trait::async_trait;
use sqlx_postgres::PgPool;

use omopfhir_core::{
    Concept, ConceptRelationship, ConceptRelationshipKey, Relationship, Vocabulary,
};
use omopfhir_storage::{
    ConceptMatch, ConceptRelationshipService, ConceptService, ParameterWrapper,
    RelationshipService, SortSpec, StorageError, Upsert, VocabularyService,
};

use crate::config::{PostgresConfig, is_identifier};
use crate::error::PostgresError;
use crate::pool;
use crate::queries;

/// OMOP vocabulary tables in an existing PostgreSQL CDM.
///
/// The CDM is never migrated; the tables must already exist under the
/// configured schema.
#[derive(Debug, Clone)]
pub struct PostgresOmopStore {
    pool: PgPool,
    schema: String,
}

impl PostgresOmopStore {
    /// Creates a new `PostgresOmopStore` with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the connection
    /// pool cannot be created, or the schema lacks a CDM vocabulary table.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(&config).await?;
        pool::verify_cdm_schema(&pool, &config.schema).await?;
        Ok(Self {
            pool,
            schema: config.schema,
        })
    }

    /// Creates a store from an existing connection pool.
    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Result<Self, StorageError> {
        let schema = schema.into();
        if !is_identifier(&schema) {
            return Err(PostgresError::config(format!("invalid schema name '{schema}'")).into());
        }
        Ok(Self { pool, schema })
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }
}

#[async_trait]
impl ConceptService for PostgresOmopStore {
    async fn search_with_params(
        &self,
        offset: usize,
        limit: usize,
        params: &[ParameterWrapper],
        sort: Option<&SortSpec>,
    ) -> Result<Vec<Concept>, StorageError> {
        queries::concept::search(&self.pool, &self.schema, offset, limit, params, sort).await
    }

    async fn find_by_id(&self, concept_id: i64) -> Result<Option<Concept>, StorageError> {
        queries::concept::find_by_id(&self.pool, &self.schema, concept_id).await
    }

    async fn create(&self, concept: &Concept) -> Result<Concept, StorageError> {
        queries::concept::create(&self.pool, &self.schema, concept).await
    }

    async fn create_if_absent(
        &self,
        concept: &Concept,
        key: ConceptMatch,
    ) -> Result<Upsert<Concept>, StorageError> {
        queries::concept::create_if_absent(&self.pool, &self.schema, concept, key).await
    }

    async fn get_largest_id(&self) -> Result<i64, StorageError> {
        queries::concept::largest_id(&self.pool, &self.schema).await
    }
}

#[async_trait]
impl VocabularyService for PostgresOmopStore {
    async fn find_by_id(&self, vocabulary_id: &str) -> Result<Option<Vocabulary>, StorageError> {
        queries::vocabulary::find_by_id(&self.pool, &self.schema, vocabulary_id).await
    }

    async fn create(&self, vocabulary: &Vocabulary) -> Result<Vocabulary, StorageError> {
        queries::vocabulary::create(&self.pool, &self.schema, vocabulary).await
    }

    async fn create_if_absent(
        &self,
        vocabulary: &Vocabulary,
    ) -> Result<Upsert<Vocabulary>, StorageError> {
        queries::vocabulary::create_if_absent(&self.pool, &self.schema, vocabulary).await
    }
}

#[async_trait]
impl RelationshipService for PostgresOmopStore {
    async fn find_by_id(
        &self,
        relationship_id: &str,
    ) -> Result<Option<Relationship>, StorageError> {
        queries::relationship::find_by_id(&self.pool, &self.schema, relationship_id).await
    }

    async fn create(&self, relationship: &Relationship) -> Result<Relationship, StorageError> {
        queries::relationship::create(&self.pool, &self.schema, relationship).await
    }

    async fn create_if_absent(
        &self,
        relationship: &Relationship,
    ) -> Result<Upsert<Relationship>, StorageError> {
        queries::relationship::create_if_absent(&self.pool, &self.schema, relationship).await
    }
}

#[async_trait]
impl ConceptRelationshipService for PostgresOmopStore {
    async fn find_by_id(
        &self,
        key: &ConceptRelationshipKey,
    ) -> Result<Option<ConceptRelationship>, StorageError> {
        queries::concept_relationship::find_by_id(&self.pool, &self.schema, key).await
    }

    async fn create(
        &self,
        concept_relationship: &ConceptRelationship,
    ) -> Result<ConceptRelationship, StorageError> {
        queries::concept_relationship::create(&self.pool, &self.schema, concept_relationship).await
    }

    async fn create_if_absent(
        &self,
        concept_relationship: &ConceptRelationship,
    ) -> Result<Upsert<ConceptRelationship>, StorageError> {
        queries::concept_relationship::create_if_absent(
            &self.pool,
            &self.schema,
            concept_relationship,
        )
        .await
    }
}
