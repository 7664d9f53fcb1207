//! Queries against the `concept_relationship` table.

use omopfhir_core::{ConceptRelationship, ConceptRelationshipKey};
use omopfhir_storage::{StorageError, Upsert};
use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgRow, Postgres};

use super::{advisory_lock, chrono_to_time, table, time_to_chrono};
use crate::error::query_error;

const COLUMNS: &str = "concept_id_1::bigint AS concept_id_1, concept_id_2::bigint AS concept_id_2, \
     relationship_id, valid_start_date, valid_end_date, invalid_reason";

fn key_label(key: &ConceptRelationshipKey) -> String {
    format!(
        "{}/{}/{}",
        key.source_concept_id, key.target_concept_id, key.relationship_id
    )
}

fn row_to_concept_relationship(row: &PgRow) -> Result<ConceptRelationship, StorageError> {
    let decode = |e: sqlx_core::error::Error| {
        StorageError::internal(format!("failed to decode concept_relationship row: {e}"))
    };
    Ok(ConceptRelationship {
        source_concept_id: row.try_get("concept_id_1").map_err(decode)?,
        target_concept_id: row.try_get("concept_id_2").map_err(decode)?,
        relationship_id: row.try_get("relationship_id").map_err(decode)?,
        valid_start_date: chrono_to_time(row.try_get("valid_start_date").map_err(decode)?)?,
        valid_end_date: chrono_to_time(row.try_get("valid_end_date").map_err(decode)?)?,
        invalid_reason: row.try_get("invalid_reason").map_err(decode)?,
    })
}

async fn select<'e, E>(
    executor: E,
    schema: &str,
    key: &ConceptRelationshipKey,
) -> Result<Option<ConceptRelationship>, StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {COLUMNS} FROM {} WHERE concept_id_1 = $1 AND concept_id_2 = $2 \
         AND relationship_id = $3",
        table(schema, "concept_relationship")
    );
    let row = query(&sql)
        .bind(key.source_concept_id)
        .bind(key.target_concept_id)
        .bind(&key.relationship_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| query_error(e, "concept_relationship", &key_label(key)))?;
    row.as_ref().map(row_to_concept_relationship).transpose()
}

async fn insert<'e, E>(
    executor: E,
    schema: &str,
    cr: &ConceptRelationship,
) -> Result<(), StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO {} (concept_id_1, concept_id_2, relationship_id, valid_start_date, \
         valid_end_date, invalid_reason) VALUES ($1, $2, $3, $4, $5, $6)",
        table(schema, "concept_relationship")
    );
    query(&sql)
        .bind(cr.source_concept_id)
        .bind(cr.target_concept_id)
        .bind(&cr.relationship_id)
        .bind(time_to_chrono(cr.valid_start_date)?)
        .bind(time_to_chrono(cr.valid_end_date)?)
        .bind(&cr.invalid_reason)
        .execute(executor)
        .await
        .map_err(|e| query_error(e, "concept_relationship", &key_label(&cr.key())))?;
    Ok(())
}

pub async fn find_by_id(
    pool: &PgPool,
    schema: &str,
    key: &ConceptRelationshipKey,
) -> Result<Option<ConceptRelationship>, StorageError> {
    select(pool, schema, key).await
}

pub async fn create(
    pool: &PgPool,
    schema: &str,
    cr: &ConceptRelationship,
) -> Result<ConceptRelationship, StorageError> {
    match create_if_absent(pool, schema, cr).await? {
        Upsert::Created(row) => Ok(row),
        Upsert::Existing(_) => Err(StorageError::already_exists(
            "concept_relationship",
            key_label(&cr.key()),
        )),
    }
}

pub async fn create_if_absent(
    pool: &PgPool,
    schema: &str,
    cr: &ConceptRelationship,
) -> Result<Upsert<ConceptRelationship>, StorageError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| query_error(e, "concept_relationship", "begin"))?;
    advisory_lock(&mut tx, "concept_relationship").await?;

    let result = match select(&mut *tx, schema, &cr.key()).await? {
        Some(existing) => Upsert::Existing(existing),
        None => {
            insert(&mut *tx, schema, cr).await?;
            Upsert::Created(cr.clone())
        }
    };
    tx.commit()
        .await
        .map_err(|e| query_error(e, "concept_relationship", "commit"))?;
    Ok(result)
}
