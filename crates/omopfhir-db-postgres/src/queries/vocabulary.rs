//! Queries against the `vocabulary` table.

use omopfhir_core::Vocabulary;
use omopfhir_storage::{StorageError, Upsert};
use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgRow, Postgres};

use super::{advisory_lock, table};
use crate::error::query_error;

const COLUMNS: &str = "vocabulary_id, vocabulary_name, vocabulary_reference, vocabulary_version, \
     vocabulary_concept_id::bigint AS vocabulary_concept_id";

fn row_to_vocabulary(row: &PgRow) -> Result<Vocabulary, StorageError> {
    let decode = |e: sqlx_core::error::Error| {
        StorageError::internal(format!("failed to decode vocabulary row: {e}"))
    };
    Ok(Vocabulary {
        id: row.try_get("vocabulary_id").map_err(decode)?,
        name: row.try_get("vocabulary_name").map_err(decode)?,
        reference: row
            .try_get::<Option<String>, _>("vocabulary_reference")
            .map_err(decode)?
            .unwrap_or_default(),
        version: row
            .try_get::<Option<String>, _>("vocabulary_version")
            .map_err(decode)?
            .unwrap_or_default(),
        vocabulary_concept_id: row.try_get("vocabulary_concept_id").map_err(decode)?,
    })
}

async fn select<'e, E>(
    executor: E,
    schema: &str,
    vocabulary_id: &str,
) -> Result<Option<Vocabulary>, StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {COLUMNS} FROM {} WHERE vocabulary_id = $1",
        table(schema, "vocabulary")
    );
    let row = query(&sql)
        .bind(vocabulary_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| query_error(e, "vocabulary", vocabulary_id))?;
    row.as_ref().map(row_to_vocabulary).transpose()
}

async fn insert<'e, E>(executor: E, schema: &str, vocabulary: &Vocabulary) -> Result<(), StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO {} (vocabulary_id, vocabulary_name, vocabulary_reference, \
         vocabulary_version, vocabulary_concept_id) VALUES ($1, $2, $3, $4, $5)",
        table(schema, "vocabulary")
    );
    query(&sql)
        .bind(&vocabulary.id)
        .bind(&vocabulary.name)
        .bind(&vocabulary.reference)
        .bind(&vocabulary.version)
        .bind(vocabulary.vocabulary_concept_id)
        .execute(executor)
        .await
        .map_err(|e| query_error(e, "vocabulary", &vocabulary.id))?;
    Ok(())
}

pub async fn find_by_id(
    pool: &PgPool,
    schema: &str,
    vocabulary_id: &str,
) -> Result<Option<Vocabulary>, StorageError> {
    select(pool, schema, vocabulary_id).await
}

pub async fn create(
    pool: &PgPool,
    schema: &str,
    vocabulary: &Vocabulary,
) -> Result<Vocabulary, StorageError> {
    match create_if_absent(pool, schema, vocabulary).await? {
        Upsert::Created(v) => Ok(v),
        Upsert::Existing(_) => Err(StorageError::already_exists("vocabulary", &vocabulary.id)),
    }
}

pub async fn create_if_absent(
    pool: &PgPool,
    schema: &str,
    vocabulary: &Vocabulary,
) -> Result<Upsert<Vocabulary>, StorageError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| query_error(e, "vocabulary", "begin"))?;
    advisory_lock(&mut tx, "vocabulary").await?;

    let result = match select(&mut *tx, schema, &vocabulary.id).await? {
        Some(existing) => Upsert::Existing(existing),
        None => {
            insert(&mut *tx, schema, vocabulary).await?;
            Upsert::Created(vocabulary.clone())
        }
    };
    tx.commit()
        .await
        .map_err(|e| query_error(e, "vocabulary", "commit"))?;
    Ok(result)
}
