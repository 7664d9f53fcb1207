//! Queries against the `relationship` table.
//!
//! The CDM stores the two flags as `'1'` / `'0'` strings.

use omopfhir_core::Relationship;
use omopfhir_storage::{StorageError, Upsert};
use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgRow, Postgres};

use super::{advisory_lock, table};
use crate::error::query_error;

const COLUMNS: &str = "relationship_id, relationship_name, is_hierarchical, defines_ancestry, \
     reverse_relationship_id, relationship_concept_id::bigint AS relationship_concept_id";

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn row_to_relationship(row: &PgRow) -> Result<Relationship, StorageError> {
    let decode = |e: sqlx_core::error::Error| {
        StorageError::internal(format!("failed to decode relationship row: {e}"))
    };
    let is_hierarchical: String = row.try_get("is_hierarchical").map_err(decode)?;
    let defines_ancestry: String = row.try_get("defines_ancestry").map_err(decode)?;
    Ok(Relationship {
        id: row.try_get("relationship_id").map_err(decode)?,
        name: row.try_get("relationship_name").map_err(decode)?,
        is_hierarchical: is_hierarchical.trim() == "1",
        defines_ancestry: defines_ancestry.trim() == "1",
        reverse_relationship_id: row.try_get("reverse_relationship_id").map_err(decode)?,
        relationship_concept_id: row.try_get("relationship_concept_id").map_err(decode)?,
    })
}

async fn select<'e, E>(
    executor: E,
    schema: &str,
    relationship_id: &str,
) -> Result<Option<Relationship>, StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {COLUMNS} FROM {} WHERE relationship_id = $1",
        table(schema, "relationship")
    );
    let row = query(&sql)
        .bind(relationship_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| query_error(e, "relationship", relationship_id))?;
    row.as_ref().map(row_to_relationship).transpose()
}

async fn insert<'e, E>(
    executor: E,
    schema: &str,
    relationship: &Relationship,
) -> Result<(), StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO {} (relationship_id, relationship_name, is_hierarchical, defines_ancestry, \
         reverse_relationship_id, relationship_concept_id) VALUES ($1, $2, $3, $4, $5, $6)",
        table(schema, "relationship")
    );
    query(&sql)
        .bind(&relationship.id)
        .bind(&relationship.name)
        .bind(flag(relationship.is_hierarchical))
        .bind(flag(relationship.defines_ancestry))
        .bind(&relationship.reverse_relationship_id)
        .bind(relationship.relationship_concept_id)
        .execute(executor)
        .await
        .map_err(|e| query_error(e, "relationship", &relationship.id))?;
    Ok(())
}

pub async fn find_by_id(
    pool: &PgPool,
    schema: &str,
    relationship_id: &str,
) -> Result<Option<Relationship>, StorageError> {
    select(pool, schema, relationship_id).await
}

pub async fn create(
    pool: &PgPool,
    schema: &str,
    relationship: &Relationship,
) -> Result<Relationship, StorageError> {
    match create_if_absent(pool, schema, relationship).await? {
        Upsert::Created(r) => Ok(r),
        Upsert::Existing(_) => Err(StorageError::already_exists(
            "relationship",
            &relationship.id,
        )),
    }
}

pub async fn create_if_absent(
    pool: &PgPool,
    schema: &str,
    relationship: &Relationship,
) -> Result<Upsert<Relationship>, StorageError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| query_error(e, "relationship", "begin"))?;
    advisory_lock(&mut tx, "relationship").await?;

    let result = match select(&mut *tx, schema, &relationship.id).await? {
        Some(existing) => Upsert::Existing(existing),
        None => {
            insert(&mut *tx, schema, relationship).await?;
            Upsert::Created(relationship.clone())
        }
    };
    tx.commit()
        .await
        .map_err(|e| query_error(e, "relationship", "commit"))?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_encoding() {
        assert_eq!(flag(true), "1");
        assert_eq!(flag(false), "0");
    }
}
