//! Queries against the `concept` table.

use chrono::NaiveDate;
use omopfhir_core::Concept;
use omopfhir_storage::{
    ConceptField, ConceptMatch, Operator, ParameterType, ParameterWrapper, SortSpec, StorageError,
    Upsert,
};
use sqlx_core::executor::Executor;
use sqlx_core::query::{Query, query};
use sqlx_core::query_scalar::query_scalar;
use sqlx_core::row::Row;
use sqlx_postgres::{PgArguments, PgPool, PgRow, Postgres};

use super::{advisory_lock, chrono_to_time, table, time_to_chrono};
use crate::error::query_error;

const COLUMNS: &str = "concept_id::bigint AS concept_id, concept_name, domain_id, vocabulary_id, \
     concept_class_id, standard_concept, concept_code, valid_start_date, valid_end_date, \
     invalid_reason";

/// A typed value bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindValue {
    Text(String),
    Long(i64),
    Date(NaiveDate),
}

/// A `WHERE` clause with its bind values in placeholder order.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct WhereClause {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

#[derive(Clone, Copy, PartialEq)]
enum ColumnKind {
    Text,
    Long,
    Date,
}

fn column_kind(field: ConceptField) -> ColumnKind {
    match field {
        ConceptField::ConceptId => ColumnKind::Long,
        ConceptField::ValidStartDate | ConceptField::ValidEndDate => ColumnKind::Date,
        _ => ColumnKind::Text,
    }
}

/// Translates parameter wrappers into SQL.
///
/// Column names come from [`ConceptField::column`], never from caller input;
/// values are always bound.
pub(crate) fn build_where(params: &[ParameterWrapper]) -> Result<WhereClause, StorageError> {
    let mut clause = WhereClause::default();
    let mut groups = Vec::with_capacity(params.len());

    for wrapper in params {
        let mut parts = Vec::new();
        for condition in wrapper.conditions()? {
            let column = condition.field.column();
            let kind = column_kind(condition.field);
            let placeholder = clause.binds.len() + 1;

            if condition.operator == Operator::Like {
                parts.push(format!("{column}::text LIKE ${placeholder}"));
                clause.binds.push(BindValue::Text(condition.value.to_string()));
                continue;
            }

            let op = condition.operator.sql();
            let (expr, bind) = match (condition.parameter_type, kind) {
                (ParameterType::String, ColumnKind::Text) => {
                    (column.to_string(), BindValue::Text(condition.value.to_string()))
                }
                (ParameterType::String, _) => (
                    format!("{column}::text"),
                    BindValue::Text(condition.value.to_string()),
                ),
                (ParameterType::Long, ColumnKind::Long) => {
                    (column.to_string(), BindValue::Long(parse_long(condition.value)?))
                }
                (ParameterType::Date, ColumnKind::Date) => {
                    (column.to_string(), BindValue::Date(parse_date(condition.value)?))
                }
                (ty, _) => {
                    return Err(StorageError::invalid_query(format!(
                        "{ty:?} parameter cannot be compared with {column}"
                    )));
                }
            };
            parts.push(format!("{expr} {op} ${placeholder}"));
            clause.binds.push(bind);
        }
        let joiner = format!(" {} ", wrapper.boolean_relationship.sql());
        groups.push(format!("({})", parts.join(&joiner)));
    }

    if !groups.is_empty() {
        clause.sql = format!(" WHERE {}", groups.join(" AND "));
    }
    Ok(clause)
}

fn bind_all<'q>(
    mut q: Query<'q, Postgres, PgArguments>,
    binds: Vec<BindValue>,
) -> Query<'q, Postgres, PgArguments> {
    for bind in binds {
        q = match bind {
            BindValue::Text(s) => q.bind(s),
            BindValue::Long(v) => q.bind(v),
            BindValue::Date(d) => q.bind(d),
        };
    }
    q
}

fn parse_long(value: &str) -> Result<i64, StorageError> {
    value
        .trim()
        .parse()
        .map_err(|_| StorageError::invalid_query(format!("'{value}' is not an integer")))
}

fn parse_date(value: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| StorageError::invalid_query(format!("'{value}' is not a YYYY-MM-DD date")))
}

fn order_by(sort: Option<&SortSpec>) -> String {
    match sort {
        Some(s) if s.field != ConceptField::ConceptId => format!(
            " ORDER BY {} {}, concept_id",
            s.field.column(),
            if s.descending { "DESC" } else { "ASC" }
        ),
        Some(s) if s.descending => " ORDER BY concept_id DESC".to_string(),
        _ => " ORDER BY concept_id".to_string(),
    }
}

fn row_to_concept(row: &PgRow) -> Result<Concept, StorageError> {
    let decode = |e: sqlx_core::error::Error| {
        StorageError::internal(format!("failed to decode concept row: {e}"))
    };
    Ok(Concept {
        id: row.try_get("concept_id").map_err(decode)?,
        name: row.try_get("concept_name").map_err(decode)?,
        domain_id: row.try_get("domain_id").map_err(decode)?,
        vocabulary_id: row.try_get("vocabulary_id").map_err(decode)?,
        concept_class_id: row.try_get("concept_class_id").map_err(decode)?,
        standard_concept: row.try_get("standard_concept").map_err(decode)?,
        concept_code: row.try_get("concept_code").map_err(decode)?,
        valid_start_date: chrono_to_time(row.try_get("valid_start_date").map_err(decode)?)?,
        valid_end_date: chrono_to_time(row.try_get("valid_end_date").map_err(decode)?)?,
        invalid_reason: row.try_get("invalid_reason").map_err(decode)?,
    })
}

pub async fn search(
    pool: &PgPool,
    schema: &str,
    offset: usize,
    limit: usize,
    params: &[ParameterWrapper],
    sort: Option<&SortSpec>,
) -> Result<Vec<Concept>, StorageError> {
    let clause = build_where(params)?;
    let n = clause.binds.len();
    let sql = format!(
        "SELECT {COLUMNS} FROM {}{}{} LIMIT ${} OFFSET ${}",
        table(schema, "concept"),
        clause.sql,
        order_by(sort),
        n + 1,
        n + 2
    );

    let rows = bind_all(query(&sql), clause.binds)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(pool)
        .await
        .map_err(|e| query_error(e, "concept", "search"))?;

    rows.iter().map(row_to_concept).collect()
}

pub async fn find_by_id(
    pool: &PgPool,
    schema: &str,
    concept_id: i64,
) -> Result<Option<Concept>, StorageError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM {} WHERE concept_id = $1",
        table(schema, "concept")
    );
    let row = query(&sql)
        .bind(concept_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| query_error(e, "concept", &concept_id.to_string()))?;
    row.as_ref().map(row_to_concept).transpose()
}

fn insert_sql(schema: &str) -> String {
    format!(
        "INSERT INTO {} (concept_id, concept_name, domain_id, vocabulary_id, concept_class_id, \
         standard_concept, concept_code, valid_start_date, valid_end_date, invalid_reason) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        table(schema, "concept")
    )
}

async fn insert<'e, E>(executor: E, schema: &str, concept: &Concept) -> Result<(), StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = insert_sql(schema);
    query(&sql)
        .bind(concept.id)
        .bind(&concept.name)
        .bind(&concept.domain_id)
        .bind(&concept.vocabulary_id)
        .bind(&concept.concept_class_id)
        .bind(&concept.standard_concept)
        .bind(&concept.concept_code)
        .bind(time_to_chrono(concept.valid_start_date)?)
        .bind(time_to_chrono(concept.valid_end_date)?)
        .bind(&concept.invalid_reason)
        .execute(executor)
        .await
        .map_err(|e| query_error(e, "concept", &concept.id.to_string()))?;
    Ok(())
}

/// Inserts a concept, failing with `AlreadyExists` when the id is taken.
pub async fn create(pool: &PgPool, schema: &str, concept: &Concept) -> Result<Concept, StorageError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| query_error(e, "concept", "begin"))?;
    advisory_lock(&mut tx, "concept").await?;

    let exists_sql = format!("SELECT 1 FROM {} WHERE concept_id = $1", table(schema, "concept"));
    let exists: Option<i32> = query_scalar(&exists_sql)
        .bind(concept.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| query_error(e, "concept", &concept.id.to_string()))?;
    if exists.is_some() {
        return Err(StorageError::already_exists("concept", concept.id.to_string()));
    }

    insert(&mut *tx, schema, concept).await?;
    tx.commit()
        .await
        .map_err(|e| query_error(e, "concept", "commit"))?;
    Ok(concept.clone())
}

/// Returns the concept matching `key`, inserting `concept` if there is none.
pub async fn create_if_absent(
    pool: &PgPool,
    schema: &str,
    concept: &Concept,
    key: ConceptMatch,
) -> Result<Upsert<Concept>, StorageError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| query_error(e, "concept", "begin"))?;
    advisory_lock(&mut tx, "concept").await?;

    let clause = build_where(&key.params_for(concept))?;
    let sql = format!(
        "SELECT {COLUMNS} FROM {}{} ORDER BY concept_id LIMIT 1",
        table(schema, "concept"),
        clause.sql
    );
    let existing = bind_all(query(&sql), clause.binds)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| query_error(e, "concept", &concept.concept_code))?;

    if let Some(row) = existing {
        let found = row_to_concept(&row)?;
        tx.commit()
            .await
            .map_err(|e| query_error(e, "concept", "commit"))?;
        return Ok(Upsert::Existing(found));
    }

    insert(&mut *tx, schema, concept).await?;
    tx.commit()
        .await
        .map_err(|e| query_error(e, "concept", "commit"))?;
    Ok(Upsert::Created(concept.clone()))
}

pub async fn largest_id(pool: &PgPool, schema: &str) -> Result<i64, StorageError> {
    let sql = format!(
        "SELECT COALESCE(MAX(concept_id), 0)::bigint FROM {}",
        table(schema, "concept")
    );
    query_scalar(&sql)
        .fetch_one(pool)
        .await
        .map_err(|e| query_error(e, "concept", "max"))
}
