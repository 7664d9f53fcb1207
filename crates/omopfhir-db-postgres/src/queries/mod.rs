//! SQL query modules for the PostgreSQL CDM backend, one per vocabulary table.

pub mod concept;
pub mod concept_relationship;
pub mod relationship;
pub mod vocabulary;

use chrono::{Datelike, NaiveDate};
use omopfhir_storage::StorageError;
use sqlx_postgres::PgTransaction;
use time::{Date, Month};

use crate::error::query_error;

/// Schema-qualified table reference, e.g. `"cdm".concept`.
pub(crate) fn table(schema: &str, name: &str) -> String {
    format!("\"{schema}\".{name}")
}

/// Converts a chrono `DATE` value to a `time::Date`.
pub(crate) fn chrono_to_time(date: NaiveDate) -> Result<Date, StorageError> {
    let month = u8::try_from(date.month())
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .ok_or_else(|| StorageError::internal(format!("invalid month in {date}")))?;
    let day = u8::try_from(date.day())
        .map_err(|_| StorageError::internal(format!("invalid day in {date}")))?;
    Date::from_calendar_date(date.year(), month, day)
        .map_err(|e| StorageError::internal(format!("invalid date {date}: {e}")))
}

/// Converts a `time::Date` to chrono for binding.
pub(crate) fn time_to_chrono(date: Date) -> Result<NaiveDate, StorageError> {
    NaiveDate::from_ymd_opt(date.year(), u32::from(u8::from(date.month())), u32::from(date.day()))
        .ok_or_else(|| StorageError::internal(format!("date {date} out of range")))
}

/// Takes a transaction-scoped advisory lock on `name`.
///
/// Serializes insert-if-absent on tables that carry no unique constraint on
/// the natural key.
pub(crate) async fn advisory_lock(
    tx: &mut PgTransaction<'_>,
    name: &str,
) -> Result<(), StorageError> {
    sqlx_core::query::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(name)
        .execute(&mut **tx)
        .await
        .map_err(|e| query_error(e, name, "advisory lock"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_date_conversions() {
        let naive = NaiveDate::from_ymd_opt(2099, 12, 31).unwrap();
        assert_eq!(chrono_to_time(naive).unwrap(), date!(2099 - 12 - 31));
        assert_eq!(time_to_chrono(date!(1970 - 01 - 01)).unwrap(), NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }

    #[test]
    fn test_table_is_schema_qualified() {
        assert_eq!(table("cdm", "concept"), "\"cdm\".concept");
    }
}
