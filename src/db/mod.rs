pub mod repository;
pub mod sqlite;

pub use repository::*;
pub use sqlite::*;

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, SubsecRound};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatabaseError {
    pub fn not_found(entity_type: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// True when SQLite rejected the write on a UNIQUE or CHECK constraint.
    pub fn is_constraint(&self) -> bool {
        match self {
            Self::ConstraintViolation(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Current UTC time at the precision stored in the database.
pub fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc().trunc_subsecs(0)
}

pub fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

// Row accessors shared by the repositories. Conversion failures surface as
// `FromSqlConversionFailure` so they flow through `query_map` unchanged.

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn get_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_opt_uuid(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn get_datetime(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_opt_datetime(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|raw| NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).ok()))
}

pub(crate) fn get_date(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_opt_date(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|raw| NaiveDate::parse_from_str(&raw, DATE_FORMAT).ok()))
}

pub(crate) fn get_enum<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = DatabaseError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_json<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_has_no_fraction() {
        let t = now();
        assert_eq!(t.and_utc().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn datetime_format_round_trips() {
        let t = now();
        let s = fmt_datetime(&t);
        assert_eq!(NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).unwrap(), t);
    }

    #[test]
    fn constraint_violation_detected() {
        let err = DatabaseError::ConstraintViolation("dup".into());
        assert!(err.is_constraint());
        assert!(!DatabaseError::not_found("User", "x").is_constraint());
    }
}
