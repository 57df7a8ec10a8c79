//! Column conversions shared by the SQLite stores.

use super::models::DecodeError;
use crate::play_event::Source;
use chrono::{DateTime, Utc};
use rusqlite::types::FromSql;
use rusqlite::Row;

pub(super) fn column<T: FromSql>(
    row: &Row,
    idx: usize,
    column: &'static str,
    insert_id: &str,
) -> Result<T, DecodeError> {
    row.get(idx).map_err(|e| DecodeError::Column {
        insert_id: insert_id.to_string(),
        column,
        message: e.to_string(),
    })
}

/// Reads a nullable TEXT column, NULL meaning empty.
pub(super) fn text_or_empty(
    row: &Row,
    idx: usize,
    name: &'static str,
    insert_id: &str,
) -> Result<String, DecodeError> {
    Ok(column::<Option<String>>(row, idx, name, insert_id)?.unwrap_or_default())
}

pub(super) fn millis_to_datetime(
    millis: i64,
    column: &'static str,
    insert_id: &str,
) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| DecodeError::OutOfRange {
        insert_id: insert_id.to_string(),
        column,
        value: millis,
    })
}

pub(super) fn duration_from_sql(
    millis: Option<i64>,
    insert_id: &str,
) -> Result<u64, DecodeError> {
    match millis {
        None => Ok(0),
        Some(value) => u64::try_from(value).map_err(|_| DecodeError::OutOfRange {
            insert_id: insert_id.to_string(),
            column: "duration_ms",
            value,
        }),
    }
}

pub(super) fn source_from_sql(tag: &str, insert_id: &str) -> Result<Source, DecodeError> {
    Source::parse(tag).ok_or_else(|| DecodeError::UnknownSource {
        insert_id: insert_id.to_string(),
        value: tag.to_string(),
    })
}
