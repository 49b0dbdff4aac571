//! Column decoding helpers shared by the table modules

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use slotpool_core::decode_timestamp;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct InvalidColumn(String);

/// Build a conversion error for column `idx`
pub(crate) fn invalid(idx: usize, message: impl Into<String>) -> rusqlite::Error {
    let source = Box::new(InvalidColumn(message.into()));
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, source)
}

/// Decode a timestamp column
pub(crate) fn timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    decode_timestamp(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a JSON column
pub(crate) fn json(idx: usize, raw: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// SQLite integers are signed; counters never go negative
pub(crate) fn counter(idx: usize, raw: i64) -> rusqlite::Result<u64> {
    u64::try_from(raw).map_err(|_| invalid(idx, format!("negative counter: {raw}")))
}

/// Build a generic SQLite failure carrying `message`
pub(crate) fn failure(message: impl Into<String>) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some(message.into()),
    )
}
