//! Read-only engine adapter over a SQLite database
//!
//! The engine's schema is not ours and may change between releases, so
//! every query is preceded by a probe of `sqlite_master` and
//! `PRAGMA table_info`. Table and column names come from configuration and
//! are validated as plain identifiers before being quoted into SQL.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use slotpool_core::{EngineCollaborator, EngineError, EngineSchema, SlotId};
use std::collections::BTreeMap;
use std::path::Path;

/// Engine collaborator reading a SQLite-backed workflow engine
#[derive(Debug)]
pub struct SqliteEngine {
    conn: Mutex<Connection>,
    schema: EngineSchema,
}

impl SqliteEngine {
    /// Open the engine database read-only
    ///
    /// # Errors
    /// - [`EngineError::SchemaMissing`] if `schema` names are not plain identifiers
    /// - [`EngineError::Unreachable`] if the file cannot be opened
    pub fn open(path: impl AsRef<Path>, schema: EngineSchema) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| EngineError::Unreachable(format!("{}: {e}", path.display())))?;
        Self::from_connection(conn, schema)
    }

    /// Wrap an existing connection
    ///
    /// # Errors
    /// Returns [`EngineError::SchemaMissing`] if `schema` names are not plain
    /// identifiers
    pub fn from_connection(conn: Connection, schema: EngineSchema) -> Result<Self, EngineError> {
        schema
            .validate()
            .map_err(|e| EngineError::SchemaMissing(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            schema,
        })
    }

    /// Schema this adapter reads
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &EngineSchema {
        &self.schema
    }
}

fn query_error(e: &rusqlite::Error) -> EngineError {
    match e.sqlite_error_code() {
        Some(
            rusqlite::ErrorCode::CannotOpen
            | rusqlite::ErrorCode::DatabaseBusy
            | rusqlite::ErrorCode::DatabaseLocked
            | rusqlite::ErrorCode::NotADatabase,
        ) => EngineError::Unreachable(e.to_string()),
        _ => EngineError::Query(e.to_string()),
    }
}

impl EngineCollaborator for SqliteEngine {
    fn resource_table_exists(&self) -> Result<bool, EngineError> {
        let conn = self.conn.lock();
        let table_present: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                params![self.schema.table],
                |row| row.get(0),
            )
            .map_err(|e| query_error(&e))?;
        if !table_present {
            return Ok(false);
        }

        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info(\"{}\")", self.schema.table))
            .map_err(|e| query_error(&e))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| query_error(&e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| query_error(&e))?;
        Ok(columns.iter().any(|c| c == &self.schema.tag_column))
    }

    fn count_resources_for_slot(&self, slot_id: &SlotId) -> Result<u64, EngineError> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM \"{}\" WHERE \"{}\" = ?1",
                    self.schema.table, self.schema.tag_column
                ),
                params![slot_id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| query_error(&e))?;
        u64::try_from(n).map_err(|_| EngineError::Query(format!("negative count: {n}")))
    }

    fn resource_tags(&self) -> Result<BTreeMap<String, u64>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT CAST(\"{col}\" AS TEXT), COUNT(*) FROM \"{table}\"
                 WHERE \"{col}\" IS NOT NULL GROUP BY 1",
                col = self.schema.tag_column,
                table = self.schema.table
            ))
            .map_err(|e| query_error(&e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| query_error(&e))?;

        let mut tags = BTreeMap::new();
        for row in rows {
            let (tag, n) = row.map_err(|e| query_error(&e))?;
            tags.insert(tag, u64::try_from(n).unwrap_or(0));
        }
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_rows(rows: &[Option<&str>]) -> SqliteEngine {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE workflow_entity (id INTEGER PRIMARY KEY, slot_id TEXT)")
            .unwrap();
        for tag in rows {
            conn.execute("INSERT INTO workflow_entity (slot_id) VALUES (?1)", params![tag])
                .unwrap();
        }
        SqliteEngine::from_connection(conn, EngineSchema::default()).unwrap()
    }

    #[test]
    fn counts_tagged_rows() {
        let engine = engine_with_rows(&[Some("a"), Some("a"), Some("b"), None]);
        assert!(engine.resource_table_exists().unwrap());
        assert_eq!(engine.count_resources_for_slot(&SlotId::from("a")).unwrap(), 2);
        assert_eq!(engine.count_resources_for_slot(&SlotId::from("c")).unwrap(), 0);
        assert_eq!(
            engine.resource_tags().unwrap(),
            BTreeMap::from([("a".to_string(), 2), ("b".to_string(), 1)])
        );
    }

    #[test]
    fn probe_detects_missing_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE workflow_entity (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let engine = SqliteEngine::from_connection(conn, EngineSchema::default()).unwrap();
        assert!(!engine.resource_table_exists().unwrap());
    }

    #[test]
    fn probe_detects_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        let engine = SqliteEngine::from_connection(conn, EngineSchema::default()).unwrap();
        assert!(!engine.resource_table_exists().unwrap());
        assert!(matches!(
            engine.count_resources_for_slot(&SlotId::from("a")),
            Err(EngineError::Query(_))
        ));
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let schema = EngineSchema::new("workflow_entity\"; DROP TABLE x; --", "slot_id");
        let err = SqliteEngine::from_connection(Connection::open_in_memory().unwrap(), schema)
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaMissing(_)));
    }
}
