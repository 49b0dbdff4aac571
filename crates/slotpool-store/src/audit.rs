//! Audit log: the `audit_log` table
//!
//! Append-only. `UPDATE` and `DELETE` are rejected by triggers; ordering is
//! `created_at` with insertion order (`rowid`) breaking ties.

use crate::codec;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use slotpool_core::{encode_timestamp, AuditAction, AuditEntry, SlotId, UserId};

const AUDIT_COLUMNS: &str = "id, slot_id, user_id, action, details, created_at";

pub(crate) fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let action: String = row.get(3)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        slot_id: SlotId::new(row.get::<_, String>(1)?),
        user_id: row.get::<_, Option<String>>(2)?.map(UserId::new),
        action: AuditAction::from_str_checked(&action)
            .ok_or_else(|| codec::invalid(3, format!("unknown audit action: {action}")))?,
        details: codec::json(4, &row.get::<_, String>(4)?)?,
        created_at: codec::timestamp(5, &row.get::<_, String>(5)?)?,
    })
}

/// Append one entry
pub fn append(conn: &Connection, entry: &AuditEntry) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO audit_log ({AUDIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            entry.id,
            entry.slot_id.as_str(),
            entry.user_id.as_ref().map(UserId::as_str),
            entry.action.as_str(),
            entry.details.to_string(),
            encode_timestamp(&entry.created_at),
        ],
    )?;
    Ok(())
}

/// Most recent entry for a slot
pub fn latest_for_slot(
    conn: &Connection,
    slot_id: &SlotId,
) -> rusqlite::Result<Option<AuditEntry>> {
    conn.query_row(
        &format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE slot_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ),
        params![slot_id.as_str()],
        row_to_entry,
    )
    .optional()
}

/// Full history of a slot, oldest first
pub fn for_slot(conn: &Connection, slot_id: &SlotId) -> rusqlite::Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE slot_id = ?1 ORDER BY created_at, rowid"
    ))?;
    let rows = stmt.query_map(params![slot_id.as_str()], row_to_entry)?;
    rows.collect()
}

/// Entries created at or after `since`, oldest first
pub fn since(conn: &Connection, since: &DateTime<Utc>) -> rusqlite::Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE created_at >= ?1 ORDER BY created_at, rowid"
    ))?;
    let rows = stmt.query_map(params![encode_timestamp(since)], row_to_entry)?;
    rows.collect()
}

/// Entire log, oldest first
pub fn all(conn: &Connection) -> rusqlite::Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY created_at, rowid"
    ))?;
    let rows = stmt.query_map([], row_to_entry)?;
    rows.collect()
}

/// Number of entries
pub fn count(conn: &Connection) -> rusqlite::Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
    usize::try_from(n).map_err(|_| codec::invalid(0, "negative count"))
}
