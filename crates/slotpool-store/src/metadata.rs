//! Metadata store: the `slot_metadata` table
//!
//! At most one row per slot (primary key). Rows are never deleted, so the
//! table doubles as assignment history.

use crate::codec;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use slotpool_core::{encode_timestamp, AssignedBy, MetadataStatus, SlotId, SlotMetadata, UserId};

const METADATA_COLUMNS: &str = "slot_id, owner_user_id, assigned_at, assigned_by, status, \
     workflows_created, last_activity_at, verification_hash";

pub(crate) fn row_to_metadata(row: &Row<'_>) -> rusqlite::Result<SlotMetadata> {
    let assigned_by: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(SlotMetadata {
        slot_id: SlotId::new(row.get::<_, String>(0)?),
        owner_user_id: UserId::new(row.get::<_, String>(1)?),
        assigned_at: codec::timestamp(2, &row.get::<_, String>(2)?)?,
        assigned_by: AssignedBy::from_str_checked(&assigned_by)
            .ok_or_else(|| codec::invalid(3, format!("unknown assigned_by: {assigned_by}")))?,
        status: MetadataStatus::from_str_checked(&status)
            .ok_or_else(|| codec::invalid(4, format!("unknown status: {status}")))?,
        workflows_created: codec::counter(5, row.get(5)?)?,
        last_activity_at: codec::timestamp(6, &row.get::<_, String>(6)?)?,
        verification_hash: row.get(7)?,
    })
}

/// Insert a metadata row. Fails with a constraint violation if the slot
/// already has one.
pub fn insert(conn: &Connection, meta: &SlotMetadata) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO slot_metadata ({METADATA_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            meta.slot_id.as_str(),
            meta.owner_user_id.as_str(),
            encode_timestamp(&meta.assigned_at),
            meta.assigned_by.as_str(),
            meta.status.as_str(),
            i64::try_from(meta.workflows_created).unwrap_or(i64::MAX),
            encode_timestamp(&meta.last_activity_at),
            meta.verification_hash,
        ],
    )?;
    Ok(())
}

/// Fetch the metadata row for a slot
pub fn get(conn: &Connection, slot_id: &SlotId) -> rusqlite::Result<Option<SlotMetadata>> {
    conn.query_row(
        &format!("SELECT {METADATA_COLUMNS} FROM slot_metadata WHERE slot_id = ?1"),
        params![slot_id.as_str()],
        row_to_metadata,
    )
    .optional()
}

/// Whether any metadata row exists for the slot
pub fn exists(conn: &Connection, slot_id: &SlotId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM slot_metadata WHERE slot_id = ?1)",
        params![slot_id.as_str()],
        |row| row.get(0),
    )
}

/// All metadata rows in ascending slot order
pub fn list(conn: &Connection) -> rusqlite::Result<Vec<SlotMetadata>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {METADATA_COLUMNS} FROM slot_metadata ORDER BY slot_id"
    ))?;
    let rows = stmt.query_map([], row_to_metadata)?;
    rows.collect()
}

/// Count one more workflow created in the slot. Returns `false` when the
/// slot has no metadata.
pub fn record_workflow_created(
    conn: &Connection,
    slot_id: &SlotId,
    at: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE slot_metadata
         SET workflows_created = workflows_created + 1, last_activity_at = ?2
         WHERE slot_id = ?1",
        params![slot_id.as_str(), encode_timestamp(at)],
    )?;
    Ok(changed == 1)
}
