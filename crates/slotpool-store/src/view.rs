//! Safe-slot view: the `safe_slot_view` table
//!
//! A recomputable candidate list, never the commit authority. Inserts are
//! filtered against the live `slots` and `slot_metadata` rows at write time,
//! so a rebuild racing an acquire cannot re-list a slot that was just taken.

use crate::codec;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use slotpool_core::{encode_timestamp, ProjectId, SlotId};

/// One row of the view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeSlot {
    pub slot_id: SlotId,
    pub project_id: ProjectId,
    pub computed_at: DateTime<Utc>,
}

/// Up to `limit` candidate ids for a project, ascending
pub fn candidates(
    conn: &Connection,
    project_id: &ProjectId,
    limit: usize,
) -> rusqlite::Result<Vec<SlotId>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(
        "SELECT slot_id FROM safe_slot_view WHERE project_id = ?1 ORDER BY slot_id LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![project_id.as_str(), limit], |row| {
        row.get::<_, String>(0).map(SlotId::new)
    })?;
    rows.collect()
}

/// Replace the whole view with `slot_ids`
///
/// Ids that are no longer free, or that gained metadata, are skipped.
/// Returns the number of rows written.
pub fn replace(
    conn: &Connection,
    slot_ids: &[SlotId],
    computed_at: &DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM safe_slot_view", [])?;

    let computed_at = encode_timestamp(computed_at);
    let mut stmt = conn.prepare(
        "INSERT INTO safe_slot_view (slot_id, project_id, computed_at)
         SELECT s.slot_id, s.project_id, ?2 FROM slots s
         WHERE s.slot_id = ?1
           AND s.is_assigned = 0
           AND NOT EXISTS (SELECT 1 FROM slot_metadata m WHERE m.slot_id = s.slot_id)",
    )?;

    let mut written = 0;
    for slot_id in slot_ids {
        written += stmt.execute(params![slot_id.as_str(), computed_at])?;
    }
    Ok(written)
}

/// Drop one slot from the view. Returns whether it was listed.
pub fn remove(conn: &Connection, slot_id: &SlotId) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "DELETE FROM safe_slot_view WHERE slot_id = ?1",
        params![slot_id.as_str()],
    )?;
    Ok(changed == 1)
}

/// Whole view, ascending
pub fn list(conn: &Connection) -> rusqlite::Result<Vec<SafeSlot>> {
    let mut stmt = conn.prepare(
        "SELECT slot_id, project_id, computed_at FROM safe_slot_view ORDER BY slot_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SafeSlot {
            slot_id: SlotId::new(row.get::<_, String>(0)?),
            project_id: ProjectId::new(row.get::<_, String>(1)?),
            computed_at: codec::timestamp(2, &row.get::<_, String>(2)?)?,
        })
    })?;
    rows.collect()
}
