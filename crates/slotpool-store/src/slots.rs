//! Allocation store: the `slots` table
//!
//! Every function takes a plain `&Connection` so it composes inside a
//! caller-owned transaction or savepoint.

use crate::codec;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use slotpool_core::{encode_timestamp, Assignment, ProjectCapacity, ProjectId, Slot, SlotId, UserId};

const SLOT_COLUMNS: &str = "slot_id, project_id, is_assigned, user_id, assigned_at";

pub(crate) fn row_to_slot(row: &Row<'_>) -> rusqlite::Result<Slot> {
    let slot_id: String = row.get(0)?;
    let project_id: String = row.get(1)?;
    let is_assigned: bool = row.get(2)?;
    let user_id: Option<String> = row.get(3)?;
    let assigned_at: Option<String> = row.get(4)?;

    let assignment = match (is_assigned, user_id, assigned_at) {
        (false, _, _) => None,
        (true, Some(user_id), Some(at)) => Some(Assignment {
            user_id: UserId::new(user_id),
            assigned_at: codec::timestamp(4, &at)?,
        }),
        (true, _, _) => return Err(codec::invalid(2, "assigned slot without holder")),
    };

    Ok(Slot {
        slot_id: SlotId::new(slot_id),
        project_id: ProjectId::new(project_id),
        assignment,
    })
}

/// Insert a free slot unless it already exists. Returns whether a row was added.
pub fn insert_if_missing(
    conn: &Connection,
    slot_id: &SlotId,
    project_id: &ProjectId,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO slots (slot_id, project_id, is_assigned) VALUES (?1, ?2, 0)",
        params![slot_id.as_str(), project_id.as_str()],
    )?;
    Ok(changed == 1)
}

/// Fetch one slot
pub fn get(conn: &Connection, slot_id: &SlotId) -> rusqlite::Result<Option<Slot>> {
    conn.query_row(
        &format!("SELECT {SLOT_COLUMNS} FROM slots WHERE slot_id = ?1"),
        params![slot_id.as_str()],
        row_to_slot,
    )
    .optional()
}

/// All slots in ascending id order
pub fn list(conn: &Connection) -> rusqlite::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(&format!("SELECT {SLOT_COLUMNS} FROM slots ORDER BY slot_id"))?;
    let rows = stmt.query_map([], row_to_slot)?;
    rows.collect()
}

/// Slots currently held by `user_id`
pub fn assigned_to(conn: &Connection, user_id: &UserId) -> rusqlite::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE is_assigned = 1 AND user_id = ?1 ORDER BY slot_id"
    ))?;
    let rows = stmt.query_map(params![user_id.as_str()], row_to_slot)?;
    rows.collect()
}

/// Conditional assignment: succeeds only if the slot is still free at write
/// time. Returns `false` when another writer got there first.
pub fn mark_assigned_if_free(
    conn: &Connection,
    slot_id: &SlotId,
    user_id: &UserId,
    assigned_at: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE slots SET is_assigned = 1, user_id = ?2, assigned_at = ?3
         WHERE slot_id = ?1 AND is_assigned = 0",
        params![slot_id.as_str(), user_id.as_str(), encode_timestamp(assigned_at)],
    )?;
    Ok(changed == 1)
}

/// Occupancy per project, ascending project id
pub fn capacities(conn: &Connection) -> rusqlite::Result<Vec<ProjectCapacity>> {
    let mut stmt = conn.prepare(
        "SELECT project_id, COUNT(*), COALESCE(SUM(is_assigned), 0)
         FROM slots GROUP BY project_id ORDER BY project_id",
    )?;
    let rows = stmt.query_map([], |row| {
        let total: i64 = row.get(1)?;
        let assigned: i64 = row.get(2)?;
        Ok(ProjectCapacity {
            project_id: ProjectId::new(row.get::<_, String>(0)?),
            total: usize::try_from(total).map_err(|_| codec::invalid(1, "negative count"))?,
            assigned: usize::try_from(assigned).map_err(|_| codec::invalid(2, "negative count"))?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use slotpool_core::now;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_is_idempotent() {
        let conn = conn();
        let (s, p) = (SlotId::from("p1-s1"), ProjectId::from("p1"));
        assert!(insert_if_missing(&conn, &s, &p).unwrap());
        assert!(!insert_if_missing(&conn, &s, &p).unwrap());
        assert_eq!(list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn conditional_assignment_only_wins_once() {
        let conn = conn();
        let (s, p) = (SlotId::from("p1-s1"), ProjectId::from("p1"));
        insert_if_missing(&conn, &s, &p).unwrap();

        let at = now();
        assert!(mark_assigned_if_free(&conn, &s, &UserId::from("alice"), &at).unwrap());
        assert!(!mark_assigned_if_free(&conn, &s, &UserId::from("bob"), &at).unwrap());

        let slot = get(&conn, &s).unwrap().unwrap();
        assert_eq!(slot.user_id().map(UserId::as_str), Some("alice"));
    }

    #[test]
    fn check_constraint_rejects_holderless_assignment() {
        let conn = conn();
        insert_if_missing(&conn, &SlotId::from("s"), &ProjectId::from("p")).unwrap();
        let err = conn
            .execute("UPDATE slots SET is_assigned = 1 WHERE slot_id = 's'", [])
            .unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(rusqlite::ErrorCode::ConstraintViolation));
    }

    #[test]
    fn capacities_group_by_project() {
        let conn = conn();
        for (s, p) in [("a-1", "a"), ("a-2", "a"), ("b-1", "b")] {
            insert_if_missing(&conn, &SlotId::from(s), &ProjectId::from(p)).unwrap();
        }
        mark_assigned_if_free(&conn, &SlotId::from("a-2"), &UserId::from("u"), &now()).unwrap();

        let caps = capacities(&conn).unwrap();
        assert_eq!(caps.len(), 2);
        assert_eq!((caps[0].total, caps[0].assigned, caps[0].free()), (2, 1, 1));
        assert_eq!((caps[1].total, caps[1].assigned), (1, 0));
    }
}
