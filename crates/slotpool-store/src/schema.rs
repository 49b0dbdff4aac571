//! Table layout
//!
//! `CREATE … IF NOT EXISTS` throughout, so opening an existing database is a
//! no-op migration.

use rusqlite::Connection;

/// Schema SQL for the allocation, metadata, audit and safe-view tables.
pub(crate) const SCHEMA_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS slots (
        slot_id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        is_assigned INTEGER NOT NULL DEFAULT 0 CHECK (is_assigned IN (0, 1)),
        user_id TEXT NULL,
        assigned_at TEXT NULL,
        CHECK ((is_assigned = 1) = (user_id IS NOT NULL AND assigned_at IS NOT NULL))
    );

    CREATE INDEX IF NOT EXISTS idx_slots_project
        ON slots(project_id, slot_id);
    CREATE INDEX IF NOT EXISTS idx_slots_user
        ON slots(user_id);

    CREATE TABLE IF NOT EXISTS slot_metadata (
        slot_id TEXT PRIMARY KEY,
        owner_user_id TEXT NOT NULL,
        assigned_at TEXT NOT NULL,
        assigned_by TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        workflows_created INTEGER NOT NULL DEFAULT 0,
        last_activity_at TEXT NOT NULL,
        verification_hash TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS audit_log (
        id TEXT PRIMARY KEY,
        slot_id TEXT NOT NULL,
        user_id TEXT NULL,
        action TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_slot_created
        ON audit_log(slot_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_audit_created
        ON audit_log(created_at);

    CREATE TRIGGER IF NOT EXISTS audit_log_no_update
        BEFORE UPDATE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only');
        END;

    CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
        BEFORE DELETE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only');
        END;

    CREATE TABLE IF NOT EXISTS safe_slot_view (
        slot_id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        computed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_safe_view_project
        ON safe_slot_view(project_id, slot_id);
";

/// Apply the schema
pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
