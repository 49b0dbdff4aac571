//! Snapshot + transaction guard
//!
//! Wraps bulk writes (pool provisioning, reconciler correction batches) in:
//! 1. An immediate transaction
//! 2. A pre-operation snapshot of the allocation, metadata and audit tables
//! 3. A savepoint around the operation itself
//!
//! If the snapshot cannot be taken the operation never runs. If the operation
//! fails, the savepoint is rolled back and the result is checked against the
//! snapshot; any residual difference is restored by hand. Only a failure in
//! that recovery path is fatal.

use crate::{audit, codec, error::StoreError, metadata, slots};
use rusqlite::{params, Connection, TransactionBehavior};
use slotpool_core::{encode_timestamp, AuditEntry, Slot, SlotMetadata};
use std::collections::BTreeSet;

/// State that can be captured before a guarded operation and put back after
pub trait Snapshot: Sized + PartialEq {
    /// Read the current state
    ///
    /// # Errors
    /// Returns the database error that prevented a full read
    fn capture(conn: &Connection) -> rusqlite::Result<Self>;

    /// Make the database match this snapshot again
    ///
    /// # Errors
    /// Returns the database error that interrupted the restore
    fn restore(&self, conn: &Connection) -> rusqlite::Result<()>;
}

/// Full copy of the three authoritative tables
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub slots: Vec<Slot>,
    pub metadata: Vec<SlotMetadata>,
    pub audit: Vec<AuditEntry>,
}

impl Snapshot for StoreSnapshot {
    fn capture(conn: &Connection) -> rusqlite::Result<Self> {
        Ok(Self {
            slots: slots::list(conn)?,
            metadata: metadata::list(conn)?,
            audit: audit::all(conn)?,
        })
    }

    fn restore(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM slots", [])?;
        for slot in &self.slots {
            conn.execute(
                "INSERT INTO slots (slot_id, project_id, is_assigned, user_id, assigned_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    slot.slot_id.as_str(),
                    slot.project_id.as_str(),
                    slot.is_assigned(),
                    slot.user_id().map(|u| u.as_str()),
                    slot.assigned_at().as_ref().map(encode_timestamp),
                ],
            )?;
        }

        conn.execute("DELETE FROM slot_metadata", [])?;
        for meta in &self.metadata {
            metadata::insert(conn, meta)?;
        }

        // The audit log is append-only: entries the operation wrote cannot be
        // removed, so any surplus makes the restore fail.
        let kept: BTreeSet<&str> = self.audit.iter().map(|e| e.id.as_str()).collect();
        let current = audit::all(conn)?;
        for entry in current.iter().filter(|e| !kept.contains(e.id.as_str())) {
            conn.execute("DELETE FROM audit_log WHERE id = ?1", params![entry.id])?;
        }
        let present: BTreeSet<&str> = current.iter().map(|e| e.id.as_str()).collect();
        for entry in self.audit.iter().filter(|e| !present.contains(e.id.as_str())) {
            audit::append(conn, entry)?;
        }
        Ok(())
    }
}

/// Run `op` under a [`StoreSnapshot`]
///
/// # Errors
/// - [`StoreError::SnapshotFailed`] if the snapshot could not be taken (nothing ran)
/// - the error returned by `op`, after the tables were put back
/// - [`StoreError::RollbackFailed`] if putting them back failed
pub fn with_snapshot_and_transaction<T, F>(conn: &mut Connection, op: F) -> Result<T, StoreError>
where
    F: FnOnce(&Connection) -> Result<T, StoreError>,
{
    guarded::<StoreSnapshot, T, F>(conn, op)
}

/// Run `op` under any [`Snapshot`] implementation
///
/// # Errors
/// See [`with_snapshot_and_transaction`]
pub fn guarded<S, T, F>(conn: &mut Connection, op: F) -> Result<T, StoreError>
where
    S: Snapshot,
    F: FnOnce(&Connection) -> Result<T, StoreError>,
{
    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let snapshot = S::capture(&tx).map_err(|e| {
        tracing::warn!("Snapshot failed, aborting guarded operation: {}", e);
        StoreError::SnapshotFailed(e.to_string())
    })?;

    let outcome = {
        let mut sp = tx.savepoint()?;
        match op(&sp) {
            Ok(value) => {
                sp.commit()?;
                Ok(value)
            }
            Err(err) => {
                let rewound = match sp.rollback() {
                    Ok(()) => sp.commit(),
                    Err(e) => Err(e),
                };
                Err((err, rewound))
            }
        }
    };

    match outcome {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err((err, rewound)) => {
            tracing::warn!("Guarded operation failed, rolling back: {}", err);
            if let Err(e) = rewound
                .and_then(|()| restore_if_drifted(&tx, &snapshot))
                .and_then(|()| tx.commit())
            {
                tracing::error!(
                    "FATAL: rollback after failed operation did not complete: {} \
                     (original error: {})",
                    e,
                    err
                );
                return Err(StoreError::RollbackFailed(format!("{e} (original error: {err})")));
            }
            Err(err)
        }
    }
}

fn restore_if_drifted<S: Snapshot>(conn: &Connection, snapshot: &S) -> rusqlite::Result<()> {
    if S::capture(conn)? == *snapshot {
        return Ok(());
    }
    tracing::warn!("Savepoint rollback left residual changes, restoring snapshot");
    snapshot.restore(conn)?;
    if S::capture(conn)? == *snapshot {
        Ok(())
    } else {
        Err(codec::failure("state differs from snapshot after restore"))
    }
}
