//! Store handle
//!
//! [`SlotStore`] owns one SQLite connection behind a mutex. Cloning the handle
//! shares the connection; separate processes (or threads that want real write
//! contention) open their own handle on the same file and serialize through
//! SQLite's write lock.

use crate::{
    audit,
    error::StoreError,
    guard, metadata, schema, slots,
    view::{self, SafeSlot},
};
use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};
use slotpool_core::{
    now, AuditEntry, ProjectCapacity, Slot, SlotId, SlotMetadata, StoreConfig, UserId,
};
use std::{path::Path, sync::Arc, time::Duration};

/// Shared handle to the allocation, metadata, audit and safe-view tables
#[derive(Debug, Clone)]
pub struct SlotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SlotStore {
    /// Open (and migrate) a database file
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or migrated
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::debug!("Opened slot store at {} (journal_mode={})", path.display(), mode);
        Self::from_connection(conn)
    }

    /// Private in-memory database
    ///
    /// # Errors
    /// Returns error if migration fails
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Adopt an existing connection, migrating it first
    ///
    /// # Errors
    /// Returns error if migration fails
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run read-only work against the connection
    ///
    /// # Errors
    /// Propagates the error returned by `f`
    pub fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` in an immediate transaction; commit on `Ok`, roll back on `Err`
    ///
    /// Used for single-slot commits where a full snapshot would be too costly.
    ///
    /// # Errors
    /// Propagates the error returned by `f` or by the commit
    pub fn write<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `op` under the snapshot + transaction guard
    ///
    /// # Errors
    /// See [`guard::with_snapshot_and_transaction`]
    pub fn guarded<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        guard::with_snapshot_and_transaction(&mut conn, op)
    }

    /// Fetch one slot
    ///
    /// # Errors
    /// Returns [`StoreError::SlotNotFound`] for unknown ids
    pub fn slot(&self, slot_id: &SlotId) -> Result<Slot, StoreError> {
        self.read(|c| {
            slots::get(c, slot_id)?.ok_or_else(|| StoreError::SlotNotFound(slot_id.clone()))
        })
    }

    /// All slots, ascending id
    ///
    /// # Errors
    /// Returns error on database failure
    pub fn slots(&self) -> Result<Vec<Slot>, StoreError> {
        self.read(|c| Ok(slots::list(c)?))
    }

    /// Slots held by `user_id`
    ///
    /// # Errors
    /// Returns error on database failure
    pub fn slots_for_user(&self, user_id: &UserId) -> Result<Vec<Slot>, StoreError> {
        self.read(|c| Ok(slots::assigned_to(c, user_id)?))
    }

    /// Occupancy per project
    ///
    /// # Errors
    /// Returns error on database failure
    pub fn capacities(&self) -> Result<Vec<ProjectCapacity>, StoreError> {
        self.read(|c| Ok(slots::capacities(c)?))
    }

    /// Metadata row for a slot, if any
    ///
    /// # Errors
    /// Returns error on database failure
    pub fn metadata(&self, slot_id: &SlotId) -> Result<Option<SlotMetadata>, StoreError> {
        self.read(|c| Ok(metadata::get(c, slot_id)?))
    }

    /// All metadata rows
    ///
    /// # Errors
    /// Returns error on database failure
    pub fn all_metadata(&self) -> Result<Vec<SlotMetadata>, StoreError> {
        self.read(|c| Ok(metadata::list(c)?))
    }

    /// Audit history of one slot, oldest first
    ///
    /// # Errors
    /// Returns error on database failure
    pub fn audit_for_slot(&self, slot_id: &SlotId) -> Result<Vec<AuditEntry>, StoreError> {
        self.read(|c| Ok(audit::for_slot(c, slot_id)?))
    }

    /// Entire audit log, oldest first
    ///
    /// # Errors
    /// Returns error on database failure
    pub fn audit_log(&self) -> Result<Vec<AuditEntry>, StoreError> {
        self.read(|c| Ok(audit::all(c)?))
    }

    /// Current safe-slot view
    ///
    /// # Errors
    /// Returns error on database failure
    pub fn safe_view(&self) -> Result<Vec<SafeSlot>, StoreError> {
        self.read(|c| Ok(view::list(c)?))
    }

    /// Bump the workflow counter of an assigned slot
    ///
    /// # Errors
    /// Returns [`StoreError::SlotNotFound`] when the slot has no metadata
    pub fn record_workflow_created(&self, slot_id: &SlotId) -> Result<(), StoreError> {
        self.write(|c| {
            if metadata::record_workflow_created(c, slot_id, &now())? {
                Ok(())
            } else {
                Err(StoreError::SlotNotFound(slot_id.clone()))
            }
        })
    }
}
