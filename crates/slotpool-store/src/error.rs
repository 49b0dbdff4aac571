//! Error types for the slot store
//!
//! Distinguishes ordinary database failures from the two guard outcomes
//! that matter operationally:
//! - snapshot failure (nothing was mutated)
//! - rollback failure (state may be partially mutated; page someone)

use slotpool_core::SlotId;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Slot id unknown to the allocation store
    #[error("slot not found: {0}")]
    SlotNotFound(SlotId),

    /// Conditional write lost to a concurrent writer
    #[error("transaction conflict on slot {0}")]
    Conflict(SlotId),

    /// Pre-operation snapshot could not be taken; the operation never ran
    #[error("snapshot failed, operation aborted before any mutation: {0}")]
    SnapshotFailed(String),

    /// Restoring the snapshot failed; the store may be left inconsistent
    #[error("rollback failed, store may be partially mutated: {0}")]
    RollbackFailed(String),
}

impl StoreError {
    /// Whether the store can no longer be trusted without operator review
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackFailed(_))
    }

    /// Whether a conditional write lost to a concurrent writer. The slot is
    /// gone; the caller should move on rather than retry it.
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether the database stayed locked past the busy timeout. Nothing
    /// was decided about any slot.
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Database(e) if matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            )
        )
    }

    /// Whether the database rejected a write on a uniqueness or check rule
    #[inline]
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(e)
                if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
        )
    }
}
