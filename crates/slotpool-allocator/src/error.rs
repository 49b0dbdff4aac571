//! Allocation errors

use slotpool_core::ProjectId;
use slotpool_store::StoreError;

/// Errors surfaced by [`crate::Allocator`]
///
/// Commit conflicts never appear here; they are consumed by the bounded
/// retry inside `acquire`.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// Every candidate was rejected or lost; a normal outcome
    #[error("no available slots in {}", .project.as_ref().map_or("any project", ProjectId::as_str))]
    NoAvailableSlots { project: Option<ProjectId> },

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AllocationError {
    /// Whether the pool is simply full (caller may expand it or queue the user)
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::NoAvailableSlots { .. })
    }

    /// Whether the store needs operator attention
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_fatal())
    }
}
