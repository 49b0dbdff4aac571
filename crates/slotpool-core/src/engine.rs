//! Read-only seam to the workflow engine's own resource rows
//!
//! The allocator never writes to engine tables; it only counts rows tagged
//! with a slot id. Implementations must be safe to share across threads.

use crate::types::SlotId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Engine access failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Engine database could not be reached
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    /// Expected table or column is missing
    #[error("engine schema missing: {0}")]
    SchemaMissing(String),

    /// Query ran but failed
    #[error("engine query failed: {0}")]
    Query(String),
}

/// Read-only view of engine resources
pub trait EngineCollaborator: Send + Sync {
    /// Whether the resource table (and its tag column) exist
    ///
    /// # Errors
    /// Returns an error when the probe itself cannot run
    fn resource_table_exists(&self) -> Result<bool, EngineError>;

    /// Number of engine rows tagged with `slot_id`
    ///
    /// # Errors
    /// Returns an error when the engine cannot answer
    fn count_resources_for_slot(&self, slot_id: &SlotId) -> Result<u64, EngineError>;

    /// Every distinct tag value with its row count
    ///
    /// # Errors
    /// Returns an error when the engine cannot answer
    fn resource_tags(&self) -> Result<BTreeMap<String, u64>, EngineError>;
}

impl<T: EngineCollaborator + ?Sized> EngineCollaborator for Arc<T> {
    fn resource_table_exists(&self) -> Result<bool, EngineError> {
        (**self).resource_table_exists()
    }

    fn count_resources_for_slot(&self, slot_id: &SlotId) -> Result<u64, EngineError> {
        (**self).count_resources_for_slot(slot_id)
    }

    fn resource_tags(&self) -> Result<BTreeMap<String, u64>, EngineError> {
        (**self).resource_tags()
    }
}
