//! Content scanner: ground truth from engine resources
//!
//! Every answer is either a provable count or [`ScanOutcome::Unknown`].
//! Callers must treat `Unknown` as "might be occupied"; nothing here ever
//! turns a failure into zero.

use serde::Serialize;
use slotpool_core::{EngineCollaborator, EngineError, SlotId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Result of scanning one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Engine answered with an exact row count
    Count(u64),
    /// Engine could not answer; reason for the log
    Unknown(String),
}

impl ScanOutcome {
    /// Only an exact zero proves a slot empty
    #[inline]
    #[must_use]
    pub fn is_provably_empty(&self) -> bool {
        matches!(self, Self::Count(0))
    }

    /// Non-zero count or unknown
    #[inline]
    #[must_use]
    pub fn might_be_occupied(&self) -> bool {
        !self.is_provably_empty()
    }

    /// The exact count, if known
    #[inline]
    #[must_use]
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Unknown(_) => None,
        }
    }
}

impl std::fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n} resource(s)"),
            Self::Unknown(reason) => write!(f, "unknown ({reason})"),
        }
    }
}

/// Scans engine resources through an [`EngineCollaborator`]
#[derive(Clone)]
pub struct ContentScanner {
    engine: Arc<dyn EngineCollaborator>,
}

impl std::fmt::Debug for ContentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentScanner").finish_non_exhaustive()
    }
}

impl ContentScanner {
    /// Create new scanner over an engine collaborator
    #[inline]
    #[must_use]
    pub fn new(engine: impl EngineCollaborator + 'static) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Create new scanner sharing an existing collaborator
    #[inline]
    #[must_use]
    pub fn from_arc(engine: Arc<dyn EngineCollaborator>) -> Self {
        Self { engine }
    }

    /// Count resources tagged with `slot_id`
    ///
    /// Probes the resource table first; a missing table, a failed probe or a
    /// failed count all yield [`ScanOutcome::Unknown`].
    #[must_use]
    pub fn scan(&self, slot_id: &SlotId) -> ScanOutcome {
        match self.probe() {
            Ok(()) => self.count(slot_id),
            Err(reason) => {
                tracing::warn!("Scan of {} degraded: {}", slot_id, reason);
                ScanOutcome::Unknown(reason)
            }
        }
    }

    /// Scan a batch, probing the schema once
    #[must_use]
    pub fn scan_many(&self, slot_ids: &[SlotId]) -> BTreeMap<SlotId, ScanOutcome> {
        match self.probe() {
            Ok(()) => slot_ids
                .iter()
                .map(|id| (id.clone(), self.count(id)))
                .collect(),
            Err(reason) => {
                tracing::warn!("Batch scan of {} slot(s) degraded: {}", slot_ids.len(), reason);
                slot_ids
                    .iter()
                    .map(|id| (id.clone(), ScanOutcome::Unknown(reason.clone())))
                    .collect()
            }
        }
    }

    /// Engine tags that reference no slot in `known`, with their row counts
    ///
    /// # Errors
    /// Returns the engine error when tags cannot be listed; orphan detection
    /// is report-only, so callers may log and continue
    pub fn orphan_tags(
        &self,
        known: &BTreeSet<SlotId>,
    ) -> Result<BTreeMap<String, u64>, EngineError> {
        if !self.engine.resource_table_exists()? {
            return Err(EngineError::SchemaMissing("resource table".to_string()));
        }
        Ok(self
            .engine
            .resource_tags()?
            .into_iter()
            .filter(|(tag, rows)| *rows > 0 && !known.contains(&SlotId::new(tag.as_str())))
            .collect())
    }

    fn probe(&self) -> Result<(), String> {
        match self.engine.resource_table_exists() {
            Ok(true) => Ok(()),
            Ok(false) => Err("resource table or tag column missing".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn count(&self, slot_id: &SlotId) -> ScanOutcome {
        match self.engine.count_resources_for_slot(slot_id) {
            Ok(n) => ScanOutcome::Count(n),
            Err(e) => {
                tracing::warn!("Scan of {} failed: {}", slot_id, e);
                ScanOutcome::Unknown(e.to_string())
            }
        }
    }
}
