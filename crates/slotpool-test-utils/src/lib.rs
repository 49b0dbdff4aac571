//! Testing utilities for slotpool workspace
//!
//! Shared fixtures:
//! - [`FakeEngine`]: in-memory engine collaborator with failure injection
//! - [`TempStore`]: file-backed store in a temp dir, reopenable per thread
//! - Seeding helpers that write rows directly, bypassing the allocator

#![allow(missing_docs)]

use parking_lot::Mutex;
use slotpool_core::{
    now, AssignedBy, EngineCollaborator, EngineError, PoolLayout, ProjectId, SlotId,
    SlotMetadata, StoreConfig, UserId,
};
use slotpool_store::{metadata, slots, SlotStore, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Default)]
struct EngineState {
    tags: BTreeMap<String, u64>,
    failing: BTreeSet<SlotId>,
    unreachable: bool,
    table_missing: bool,
}

/// Engine double: a tag -> row count map
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `rows` resources tagged with `slot_id`
    pub fn tag(&self, slot_id: &SlotId, rows: u64) {
        *self.state.lock().tags.entry(slot_id.to_string()).or_default() += rows;
    }

    /// Add resources under a raw tag that need not be a known slot
    pub fn tag_raw(&self, tag: &str, rows: u64) {
        *self.state.lock().tags.entry(tag.to_string()).or_default() += rows;
    }

    /// Remove every resource tagged with `slot_id`
    pub fn clear(&self, slot_id: &SlotId) {
        self.state.lock().tags.remove(slot_id.as_str());
    }

    /// Make queries for one slot fail
    pub fn fail_slot(&self, slot_id: &SlotId) {
        self.state.lock().failing.insert(slot_id.clone());
    }

    /// Make every query fail as if the engine were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Pretend the resource table has been dropped or renamed
    pub fn set_table_missing(&self, missing: bool) {
        self.state.lock().table_missing = missing;
    }
}

impl EngineCollaborator for FakeEngine {
    fn resource_table_exists(&self) -> Result<bool, EngineError> {
        let state = self.state.lock();
        if state.unreachable {
            return Err(EngineError::Unreachable("fake engine offline".to_string()));
        }
        Ok(!state.table_missing)
    }

    fn count_resources_for_slot(&self, slot_id: &SlotId) -> Result<u64, EngineError> {
        let state = self.state.lock();
        if state.unreachable {
            return Err(EngineError::Unreachable("fake engine offline".to_string()));
        }
        if state.failing.contains(slot_id) {
            return Err(EngineError::Query(format!("injected failure for {slot_id}")));
        }
        Ok(state.tags.get(slot_id.as_str()).copied().unwrap_or(0))
    }

    fn resource_tags(&self) -> Result<BTreeMap<String, u64>, EngineError> {
        let state = self.state.lock();
        if state.unreachable {
            return Err(EngineError::Unreachable("fake engine offline".to_string()));
        }
        Ok(state.tags.clone())
    }
}

/// File-backed store in a temporary directory
pub struct TempStore {
    pub dir: TempDir,
    pub path: PathBuf,
    pub store: SlotStore,
}

impl TempStore {
    /// Open a second, independent connection to the same file
    pub fn reopen(&self) -> SlotStore {
        SlotStore::open(&self.path, &StoreConfig::default()).unwrap()
    }
}

/// Fresh store on disk (WAL, busy timeout) so multiple handles can contend
pub fn temp_store() -> TempStore {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slotpool.db");
    let store = SlotStore::open(&path, &StoreConfig::default()).unwrap();
    TempStore { dir, path, store }
}

/// Insert free slots for every id in `layout`
pub fn seed_layout(store: &SlotStore, layout: &PoolLayout) {
    store
        .write(|c| {
            for (project, slot) in layout.slot_ids() {
                slots::insert_if_missing(c, &slot, &project)?;
            }
            Ok(())
        })
        .unwrap();
}

/// Insert free slots `"{project}-{n}"` for n in 1..=count
pub fn seed_project(store: &SlotStore, project: &str, count: usize) -> Vec<SlotId> {
    let project_id = ProjectId::from(project);
    let ids: Vec<SlotId> = (1..=count).map(|n| SlotId::new(format!("{project}-{n}"))).collect();
    store
        .write(|c| {
            for id in &ids {
                slots::insert_if_missing(c, id, &project_id)?;
            }
            Ok(())
        })
        .unwrap();
    ids
}

/// Write a metadata row without touching `slots` (simulates a half-written assignment)
pub fn seed_metadata(store: &SlotStore, slot_id: &SlotId, owner: &str, by: AssignedBy) {
    store
        .write(|c| {
            let meta = SlotMetadata::new(slot_id.clone(), UserId::from(owner), now(), by);
            Ok(metadata::insert(c, &meta)?)
        })
        .unwrap();
}

/// Mark a slot assigned without metadata or audit (simulates a manual write)
pub fn force_assign(store: &SlotStore, slot_id: &SlotId, user: &str) {
    store
        .write(|c| {
            if slots::mark_assigned_if_free(c, slot_id, &UserId::from(user), &now())? {
                Ok(())
            } else {
                Err(StoreError::Conflict(slot_id.clone()))
            }
        })
        .unwrap();
}

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
