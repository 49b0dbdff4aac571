//! slotpool Store - transactional persistence for slot allocation
//!
//! One SQLite database holds four tables:
//! - `slots`: the allocation store and sole commit authority
//! - `slot_metadata`: assignment side-channel, never deleted
//! - `audit_log`: append-only record of every decision and drift finding
//! - `safe_slot_view`: recomputable candidate list for the allocator
//!
//! Table modules expose plain functions over `&Connection` so callers can
//! compose them inside [`SlotStore::write`] or [`SlotStore::guarded`].

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod audit;
mod codec;
pub mod error;
pub mod guard;
pub mod metadata;
mod schema;
pub mod slots;
pub mod store;
pub mod view;

pub use error::StoreError;
pub use guard::{with_snapshot_and_transaction, Snapshot, StoreSnapshot};
pub use rusqlite::Connection;
pub use store::SlotStore;
pub use view::SafeSlot;
