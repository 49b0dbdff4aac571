//! slotpool Core - shared domain for the slot allocator
//!
//! Carves isolated "slots" (project/folder pairs) out of a shared workflow
//! engine so each tenant sees a dedicated workspace. This crate holds what
//! every layer agrees on:
//! - Slot, metadata and audit records
//! - The read-only engine collaborator seam
//! - Configuration (TOML)
//!
//! Storage lives in `slotpool-store`, ground-truth scanning in
//! `slotpool-scanner`, and the allocation protocol plus reconciliation in
//! `slotpool-allocator`.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod engine;
pub mod types;

pub use config::{
    AllocatorConfig, ConfigError, EngineSchema, PoolLayout, ReconcilerConfig, SlotpoolConfig,
    StoreConfig, MAX_POOL_SLOTS,
};
pub use engine::{EngineCollaborator, EngineError};
pub use types::{
    decode_timestamp, encode_timestamp, now, AssignedBy, Assignment, AuditAction, AuditEntry,
    MetadataStatus, ProjectCapacity, ProjectId, Slot, SlotId, SlotMetadata, UserId,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
