//! slotpool Allocator - allocation protocol and drift reconciliation
//!
//! - [`Allocator`]: verified, conditional, bounded-retry slot assignment
//! - [`Reconciler`]: five-phase sweep that heals toward occupied
//! - [`provision_pool`]: idempotent bulk creation of the slot pool
//! - [`placement_order`]: least-loaded project ordering for `acquire_any`
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use slotpool_allocator::prelude::*;
//!
//! let store = SlotStore::open("slotpool.db", &config.store)?;
//! let scanner = ContentScanner::new(SqliteEngine::open("engine.db", config.engine.clone())?);
//! provision_pool(&store, &scanner, &config.pool)?;
//!
//! let allocator = Allocator::new(store.clone(), scanner.clone()).with_config(config.allocator);
//! let slot = allocator.acquire_any(&UserId::from("alice"))?;
//!
//! let report = Reconciler::new(store, scanner).sweep()?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod allocator;
pub mod error;
pub mod placement;
pub mod provision;
pub mod reconciler;
pub mod report;
pub mod verification;

pub use allocator::Allocator;
pub use error::AllocationError;
pub use placement::placement_order;
pub use provision::{provision_pool, ProvisionSummary};
pub use reconciler::{rebuild_safe_view, Reconciler};
pub use report::ReconciliationReport;
pub use verification::{verify_candidate, Rejection};

/// Re-export the types needed to wire an allocator end to end
pub mod prelude {
    pub use crate::{
        provision_pool, AllocationError, Allocator, ReconciliationReport, Reconciler,
    };
    pub use slotpool_core::{ProjectId, SlotId, SlotpoolConfig, UserId};
    pub use slotpool_scanner::{ContentScanner, ScanOutcome, SqliteEngine};
    pub use slotpool_store::{SlotStore, StoreError};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
