//! slotpool Scanner - ground truth from the workflow engine
//!
//! Counts engine resources tagged with a slot id. Two layers:
//! - [`ContentScanner`]: probe-then-count, folding every failure into
//!   [`ScanOutcome::Unknown`]
//! - [`SqliteEngine`]: read-only [`slotpool_core::EngineCollaborator`] for
//!   engines that keep their state in SQLite

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod scanner;
pub mod sqlite_engine;

pub use scanner::{ContentScanner, ScanOutcome};
pub use sqlite_engine::SqliteEngine;
