//! # vendorsync-engine
//!
//! Change-set computation and audited application for vendor catalog feeds.
//!
//! Call [`compute_diff`] to compare a normalized feed against stored state,
//! [`execute_apply`] to record and apply one run, or [`run_vendor_sync`] to
//! do both against a [`CatalogStore`] under a per-vendor lock.

pub mod apply;
pub mod diff;
pub mod error;
pub mod hash;
pub mod pipeline;
pub mod store;

pub use apply::{
    apply_writes, execute_apply, summarize_diff, ApplyContext, ApplyOptions, ApplyOutcome,
    SyncSummary, WritePath, WriteStats,
};
pub use diff::compute_diff;
pub use error::SyncError;
pub use pipeline::{preview_diff, run_vendor_sync, SyncRequest, VendorRunGate};
pub use store::{
    CatalogState, CatalogStore, CatalogWriter, ExistingCatalog, JsonFileStore, MemoryStore,
    StoreLock, TransactionWork,
};
