//! Error types for vendorsync-engine.

use thiserror::Error;

use vendorsync_core::{ConfigError, RunId, StoreError};

/// All errors that can arise from diffing or applying a vendor feed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A feed record escaped the upstream validator in a shape the diff
    /// engine cannot map. No run record exists for this failure.
    #[error("invalid product {catalog_id}: {reason}")]
    InvalidProduct { catalog_id: String, reason: String },

    /// Storage failure outside the write phase (loading state, audit rows).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The write phase of a real run failed. The run has already been
    /// finalized as `Failed` with this message.
    #[error("apply failed for run {run_id}: {source}")]
    Apply {
        run_id: RunId,
        #[source]
        source: StoreError,
    },

    /// JSON serialization error while hashing a record.
    #[error("hash serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub(crate) fn invalid_product(catalog_id: &str, reason: impl Into<String>) -> SyncError {
    SyncError::InvalidProduct {
        catalog_id: catalog_id.to_string(),
        reason: reason.into(),
    }
}
