//! Error types for vendorsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Message fragments that older storage drivers emit when a pooled
/// connection drops an interactive transaction.
const TRANSACTION_DROPPED_MARKERS: [&str; 2] = ["Transaction not found", "Transaction API error"];

/// Failures surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The interactive transaction was dropped by the connection layer.
    /// Writes may be retried outside a transaction.
    #[error("transaction dropped: {reason}")]
    TransactionDropped { reason: String },

    /// An update targeted a record that no longer exists.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Any other write failure.
    #[error("write failed: {0}")]
    Write(String),

    /// I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error from a file-backed store.
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Map a raw driver message onto the typed taxonomy.
    ///
    /// Backends whose driver only reports strings call this once at the
    /// boundary; the engine matches on variants, never on text.
    pub fn classify_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if TRANSACTION_DROPPED_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            StoreError::TransactionDropped { reason: message }
        } else {
            StoreError::Write(message)
        }
    }

    pub fn is_transaction_dropped(&self) -> bool {
        matches!(self, StoreError::TransactionDropped { .. })
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

/// Errors from loading or saving the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
