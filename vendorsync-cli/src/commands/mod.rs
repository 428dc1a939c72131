pub mod apply;
pub mod diff;
pub mod init;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use vendorsync_core::{config, NormalizedProduct, SyncConfig};
use vendorsync_engine::{JsonFileStore, StoreLock};

/// Home directory, config, and the store it points at.
pub struct Workspace {
    pub config: SyncConfig,
    pub store_path: PathBuf,
}

impl Workspace {
    pub fn load() -> Result<Self> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let config = config::load_at(&home).context("failed to load ~/.vendorsync/config.yaml")?;
        let store_path = config.store_path_at(&home);
        Ok(Self { config, store_path })
    }

    /// Exclusive cross-process lock on the store; blocks while another
    /// `vendorsync apply` holds it.
    pub fn lock_store(&self) -> Result<StoreLock> {
        StoreLock::acquire(&self.store_path)
            .with_context(|| format!("failed to lock store '{}'", self.store_path.display()))
    }

    pub fn open_store(&self) -> Result<JsonFileStore> {
        JsonFileStore::open(&self.store_path)
            .with_context(|| format!("failed to open store '{}'", self.store_path.display()))
    }
}

/// Read a JSON array of normalized products.
pub fn load_feed(path: &Path) -> Result<Vec<NormalizedProduct>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read feed '{}'", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("feed '{}' is not a JSON array of products", path.display()))
}

/// First 12 hex chars of a hash, or `-` when empty.
pub fn short_hash(hash: &str) -> String {
    if hash.is_empty() {
        return "-".to_string();
    }
    hash.chars().take(12).collect()
}
