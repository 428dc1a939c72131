//! Home-rooted YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.vendorsync/
//!   config.yaml   (mode 0600, optional; defaults apply when absent)
//!   store.json    (default location of the file-backed catalog store)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of diff items kept in a stored run summary.
pub const DEFAULT_DIFF_SUMMARY_LIMIT: usize = 50;

/// How the apply engine treats the interactive transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionPolicy {
    /// Transactional attempts before giving up on the transaction (min 1).
    pub max_attempts: u32,
    /// Linear backoff between attempts: `backoff_ms * attempt`.
    pub backoff_ms: u64,
    /// Re-run the writes without a transaction once attempts are exhausted.
    pub fallback_on_drop: bool,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
            fallback_on_drop: true,
        }
    }
}

impl TransactionPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before attempt number `attempt + 1`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub transaction: TransactionPolicy,
    pub diff_summary_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transaction: TransactionPolicy::default(),
            diff_summary_limit: DEFAULT_DIFF_SUMMARY_LIMIT,
            store_path: None,
        }
    }
}

impl SyncConfig {
    /// Configured store path, or `<home>/.vendorsync/store.json`.
    pub fn store_path_at(&self, home: &Path) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| default_store_path_at(home))
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.vendorsync/`
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".vendorsync")
}

/// `<home>/.vendorsync/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("config.yaml")
}

/// `<home>/.vendorsync/store.json`. Pure, no I/O.
pub fn default_store_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("store.json")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load `config.yaml` under `home`, or defaults when the file is absent.
///
/// Returns `ConfigError::Parse` (with path) if the YAML is malformed.
pub fn load_at(home: &Path) -> Result<SyncConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SyncConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically save `config` to `<home>/.vendorsync/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &SyncConfig) -> Result<PathBuf, ConfigError> {
    let dir = config_dir_at(home);
    std::fs::create_dir_all(&dir)?;
    let path = config_path_at(home);
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(path)
}

/// Write a default config unless one already exists. Returns the path and
/// whether a file was created.
pub fn init_at(home: &Path) -> Result<(PathBuf, bool), ConfigError> {
    let path = config_path_at(home);
    if path.exists() {
        return Ok((path, false));
    }
    let path = save_at(home, &SyncConfig::default())?;
    Ok((path, true))
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
