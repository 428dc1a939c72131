//! Cross-process advisory lock beside a file-backed store.
//!
//! [`JsonFileStore`](super::JsonFileStore) loads the whole document, applies,
//! then renames a new one into place. Two processes doing that concurrently
//! lose whichever save lands first, so callers hold a [`StoreLock`] across
//! open → apply → save. The lock lives in `<store file>.lock` and is released
//! when the guard drops.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use vendorsync_core::error::io_err;
use vendorsync_core::StoreError;

#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    _file: File,
}

impl StoreLock {
    /// `<dir>/<file name>.lock` for a store at `<dir>/<file name>`.
    pub fn path_for(store_path: &Path) -> PathBuf {
        let mut name = store_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        store_path.with_file_name(name)
    }

    /// Block until the exclusive lock for `store_path` is held.
    pub fn acquire(store_path: &Path) -> Result<Self, StoreError> {
        if let Some(lock) = Self::try_acquire(store_path)? {
            return Ok(lock);
        }

        let path = Self::path_for(store_path);
        tracing::info!(lock = %path.display(), "waiting for store lock");
        let file = open_lock_file(&path)?;
        file.lock_exclusive().map_err(|e| io_err(&path, e))?;
        Ok(Self { path, _file: file })
    }

    /// Take the lock if free; `None` while another holder has it.
    pub fn try_acquire(store_path: &Path) -> Result<Option<Self>, StoreError> {
        let path = Self::path_for(store_path);
        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { path, _file: file })),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn lock_file_sits_beside_the_store() {
        let path = StoreLock::path_for(Path::new("/data/vendorsync/store.json"));
        assert_eq!(path, PathBuf::from("/data/vendorsync/store.json.lock"));
    }

    #[test]
    fn second_holder_is_refused_until_release() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("nested").join("store.json");

        let first = StoreLock::acquire(&store).unwrap();
        assert!(first.path().exists());
        assert!(StoreLock::try_acquire(&store).unwrap().is_none());

        drop(first);
        assert!(StoreLock::try_acquire(&store).unwrap().is_some());
    }

    #[test]
    fn acquire_waits_for_the_current_holder() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("store.json");
        let events = Arc::new(Mutex::new(Vec::new()));

        let held = StoreLock::acquire(&store).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let waiter = {
            let store = store.clone();
            let events = Arc::clone(&events);
            thread::spawn(move || {
                started_tx.send(()).unwrap();
                let _lock = StoreLock::acquire(&store).unwrap();
                events.lock().unwrap().push("acquired");
            })
        };

        started_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(100));
        events.lock().unwrap().push("released");
        drop(held);
        waiter.join().expect("join");

        assert_eq!(*events.lock().unwrap(), vec!["released", "acquired"]);
    }
}
