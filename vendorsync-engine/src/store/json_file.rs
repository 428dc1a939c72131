//! File-backed store: a [`MemoryStore`] persisted as one JSON document.
//!
//! Writes use the atomic `.tmp` + rename pattern. Nothing reaches disk until
//! [`JsonFileStore::save`] is called.

use std::path::{Path, PathBuf};

use vendorsync_core::error::io_err;
use vendorsync_core::{
    CatalogItemDraft, CatalogItemId, NewSyncRun, ProductId, ProductSnapshot, RunFinalization,
    RunId, StockLevel, StoreError, StoreStockId, VendorSlug, VendorSyncRunDiff, VendorSyncState,
};

use super::{
    CatalogState, CatalogStore, CatalogWriter, ExistingCatalog, MemoryStore, TransactionWork,
};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            serde_json::from_str::<CatalogState>(&contents)?
        } else {
            CatalogState::default()
        };
        Ok(Self {
            path,
            inner: MemoryStore::from_state(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.inner
    }

    /// Persist atomically: write `<path>.tmp`, then rename over `<path>`.
    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let json = serde_json::to_string_pretty(self.inner.state())?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        Ok(())
    }
}

impl CatalogWriter for JsonFileStore {
    fn create_product(&mut self, product: &ProductSnapshot) -> Result<ProductId, StoreError> {
        self.inner.create_product(product)
    }

    fn update_product(
        &mut self,
        id: &ProductId,
        product: &ProductSnapshot,
    ) -> Result<(), StoreError> {
        self.inner.update_product(id, product)
    }

    fn create_catalog_item(
        &mut self,
        item: &CatalogItemDraft,
    ) -> Result<CatalogItemId, StoreError> {
        self.inner.create_catalog_item(item)
    }

    fn update_catalog_item(
        &mut self,
        id: &CatalogItemId,
        item: &CatalogItemDraft,
    ) -> Result<(), StoreError> {
        self.inner.update_catalog_item(id, item)
    }

    fn update_store_stock(
        &mut self,
        id: &StoreStockId,
        level: &StockLevel,
    ) -> Result<(), StoreError> {
        self.inner.update_store_stock(id, level)
    }
}

impl CatalogStore for JsonFileStore {
    fn load_existing(&self, vendor: &VendorSlug) -> Result<ExistingCatalog, StoreError> {
        self.inner.load_existing(vendor)
    }

    fn create_run(&mut self, run: &NewSyncRun) -> Result<RunId, StoreError> {
        self.inner.create_run(run)
    }

    fn update_run(
        &mut self,
        id: &RunId,
        finalization: &RunFinalization,
    ) -> Result<(), StoreError> {
        self.inner.update_run(id, finalization)
    }

    fn upsert_run_diff(&mut self, diff: &VendorSyncRunDiff) -> Result<(), StoreError> {
        self.inner.upsert_run_diff(diff)
    }

    fn upsert_vendor_state(&mut self, state: &VendorSyncState) -> Result<(), StoreError> {
        self.inner.upsert_vendor_state(state)
    }

    fn supports_transactions(&self) -> bool {
        self.inner.supports_transactions()
    }

    fn transaction(&mut self, work: TransactionWork<'_>) -> Result<(), StoreError> {
        self.inner.transaction(work)
    }
}
