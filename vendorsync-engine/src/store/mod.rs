//! Storage collaborator contract consumed by the apply engine.
//!
//! [`CatalogWriter`] covers the catalog writes issued while applying a diff;
//! [`CatalogStore`] adds state loading, the run audit trail, and the optional
//! interactive transaction.
//!
//! Backends report a dropped transaction as
//! [`StoreError::TransactionDropped`](vendorsync_core::StoreError::TransactionDropped).
//! Drivers that only surface text should map it once with
//! [`StoreError::classify_message`](vendorsync_core::StoreError::classify_message).

mod json_file;
mod lock;
mod memory;

pub use json_file::JsonFileStore;
pub use lock::StoreLock;
pub use memory::{CatalogState, MemoryStore};

use vendorsync_core::{
    CatalogItemDraft, CatalogItemId, NewSyncRun, ProductId, ProductSnapshot, RunFinalization,
    RunId, StockLevel, StoreError, StoreStockId, StoredProduct, VendorCatalogItem, VendorSlug,
    VendorSyncRunDiff, VendorSyncState,
};

/// Closure run inside an interactive transaction.
pub type TransactionWork<'a> =
    &'a mut dyn FnMut(&mut dyn CatalogWriter) -> Result<(), StoreError>;

/// Catalog writes issued while applying a diff.
pub trait CatalogWriter {
    fn create_product(&mut self, product: &ProductSnapshot) -> Result<ProductId, StoreError>;

    /// Fails with `NotFound` if the product vanished since the diff.
    fn update_product(
        &mut self,
        id: &ProductId,
        product: &ProductSnapshot,
    ) -> Result<(), StoreError>;

    fn create_catalog_item(&mut self, item: &CatalogItemDraft)
        -> Result<CatalogItemId, StoreError>;

    fn update_catalog_item(
        &mut self,
        id: &CatalogItemId,
        item: &CatalogItemDraft,
    ) -> Result<(), StoreError>;

    fn update_store_stock(&mut self, id: &StoreStockId, level: &StockLevel)
        -> Result<(), StoreError>;
}

/// Stored state a vendor feed is compared against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingCatalog {
    pub catalog_items: Vec<VendorCatalogItem>,
    /// Products with their stock rows attached.
    pub products: Vec<StoredProduct>,
}

/// Full storage contract: catalog writes plus loading and audit rows.
pub trait CatalogStore: CatalogWriter {
    /// Catalog items and products (with stocks) belonging to `vendor`.
    fn load_existing(&self, vendor: &VendorSlug) -> Result<ExistingCatalog, StoreError>;

    /// Insert a `Pending` run and return its id.
    fn create_run(&mut self, run: &NewSyncRun) -> Result<RunId, StoreError>;

    fn update_run(&mut self, id: &RunId, finalization: &RunFinalization)
        -> Result<(), StoreError>;

    /// Insert or replace the diff summary keyed by `diff.run_id`.
    fn upsert_run_diff(&mut self, diff: &VendorSyncRunDiff) -> Result<(), StoreError>;

    /// Insert or replace the rolling state keyed by `state.vendor`.
    fn upsert_vendor_state(&mut self, state: &VendorSyncState) -> Result<(), StoreError>;

    fn supports_transactions(&self) -> bool {
        false
    }

    /// Run `work` atomically: either every write lands or none does.
    fn transaction(&mut self, work: TransactionWork<'_>) -> Result<(), StoreError> {
        let _ = work;
        Err(StoreError::Write(
            "interactive transactions are not supported by this store".to_string(),
        ))
    }
}
