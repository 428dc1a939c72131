//! In-memory reference store.
//!
//! Rows live in insertion-ordered vectors; ids are per-kind sequences
//! (`prod-1`, `stock-1`, `item-1`, `run-1`). Transactions run the closure
//! against a copy of the state and swap it in only when the closure succeeds.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use vendorsync_core::{
    CatalogItemDraft, CatalogItemId, NewSyncRun, ProductId, ProductSnapshot, RunFinalization,
    RunId, RunStatus, StockLevel, StoreError, StoreId, StoreStock, StoreStockId, StoredProduct,
    VendorCatalogItem, VendorSlug, VendorSyncRun, VendorSyncRunDiff, VendorSyncState,
};

use super::{CatalogStore, CatalogWriter, ExistingCatalog, TransactionWork};

/// Serializable contents of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogState {
    /// Products without stocks; stock rows live in `stocks`.
    pub products: Vec<StoredProduct>,
    pub stocks: Vec<StoreStock>,
    pub catalog_items: Vec<VendorCatalogItem>,
    pub runs: Vec<VendorSyncRun>,
    pub run_diffs: Vec<VendorSyncRunDiff>,
    pub vendor_states: Vec<VendorSyncState>,
    pub sequences: BTreeMap<String, u64>,
}

impl CatalogState {
    fn next_id(&mut self, prefix: &str) -> String {
        let seq = self.sequences.entry(prefix.to_string()).or_insert(0);
        *seq += 1;
        format!("{prefix}-{seq}")
    }

    fn product_mut(&mut self, id: &ProductId) -> Result<&mut StoredProduct, StoreError> {
        self.products
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| StoreError::not_found("Product", id))
    }

    fn with_stocks(&self, product: &StoredProduct) -> StoredProduct {
        let mut product = product.clone();
        product.stocks = self
            .stocks
            .iter()
            .filter(|s| s.product_id == product.id)
            .cloned()
            .collect();
        product
    }
}

/// In-memory [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: CatalogState,
    transactions: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with interactive transactions enabled.
    pub fn new() -> Self {
        Self::from_state(CatalogState::default())
    }

    pub fn from_state(state: CatalogState) -> Self {
        Self {
            state,
            transactions: true,
        }
    }

    /// Store that reports no transaction support; writes go straight through.
    pub fn without_transactions(mut self) -> Self {
        self.transactions = false;
        self
    }

    pub fn state(&self) -> &CatalogState {
        &self.state
    }

    pub fn into_state(self) -> CatalogState {
        self.state
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    pub fn insert_product(&mut self, product: &ProductSnapshot) -> ProductId {
        let id = ProductId::from(self.state.next_id("prod"));
        self.state
            .products
            .push(StoredProduct::from_snapshot(id.clone(), product));
        id
    }

    pub fn insert_stock(
        &mut self,
        product_id: &ProductId,
        store_id: &StoreId,
        level: StockLevel,
    ) -> StoreStockId {
        let id = StoreStockId::from(self.state.next_id("stock"));
        self.state.stocks.push(StoreStock {
            id: id.clone(),
            store_id: store_id.clone(),
            product_id: product_id.clone(),
            qty: level.qty,
            barcode: level.barcode,
        });
        id
    }

    pub fn insert_catalog_item(&mut self, item: &CatalogItemDraft) -> CatalogItemId {
        let id = CatalogItemId::from(self.state.next_id("item"));
        self.state.catalog_items.push(VendorCatalogItem {
            id: id.clone(),
            vendor: item.vendor.clone(),
            catalog_id: item.catalog_id.clone(),
            product_id: item.product_id.clone(),
            hash: item.hash.clone(),
            updated_at: Utc::now(),
        });
        id
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Product with its stocks attached.
    pub fn product(&self, id: &ProductId) -> Option<StoredProduct> {
        self.state
            .products
            .iter()
            .find(|p| &p.id == id)
            .map(|p| self.state.with_stocks(p))
    }

    pub fn product_by_sku(&self, sku: &str) -> Option<StoredProduct> {
        self.state
            .products
            .iter()
            .find(|p| p.sku == sku)
            .map(|p| self.state.with_stocks(p))
    }

    pub fn stock(&self, id: &StoreStockId) -> Option<&StoreStock> {
        self.state.stocks.iter().find(|s| &s.id == id)
    }

    pub fn catalog_item(
        &self,
        vendor: &VendorSlug,
        catalog_id: &str,
    ) -> Option<&VendorCatalogItem> {
        self.state
            .catalog_items
            .iter()
            .find(|c| &c.vendor == vendor && c.catalog_id == catalog_id)
    }

    pub fn runs(&self) -> &[VendorSyncRun] {
        &self.state.runs
    }

    pub fn run(&self, id: &RunId) -> Option<&VendorSyncRun> {
        self.state.runs.iter().find(|r| &r.id == id)
    }

    /// Runs never finalized, e.g. after an interrupted apply.
    pub fn pending_runs(&self) -> Vec<&VendorSyncRun> {
        self.state
            .runs
            .iter()
            .filter(|r| r.status == RunStatus::Pending)
            .collect()
    }

    pub fn run_diff(&self, run_id: &RunId) -> Option<&VendorSyncRunDiff> {
        self.state.run_diffs.iter().find(|d| &d.run_id == run_id)
    }

    pub fn vendor_state(&self, vendor: &VendorSlug) -> Option<&VendorSyncState> {
        self.state.vendor_states.iter().find(|s| &s.vendor == vendor)
    }

    pub fn vendor_states(&self) -> &[VendorSyncState] {
        &self.state.vendor_states
    }
}

impl CatalogWriter for MemoryStore {
    fn create_product(&mut self, product: &ProductSnapshot) -> Result<ProductId, StoreError> {
        if self.state.products.iter().any(|p| p.sku == product.sku) {
            return Err(StoreError::Write(format!(
                "unique constraint failed on sku {}",
                product.sku
            )));
        }
        Ok(self.insert_product(product))
    }

    fn update_product(
        &mut self,
        id: &ProductId,
        product: &ProductSnapshot,
    ) -> Result<(), StoreError> {
        self.state.product_mut(id)?.apply_snapshot(product);
        Ok(())
    }

    fn create_catalog_item(
        &mut self,
        item: &CatalogItemDraft,
    ) -> Result<CatalogItemId, StoreError> {
        if self.catalog_item(&item.vendor, &item.catalog_id).is_some() {
            return Err(StoreError::Write(format!(
                "unique constraint failed on catalog item {}:{}",
                item.vendor, item.catalog_id
            )));
        }
        Ok(self.insert_catalog_item(item))
    }

    fn update_catalog_item(
        &mut self,
        id: &CatalogItemId,
        item: &CatalogItemDraft,
    ) -> Result<(), StoreError> {
        let row = self
            .state
            .catalog_items
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| StoreError::not_found("VendorCatalogItem", id))?;
        row.product_id = item.product_id.clone();
        row.hash = item.hash.clone();
        row.updated_at = Utc::now();
        Ok(())
    }

    fn update_store_stock(
        &mut self,
        id: &StoreStockId,
        level: &StockLevel,
    ) -> Result<(), StoreError> {
        let row = self
            .state
            .stocks
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| StoreError::not_found("StoreStock", id))?;
        row.qty = level.qty;
        row.barcode = level.barcode.clone();
        Ok(())
    }
}

impl CatalogStore for MemoryStore {
    fn load_existing(&self, vendor: &VendorSlug) -> Result<ExistingCatalog, StoreError> {
        let catalog_items: Vec<VendorCatalogItem> = self
            .state
            .catalog_items
            .iter()
            .filter(|c| &c.vendor == vendor)
            .cloned()
            .collect();

        let prefix = format!("{vendor}:");
        let products = self
            .state
            .products
            .iter()
            .filter(|p| {
                p.sku.starts_with(&prefix) || catalog_items.iter().any(|c| c.product_id == p.id)
            })
            .map(|p| self.state.with_stocks(p))
            .collect();

        Ok(ExistingCatalog {
            catalog_items,
            products,
        })
    }

    fn create_run(&mut self, run: &NewSyncRun) -> Result<RunId, StoreError> {
        let id = RunId::from(self.state.next_id("run"));
        self.state.runs.push(VendorSyncRun {
            id: id.clone(),
            vendor: run.vendor.clone(),
            actor: run.actor.clone(),
            status: RunStatus::Pending,
            dry_run: run.dry_run,
            source_path: run.source_path.clone(),
            hash: run.hash.clone(),
            counts: run.counts,
            started_at: run.started_at,
            finished_at: None,
            duration_ms: None,
            error: None,
        });
        Ok(id)
    }

    fn update_run(
        &mut self,
        id: &RunId,
        finalization: &RunFinalization,
    ) -> Result<(), StoreError> {
        let run = self
            .state
            .runs
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| StoreError::not_found("VendorSyncRun", id))?;
        run.status = finalization.status;
        run.finished_at = Some(finalization.finished_at);
        run.duration_ms = Some(finalization.duration_ms);
        run.error = finalization.error.clone();
        Ok(())
    }

    fn upsert_run_diff(&mut self, diff: &VendorSyncRunDiff) -> Result<(), StoreError> {
        match self
            .state
            .run_diffs
            .iter_mut()
            .find(|d| d.run_id == diff.run_id)
        {
            Some(existing) => *existing = diff.clone(),
            None => self.state.run_diffs.push(diff.clone()),
        }
        Ok(())
    }

    fn upsert_vendor_state(&mut self, state: &VendorSyncState) -> Result<(), StoreError> {
        match self
            .state
            .vendor_states
            .iter_mut()
            .find(|s| s.vendor == state.vendor)
        {
            Some(existing) => *existing = state.clone(),
            None => self.state.vendor_states.push(state.clone()),
        }
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        self.transactions
    }

    fn transaction(&mut self, work: TransactionWork<'_>) -> Result<(), StoreError> {
        if !self.transactions {
            return Err(StoreError::Write(
                "interactive transactions are disabled for this store".to_string(),
            ));
        }
        let mut scratch = MemoryStore::from_state(self.state.clone());
        work(&mut scratch)?;
        self.state = scratch.state;
        Ok(())
    }
}
