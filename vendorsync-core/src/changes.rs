//! Change-set model produced by the diff engine.
//!
//! A [`DiffResult`] is recomputed fresh on every run and never persisted on
//! its own; a capped copy of it is stored as a
//! [`VendorSyncRunDiff`](crate::types::VendorSyncRunDiff).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{
    CatalogItemId, ProductField, ProductId, ProductSnapshot, StoreId, StoreStock, StoreStockId,
    SyncCounts, VendorSlug,
};

/// Classification of an incoming record against stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    New,
    Updated,
    Unchanged,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffStatus::New => write!(f, "new"),
            DiffStatus::Updated => write!(f, "updated"),
            DiffStatus::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// One mismatching tracked field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: ProductField,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Quantity and barcode of a stock row at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub qty: i64,
    pub barcode: Option<String>,
}

/// Planned change to an existing stock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub store_stock_id: StoreStockId,
    pub store_id: StoreId,
    pub before: StockLevel,
    pub after: StockLevel,
    pub changed: bool,
}

/// Per-`catalogId` entry of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffItem {
    pub catalog_id: String,
    pub status: DiffStatus,
    pub product_before: Option<ProductSnapshot>,
    pub product_after: ProductSnapshot,
    pub product_changes: Vec<FieldChange>,
    pub stock_changes: Vec<StockChange>,
    /// Content hash of the incoming normalized record.
    pub hash: String,
    pub existing_hash: Option<String>,
    pub catalog_item_id: Option<CatalogItemId>,
}

impl DiffItem {
    /// Stock changes that will actually be written.
    pub fn changed_stocks(&self) -> impl Iterator<Item = &StockChange> {
        self.stock_changes.iter().filter(|s| s.changed)
    }
}

/// A stored product whose `catalogId` is absent from the current feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedItem {
    pub catalog_id: String,
    pub catalog_item_id: Option<CatalogItemId>,
    pub product_id: ProductId,
    pub sku: String,
    /// Every stock row of the product; all are zeroed on apply.
    pub stocks: Vec<StoreStock>,
}

/// Complete change-set for one vendor feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub vendor: VendorSlug,
    /// Order-independent digest over all item hashes; empty for an empty feed.
    pub hash: String,
    pub counts: SyncCounts,
    pub items: Vec<DiffItem>,
    pub removed: Vec<RemovedItem>,
}

impl DiffResult {
    /// `true` when applying this diff would not write anything.
    pub fn is_noop(&self) -> bool {
        self.counts.created == 0 && self.counts.updated == 0 && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DiffStatus::New).unwrap(), "\"new\"");
        assert_eq!(DiffStatus::Unchanged.to_string(), "unchanged");
    }

    #[test]
    fn changed_stocks_filters_unchanged_rows() {
        let level = |qty| StockLevel { qty, barcode: None };
        let item = DiffItem {
            catalog_id: "X1".into(),
            status: DiffStatus::Updated,
            product_before: None,
            product_after: ProductSnapshot {
                id: None,
                sku: "acme:X1".into(),
                name: "X1".into(),
                category: crate::types::Category::Frames,
                brand: None,
                model: None,
                color: None,
                size_label: None,
                usage: None,
                catalog_url: None,
                supplier: None,
            },
            product_changes: vec![],
            stock_changes: vec![
                StockChange {
                    store_stock_id: StoreStockId::from("s1"),
                    store_id: StoreId::from("a"),
                    before: level(1),
                    after: level(1),
                    changed: false,
                },
                StockChange {
                    store_stock_id: StoreStockId::from("s2"),
                    store_id: StoreId::from("b"),
                    before: level(0),
                    after: level(1),
                    changed: true,
                },
            ],
            hash: "h".into(),
            existing_hash: None,
            catalog_item_id: None,
        };
        let ids: Vec<_> = item
            .changed_stocks()
            .map(|s| s.store_stock_id.as_str())
            .collect();
        assert_eq!(ids, ["s2"]);
    }
}
