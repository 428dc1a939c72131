//! vendorsync core library: domain types, change-set model, errors, config.
//!
//! - [`types`]: newtypes, feed records, stored entities, run audit rows
//! - [`changes`]: the [`DiffResult`] change-set
//! - [`error`]: [`StoreError`], [`ConfigError`]
//! - [`config`]: `~/.vendorsync/config.yaml`

pub mod changes;
pub mod config;
pub mod error;
pub mod types;

pub use changes::{
    DiffItem, DiffResult, DiffStatus, FieldChange, RemovedItem, StockChange, StockLevel,
};
pub use config::{SyncConfig, TransactionPolicy};
pub use error::{ConfigError, StoreError};
pub use types::{
    CatalogItemDraft, CatalogItemId, Category, NewSyncRun, NormalizedProduct, Price,
    ProductField, ProductId, ProductSnapshot, RunFinalization, RunId, RunStatus, SourceRef,
    StoreId, StoreStock, StoreStockId, StoredProduct, SyncCounts, Variant, VariantKind,
    VendorCatalogItem, VendorRef, VendorSlug, VendorSyncRun, VendorSyncRunDiff, VendorSyncState,
};
