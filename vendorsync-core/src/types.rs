//! Domain types for vendor catalog reconciliation.
//!
//! Three groups live here:
//! - the incoming feed shape ([`NormalizedProduct`] and friends),
//! - stored catalog entities ([`StoredProduct`], [`StoreStock`], [`VendorCatalogItem`]),
//! - the run audit trail ([`VendorSyncRun`], [`VendorSyncRunDiff`], [`VendorSyncState`]).
//!
//! Every wire type serializes as camelCase JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::changes::{DiffItem, RemovedItem};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Vendor slug, e.g. `acme`. Also the SKU prefix for that vendor's products.
    VendorSlug
);
string_newtype!(
    /// Storage id of a `Product` row.
    ProductId
);
string_newtype!(
    /// Storage id of a `VendorCatalogItem` row.
    CatalogItemId
);
string_newtype!(
    /// Storage id of a `StoreStock` row.
    StoreStockId
);
string_newtype!(
    /// Storage id of a physical store.
    StoreId
);
string_newtype!(
    /// Storage id of a `VendorSyncRun` row.
    RunId
);

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Product category of a normalized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Frames,
    Lenses,
    Contacts,
    Accessories,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Frames => "Frames",
            Category::Lenses => "Lenses",
            Category::Contacts => "Contacts",
            Category::Accessories => "Accessories",
        }
    }

    /// The only variant kind a product of this category may carry.
    pub fn expected_variant_kind(&self) -> VariantKind {
        match self {
            Category::Frames => VariantKind::Frame,
            Category::Lenses => VariantKind::Lens,
            Category::Contacts => VariantKind::Contact,
            Category::Accessories => VariantKind::Accessory,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind tag of a product variant (`"type"` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Frame,
    Lens,
    Contact,
    Accessory,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKind::Frame => write!(f, "frame"),
            VariantKind::Lens => write!(f, "lens"),
            VariantKind::Contact => write!(f, "contact"),
            VariantKind::Accessory => write!(f, "accessory"),
        }
    }
}

/// Lifecycle status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RunStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "Pending"),
            RunStatus::Success => write!(f, "Success"),
            RunStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Product fields compared by the diff engine, in comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductField {
    Sku,
    Name,
    Category,
    Brand,
    Model,
    Color,
    SizeLabel,
    Usage,
    CatalogUrl,
    Supplier,
}

impl ProductField {
    pub const ALL: [ProductField; 10] = [
        ProductField::Sku,
        ProductField::Name,
        ProductField::Category,
        ProductField::Brand,
        ProductField::Model,
        ProductField::Color,
        ProductField::SizeLabel,
        ProductField::Usage,
        ProductField::CatalogUrl,
        ProductField::Supplier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductField::Sku => "sku",
            ProductField::Name => "name",
            ProductField::Category => "category",
            ProductField::Brand => "brand",
            ProductField::Model => "model",
            ProductField::Color => "color",
            ProductField::SizeLabel => "sizeLabel",
            ProductField::Usage => "usage",
            ProductField::CatalogUrl => "catalogUrl",
            ProductField::Supplier => "supplier",
        }
    }
}

impl fmt::Display for ProductField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Incoming feed
// ---------------------------------------------------------------------------

/// Vendor reference carried by every normalized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorRef {
    pub slug: VendorSlug,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One purchasable variant of a normalized product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(rename = "type")]
    pub kind: VariantKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub attributes: Value,
    /// Category-specific fields (`power`, `baseCurve`, ...), hashed with the record.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Where the vendor record was extracted from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extractor-specific fields (`fetchedAt`, page ids, ...), passed through.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Canonical vendor-agnostic product record, validated upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProduct {
    pub vendor: VendorRef,
    pub catalog_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub category: Category,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub source: SourceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    /// Top-level keys with no dedicated field; kept so they reach the item hash.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Stored catalog
// ---------------------------------------------------------------------------

/// Comparable view of a `Product`. `id == None` means "not yet created".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: Option<ProductId>,
    pub sku: String,
    pub name: String,
    pub category: Category,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub size_label: Option<String>,
    pub usage: Option<String>,
    pub catalog_url: Option<String>,
    pub supplier: Option<String>,
}

impl ProductSnapshot {
    /// String value of a tracked field; `None` for a null column.
    pub fn field_value(&self, field: ProductField) -> Option<String> {
        match field {
            ProductField::Sku => Some(self.sku.clone()),
            ProductField::Name => Some(self.name.clone()),
            ProductField::Category => Some(self.category.as_str().to_string()),
            ProductField::Brand => self.brand.clone(),
            ProductField::Model => self.model.clone(),
            ProductField::Color => self.color.clone(),
            ProductField::SizeLabel => self.size_label.clone(),
            ProductField::Usage => self.usage.clone(),
            ProductField::CatalogUrl => self.catalog_url.clone(),
            ProductField::Supplier => self.supplier.clone(),
        }
    }
}

/// Per-store inventory row of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStock {
    pub id: StoreStockId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub qty: i64,
    pub barcode: Option<String>,
}

/// A stored `Product` together with its stock rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProduct {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Category,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub size_label: Option<String>,
    pub usage: Option<String>,
    pub catalog_url: Option<String>,
    pub supplier: Option<String>,
    #[serde(default)]
    pub stocks: Vec<StoreStock>,
}

impl StoredProduct {
    /// Build a stored row from a snapshot, keeping `stocks` empty.
    pub fn from_snapshot(id: ProductId, snapshot: &ProductSnapshot) -> Self {
        Self {
            id,
            sku: snapshot.sku.clone(),
            name: snapshot.name.clone(),
            category: snapshot.category,
            brand: snapshot.brand.clone(),
            model: snapshot.model.clone(),
            color: snapshot.color.clone(),
            size_label: snapshot.size_label.clone(),
            usage: snapshot.usage.clone(),
            catalog_url: snapshot.catalog_url.clone(),
            supplier: snapshot.supplier.clone(),
            stocks: vec![],
        }
    }

    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            id: Some(self.id.clone()),
            sku: self.sku.clone(),
            name: self.name.clone(),
            category: self.category,
            brand: self.brand.clone(),
            model: self.model.clone(),
            color: self.color.clone(),
            size_label: self.size_label.clone(),
            usage: self.usage.clone(),
            catalog_url: self.catalog_url.clone(),
            supplier: self.supplier.clone(),
        }
    }

    /// Overwrite the tracked fields from `snapshot`; `id` and `stocks` are kept.
    pub fn apply_snapshot(&mut self, snapshot: &ProductSnapshot) {
        let stocks = std::mem::take(&mut self.stocks);
        *self = Self::from_snapshot(self.id.clone(), snapshot);
        self.stocks = stocks;
    }
}

/// Link between a vendor's `catalogId` and a local product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorCatalogItem {
    pub id: CatalogItemId,
    pub vendor: VendorSlug,
    pub catalog_id: String,
    pub product_id: ProductId,
    /// Content hash of the normalized record last applied.
    pub hash: String,
    pub updated_at: DateTime<Utc>,
}

/// Write payload for creating or updating a [`VendorCatalogItem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItemDraft {
    pub vendor: VendorSlug,
    pub catalog_id: String,
    pub product_id: ProductId,
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Run audit trail
// ---------------------------------------------------------------------------

/// Tallies of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounts {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// Audit row of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSyncRun {
    pub id: RunId,
    pub vendor: VendorSlug,
    pub actor: String,
    pub status: RunStatus,
    pub dry_run: bool,
    pub source_path: Option<String>,
    pub hash: String,
    pub counts: SyncCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

/// Payload for creating a run; the store assigns the id and `Pending` status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncRun {
    pub vendor: VendorSlug,
    pub actor: String,
    pub dry_run: bool,
    pub source_path: Option<String>,
    pub hash: String,
    pub counts: SyncCounts,
    pub started_at: DateTime<Utc>,
}

/// Final status and timing written onto a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFinalization {
    pub status: RunStatus,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Capped diff aggregate stored 1:1 with a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSyncRunDiff {
    pub run_id: RunId,
    pub vendor: VendorSlug,
    pub hash: String,
    pub counts: SyncCounts,
    pub items: Vec<DiffItem>,
    pub removed: Vec<RemovedItem>,
    /// `true` when `items` was cut at the summary limit.
    pub truncated: bool,
}

/// Rolling per-vendor state, written after each successful real run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSyncState {
    pub vendor: VendorSlug,
    pub last_hash: String,
    pub last_run_at: DateTime<Utc>,
    pub last_run_by: String,
    pub last_duration_ms: u64,
    pub last_error: Option<String>,
    pub total_items: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
