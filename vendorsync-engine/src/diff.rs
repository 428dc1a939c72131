//! Diff engine: incoming normalized feed vs stored catalog → [`DiffResult`].
//!
//! [`compute_diff`] is pure and deterministic. It performs no I/O and the
//! same inputs always produce the same counts, items, and aggregate hash.
//!
//! ## Mapping rules
//!
//! | stored field | source                                              |
//! |--------------|-----------------------------------------------------|
//! | `sku`        | `"<vendor>:<catalogId>"`                            |
//! | `name`       | `name` → `model` → `catalogId` (first non-empty)    |
//! | `brand`      | `brand` → `vendor.name` → `vendor.slug`             |
//! | `supplier`   | `vendor.name` → `vendor.slug`                       |
//! | `color`, `sizeLabel`, `usage`, stock `barcode` | primary variant only  |
//! | `catalogUrl` | `source.url`                                        |
//! | stock `qty`  | number of variants                                  |

use std::collections::{HashMap, HashSet};

use vendorsync_core::{
    DiffItem, DiffResult, DiffStatus, FieldChange, NormalizedProduct, ProductField,
    ProductSnapshot, RemovedItem, StockChange, StockLevel, StoredProduct, SyncCounts,
    VendorCatalogItem, VendorSlug,
};

use crate::error::invalid_product;
use crate::hash;
use crate::SyncError;

// ---------------------------------------------------------------------------
// Field derivation
// ---------------------------------------------------------------------------

/// Display fields taken from the first variant of a record.
///
/// Multi-variant products are flattened onto a single `Product` row, so
/// colour, size, usage and barcode always come from `variants[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrimaryVariantFields {
    pub color: Option<String>,
    pub size_label: Option<String>,
    pub usage: Option<String>,
    pub barcode: Option<String>,
}

/// Read colour/size/usage/barcode from the primary (first) variant.
pub fn display_fields_from_primary_variant(product: &NormalizedProduct) -> PrimaryVariantFields {
    let Some(primary) = product.variants.first() else {
        return PrimaryVariantFields::default();
    };
    PrimaryVariantFields {
        color: primary.color.clone(),
        size_label: primary.size_label.clone(),
        usage: primary.usage.clone(),
        barcode: primary.barcode.clone(),
    }
}

/// Catalog id encoded in a stored SKU: strips `"<vendor>:"` when present.
pub fn catalog_id_from_sku<'a>(vendor: &VendorSlug, sku: &'a str) -> &'a str {
    sku.strip_prefix(vendor.as_str())
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(sku)
}

pub fn sku_for(vendor: &VendorSlug, catalog_id: &str) -> String {
    format!("{vendor}:{catalog_id}")
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// The stored shape a normalized record maps to. `id` is left `None`.
pub fn derive_product_after(vendor: &VendorSlug, product: &NormalizedProduct) -> ProductSnapshot {
    let primary = display_fields_from_primary_variant(product);
    let vendor_name = product.vendor.name.as_deref();
    let vendor_slug = Some(product.vendor.slug.as_str());

    ProductSnapshot {
        id: None,
        sku: sku_for(vendor, &product.catalog_id),
        name: first_non_empty([
            product.name.as_deref(),
            product.model.as_deref(),
            Some(product.catalog_id.as_str()),
        ])
        .unwrap_or_default(),
        category: product.category,
        brand: first_non_empty([product.brand.as_deref(), vendor_name, vendor_slug]),
        model: product.model.clone(),
        color: primary.color,
        size_label: primary.size_label,
        usage: primary.usage,
        catalog_url: product.source.url.clone(),
        supplier: first_non_empty([vendor_name, vendor_slug]),
    }
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

/// Every tracked field whose value differs between `before` and `after`.
pub fn field_changes(before: &ProductSnapshot, after: &ProductSnapshot) -> Vec<FieldChange> {
    ProductField::ALL
        .iter()
        .filter_map(|&field| {
            let b = before.field_value(field);
            let a = after.field_value(field);
            (b != a).then_some(FieldChange {
                field,
                before: b,
                after: a,
            })
        })
        .collect()
}

/// Planned levels for the stocks already attached to `existing`.
///
/// Never invents rows: a product without stocks yields no changes.
pub fn stock_changes(product: &NormalizedProduct, existing: &StoredProduct) -> Vec<StockChange> {
    let target = StockLevel {
        qty: product.variants.len() as i64,
        barcode: display_fields_from_primary_variant(product).barcode,
    };

    existing
        .stocks
        .iter()
        .map(|stock| {
            let before = StockLevel {
                qty: stock.qty,
                barcode: stock.barcode.clone(),
            };
            let changed = before != target;
            StockChange {
                store_stock_id: stock.id.clone(),
                store_id: stock.store_id.clone(),
                before,
                after: target.clone(),
                changed,
            }
        })
        .collect()
}

fn check_shape(product: &NormalizedProduct) -> Result<(), SyncError> {
    if product.variants.is_empty() {
        return Err(invalid_product(&product.catalog_id, "product has no variants"));
    }
    let expected = product.category.expected_variant_kind();
    if let Some(bad) = product.variants.iter().find(|v| v.kind != expected) {
        return Err(invalid_product(
            &product.catalog_id,
            format!(
                "variant {} has kind {} but category {} expects {}",
                bad.id, bad.kind, product.category, expected
            ),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// compute_diff
// ---------------------------------------------------------------------------

/// Compare a vendor feed against stored state.
///
/// `existing_products` must carry their stock rows. Items are emitted in feed
/// order; removed products in `existing_products` order.
///
/// # Errors
///
/// [`SyncError::InvalidProduct`] for a record with no variants or with a
/// variant kind that does not match its category.
pub fn compute_diff(
    vendor: &VendorSlug,
    normalized: &[NormalizedProduct],
    existing_catalog_items: &[VendorCatalogItem],
    existing_products: &[StoredProduct],
) -> Result<DiffResult, SyncError> {
    let mut items_by_catalog_id: HashMap<&str, &VendorCatalogItem> = HashMap::new();
    for item in existing_catalog_items {
        items_by_catalog_id
            .entry(item.catalog_id.as_str())
            .or_insert(item);
    }

    let mut products_by_catalog_id: HashMap<&str, &StoredProduct> = HashMap::new();
    for product in existing_products {
        products_by_catalog_id
            .entry(catalog_id_from_sku(vendor, &product.sku))
            .or_insert(product);
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut items = Vec::with_capacity(normalized.len());
    let mut counts = SyncCounts {
        total: normalized.len(),
        ..SyncCounts::default()
    };

    for product in normalized {
        check_shape(product)?;
        let catalog_id = product.catalog_id.as_str();
        visited.insert(catalog_id);

        let existing = products_by_catalog_id.get(catalog_id).copied();
        let catalog_item = items_by_catalog_id.get(catalog_id).copied();

        let mut product_after = derive_product_after(vendor, product);
        let product_before = existing.map(StoredProduct::snapshot);
        if let Some(before) = &product_before {
            product_after.id = before.id.clone();
        }

        let product_changes = product_before
            .as_ref()
            .map(|before| field_changes(before, &product_after))
            .unwrap_or_default();
        let stock_changes = existing
            .map(|stored| stock_changes(product, stored))
            .unwrap_or_default();

        let hash = hash::product_hash(product)?;
        let existing_hash = catalog_item.map(|c| c.hash.clone());

        let status = if existing.is_none() {
            DiffStatus::New
        } else if product_changes.is_empty()
            && !stock_changes.iter().any(|s| s.changed)
            && existing_hash.as_deref() == Some(hash.as_str())
        {
            DiffStatus::Unchanged
        } else {
            DiffStatus::Updated
        };

        match status {
            DiffStatus::New => counts.created += 1,
            DiffStatus::Updated => counts.updated += 1,
            DiffStatus::Unchanged => counts.unchanged += 1,
        }

        tracing::debug!(
            vendor = %vendor,
            catalog_id,
            status = %status,
            field_changes = product_changes.len(),
            "diffed catalog item"
        );

        items.push(DiffItem {
            catalog_id: catalog_id.to_string(),
            status,
            product_before,
            product_after,
            product_changes,
            stock_changes,
            hash,
            existing_hash,
            catalog_item_id: catalog_item.map(|c| c.id.clone()),
        });
    }

    let mut removed = Vec::new();
    let mut reported: HashSet<&str> = HashSet::new();
    for product in existing_products {
        let catalog_id = catalog_id_from_sku(vendor, &product.sku);
        if visited.contains(catalog_id) || !reported.insert(catalog_id) {
            continue;
        }
        removed.push(RemovedItem {
            catalog_id: catalog_id.to_string(),
            catalog_item_id: items_by_catalog_id
                .get(catalog_id)
                .map(|c| c.id.clone()),
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            stocks: product.stocks.clone(),
        });
    }
    counts.removed = removed.len();

    let hash = hash::aggregate_hash(
        items
            .iter()
            .map(|item| (item.catalog_id.as_str(), item.hash.as_str())),
    );

    tracing::info!(
        vendor = %vendor,
        total = counts.total,
        created = counts.created,
        updated = counts.updated,
        unchanged = counts.unchanged,
        removed = counts.removed,
        "computed catalog diff"
    );

    Ok(DiffResult {
        vendor: vendor.clone(),
        hash,
        counts,
        items,
        removed,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
