//! Apply engine: one audited sync run.
//!
//! ## Run lifecycle
//!
//! 1. Compute the diff (pure; errors propagate before any row is written).
//! 2. Create a `Pending` run with counts, aggregate hash and `started_at`.
//! 3. Real runs only: apply the writes, holding any error back.
//! 4. Upsert the capped diff summary keyed by run id.
//! 5. Finalize the run as `Failed` (and return the error) or `Success`.
//! 6. Real successful runs only: upsert the vendor's rolling state.
//!
//! A crash between steps 2 and 5 leaves the run `Pending`.
//!
//! ## Write sequence
//!
//! Items in diff order: create or update the product, create or update the
//! catalog item, then update changed stocks. Removed items follow, zeroing
//! every stock row while keeping its barcode. The sequence runs inside an
//! interactive transaction when the store offers one; a
//! [`StoreError::TransactionDropped`] is retried per [`TransactionPolicy`] and
//! then replayed without a transaction (not atomic).

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use vendorsync_core::{
    CatalogItemDraft, DiffResult, NewSyncRun, NormalizedProduct, RunFinalization, RunId,
    RunStatus, StockLevel, StoreError, SyncConfig, TransactionPolicy, VendorSlug,
    VendorSyncRunDiff, VendorSyncState,
};

use crate::diff::compute_diff;
use crate::store::{CatalogStore, CatalogWriter, ExistingCatalog};
use crate::SyncError;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything one run needs: who, what, and the state to compare against.
#[derive(Debug, Clone)]
pub struct ApplyContext {
    pub vendor: VendorSlug,
    pub actor: String,
    pub dry_run: bool,
    pub source_path: Option<String>,
    pub normalized: Vec<NormalizedProduct>,
    pub existing: ExistingCatalog,
}

/// Tunables of the apply engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub transaction: TransactionPolicy,
    /// Maximum number of diff items kept in the stored run summary.
    pub diff_summary_limit: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for ApplyOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            transaction: config.transaction.clone(),
            diff_summary_limit: config.diff_summary_limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// How the write sequence reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePath {
    /// Committed inside an interactive transaction.
    Transaction,
    /// Replayed without a transaction after the transaction was dropped.
    Fallback,
    /// The store has no transactions; written directly.
    Direct,
}

/// Writes issued by the attempt that landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStats {
    pub path: WritePath,
    pub products_created: usize,
    pub products_updated: usize,
    pub catalog_items_created: usize,
    pub catalog_items_updated: usize,
    pub stocks_updated: usize,
    pub stocks_zeroed: usize,
}

impl WriteStats {
    pub fn new(path: WritePath) -> Self {
        Self {
            path,
            products_created: 0,
            products_updated: 0,
            catalog_items_created: 0,
            catalog_items_updated: 0,
            stocks_updated: 0,
            stocks_zeroed: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.products_created
            + self.products_updated
            + self.catalog_items_created
            + self.catalog_items_updated
            + self.stocks_updated
            + self.stocks_zeroed
    }
}

/// Reporting view of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub vendor: VendorSlug,
    pub hash: String,
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub dry_run: bool,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
    pub source_path: Option<String>,
}

/// Result of [`execute_apply`].
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub run_id: RunId,
    pub diff: DiffResult,
    pub summary: SyncSummary,
    /// `None` for dry runs.
    pub writes: Option<WriteStats>,
}

// ---------------------------------------------------------------------------
// execute_apply
// ---------------------------------------------------------------------------

/// Run one sync for `ctx.vendor` and record its audit trail.
///
/// # Errors
///
/// - [`SyncError::InvalidProduct`] / [`SyncError::Json`] from the diff; no run
///   is recorded.
/// - [`SyncError::Apply`] when the write phase of a real run fails; the run is
///   already finalized as `Failed` and its diff summary stored.
/// - [`SyncError::Store`] when an audit write itself fails.
pub fn execute_apply<S: CatalogStore>(
    store: &mut S,
    ctx: &ApplyContext,
    options: &ApplyOptions,
) -> Result<ApplyOutcome, SyncError> {
    let started_at = Utc::now();
    let clock = Instant::now();

    let diff = compute_diff(
        &ctx.vendor,
        &ctx.normalized,
        &ctx.existing.catalog_items,
        &ctx.existing.products,
    )?;

    let run_id = store.create_run(&NewSyncRun {
        vendor: ctx.vendor.clone(),
        actor: ctx.actor.clone(),
        dry_run: ctx.dry_run,
        source_path: ctx.source_path.clone(),
        hash: diff.hash.clone(),
        counts: diff.counts,
        started_at,
    })?;
    tracing::info!(
        vendor = %ctx.vendor,
        run_id = %run_id,
        dry_run = ctx.dry_run,
        total = diff.counts.total,
        "sync run started"
    );

    let write_result = if ctx.dry_run {
        None
    } else {
        Some(apply_writes(store, &diff, &options.transaction))
    };

    let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    let finished_at = Utc::now();

    // Logged before any audit write so the cause survives an audit failure.
    if let Some(Err(source)) = &write_result {
        tracing::error!(
            vendor = %ctx.vendor,
            run_id = %run_id,
            error = %source,
            "sync run failed"
        );
    }

    store.upsert_run_diff(&summarize_diff(
        &run_id,
        &diff,
        options.diff_summary_limit,
    ))?;

    let writes = match write_result {
        Some(Err(source)) => {
            store.update_run(
                &run_id,
                &RunFinalization {
                    status: RunStatus::Failed,
                    finished_at,
                    duration_ms,
                    error: Some(source.to_string()),
                },
            )?;
            return Err(SyncError::Apply { run_id, source });
        }
        Some(Ok(stats)) => Some(stats),
        None => None,
    };

    store.update_run(
        &run_id,
        &RunFinalization {
            status: RunStatus::Success,
            finished_at,
            duration_ms,
            error: None,
        },
    )?;

    if !ctx.dry_run {
        store.upsert_vendor_state(&VendorSyncState {
            vendor: ctx.vendor.clone(),
            last_hash: diff.hash.clone(),
            last_run_at: finished_at,
            last_run_by: ctx.actor.clone(),
            last_duration_ms: duration_ms,
            last_error: None,
            total_items: diff.counts.total,
        })?;
    }

    tracing::info!(
        vendor = %ctx.vendor,
        run_id = %run_id,
        created = diff.counts.created,
        updated = diff.counts.updated,
        unchanged = diff.counts.unchanged,
        removed = diff.counts.removed,
        duration_ms,
        "sync run finished"
    );

    let summary = SyncSummary {
        vendor: ctx.vendor.clone(),
        hash: diff.hash.clone(),
        total: diff.counts.total,
        created: diff.counts.created,
        updated: diff.counts.updated,
        unchanged: diff.counts.unchanged,
        removed: diff.counts.removed,
        dry_run: ctx.dry_run,
        duration_ms,
        finished_at,
        source_path: ctx.source_path.clone(),
    };

    Ok(ApplyOutcome {
        run_id,
        diff,
        summary,
        writes,
    })
}

/// Capped copy of `diff` for the audit trail: at most `limit` items, each
/// keeping only the stock changes that will be written. Removed items are
/// kept in full.
pub fn summarize_diff(run_id: &RunId, diff: &DiffResult, limit: usize) -> VendorSyncRunDiff {
    let items = diff
        .items
        .iter()
        .take(limit)
        .map(|item| {
            let mut item = item.clone();
            item.stock_changes.retain(|s| s.changed);
            item
        })
        .collect();

    VendorSyncRunDiff {
        run_id: run_id.clone(),
        vendor: diff.vendor.clone(),
        hash: diff.hash.clone(),
        counts: diff.counts,
        items,
        removed: diff.removed.clone(),
        truncated: diff.items.len() > limit,
    }
}

// ---------------------------------------------------------------------------
// apply_writes
// ---------------------------------------------------------------------------

/// Apply `diff` to `store`, transactionally when possible.
///
/// Only [`StoreError::TransactionDropped`] triggers a retry or the
/// non-transactional fallback; every other error is returned unchanged.
pub fn apply_writes<S: CatalogStore>(
    store: &mut S,
    diff: &DiffResult,
    policy: &TransactionPolicy,
) -> Result<WriteStats, StoreError> {
    if !store.supports_transactions() {
        tracing::debug!(vendor = %diff.vendor, "store has no transactions; writing directly");
        return write_change_set(store, diff, WritePath::Direct);
    }

    let attempts = policy.attempts();
    let mut attempt = 0;
    let dropped = loop {
        attempt += 1;
        let mut stats = WriteStats::new(WritePath::Transaction);
        let result = store.transaction(&mut |tx| {
            stats = write_change_set(tx, diff, WritePath::Transaction)?;
            Ok(())
        });
        match result {
            Ok(()) => return Ok(stats),
            Err(err) if err.is_transaction_dropped() && attempt < attempts => {
                tracing::warn!(
                    vendor = %diff.vendor,
                    attempt,
                    attempts,
                    error = %err,
                    "transaction dropped; retrying"
                );
                std::thread::sleep(policy.backoff_after(attempt));
            }
            Err(err) if err.is_transaction_dropped() => break err,
            Err(err) => return Err(err),
        }
    };

    if !policy.fallback_on_drop {
        return Err(dropped);
    }
    tracing::warn!(
        vendor = %diff.vendor,
        error = %dropped,
        "transaction dropped; replaying writes without a transaction"
    );
    write_change_set(store, diff, WritePath::Fallback)
}

/// The write sequence itself, identical for every path.
fn write_change_set<W: CatalogWriter + ?Sized>(
    writer: &mut W,
    diff: &DiffResult,
    path: WritePath,
) -> Result<WriteStats, StoreError> {
    let mut stats = WriteStats::new(path);

    for item in &diff.items {
        let product_id = match &item.product_before {
            None => {
                stats.products_created += 1;
                writer.create_product(&item.product_after)?
            }
            Some(before) => {
                let id = before
                    .id
                    .clone()
                    .ok_or_else(|| StoreError::not_found("Product", &before.sku))?;
                if !item.product_changes.is_empty() {
                    writer.update_product(&id, &item.product_after)?;
                    stats.products_updated += 1;
                }
                id
            }
        };

        let draft = CatalogItemDraft {
            vendor: diff.vendor.clone(),
            catalog_id: item.catalog_id.clone(),
            product_id,
            hash: item.hash.clone(),
        };
        match &item.catalog_item_id {
            None => {
                writer.create_catalog_item(&draft)?;
                stats.catalog_items_created += 1;
            }
            // A freshly created product must be linked even if the hash matches.
            Some(id)
                if item.existing_hash.as_deref() != Some(item.hash.as_str())
                    || item.product_before.is_none() =>
            {
                writer.update_catalog_item(id, &draft)?;
                stats.catalog_items_updated += 1;
            }
            Some(_) => {}
        }

        for change in item.changed_stocks() {
            writer.update_store_stock(&change.store_stock_id, &change.after)?;
            stats.stocks_updated += 1;
        }
    }

    for removed in &diff.removed {
        for stock in &removed.stocks {
            let zeroed = StockLevel {
                qty: 0,
                barcode: stock.barcode.clone(),
            };
            writer.update_store_stock(&stock.id, &zeroed)?;
            stats.stocks_zeroed += 1;
        }
    }

    Ok(stats)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use vendorsync_core::{
        Category, DiffItem, DiffStatus, ProductSnapshot, StockChange, StoreId, StoreStockId,
        SyncCounts,
    };

    use super::*;

    fn item(catalog_id: &str, stock_flags: &[bool]) -> DiffItem {
        let level = |qty| StockLevel { qty, barcode: None };
        DiffItem {
            catalog_id: catalog_id.to_string(),
            status: DiffStatus::Updated,
            product_before: None,
            product_after: ProductSnapshot {
                id: None,
                sku: format!("acme:{catalog_id}"),
                name: catalog_id.to_string(),
                category: Category::Lenses,
                brand: None,
                model: None,
                color: None,
                size_label: None,
                usage: None,
                catalog_url: None,
                supplier: None,
            },
            product_changes: vec![],
            stock_changes: stock_flags
                .iter()
                .enumerate()
                .map(|(i, &changed)| StockChange {
                    store_stock_id: StoreStockId::from(format!("{catalog_id}-{i}")),
                    store_id: StoreId::from("north"),
                    before: level(0),
                    after: level(1),
                    changed,
                })
                .collect(),
            hash: format!("hash-{catalog_id}"),
            existing_hash: None,
            catalog_item_id: None,
        }
    }

    fn diff_with(items: Vec<DiffItem>) -> DiffResult {
        DiffResult {
            vendor: VendorSlug::from("acme"),
            hash: "agg".into(),
            counts: SyncCounts {
                total: items.len(),
                updated: items.len(),
                ..SyncCounts::default()
            },
            items,
            removed: vec![],
        }
    }

    #[test]
    fn summary_caps_items_and_flags_truncation() {
        let items = (0..60).map(|i| item(&format!("C{i}"), &[])).collect();
        let diff = diff_with(items);
        let summary = summarize_diff(&RunId::from("run-1"), &diff, 50);
        assert_eq!(summary.items.len(), 50);
        assert!(summary.truncated);
        assert_eq!(summary.items[0].catalog_id, "C0");
        assert_eq!(summary.counts.total, 60);
    }

    #[test]
    fn summary_keeps_only_changed_stocks() {
        let diff = diff_with(vec![item("A", &[true, false, true])]);
        let summary = summarize_diff(&RunId::from("run-1"), &diff, 50);
        assert!(!summary.truncated);
        let kept: Vec<_> = summary.items[0]
            .stock_changes
            .iter()
            .map(|s| s.store_stock_id.as_str())
            .collect();
        assert_eq!(kept, ["A-0", "A-2"]);
    }

    #[test]
    fn write_stats_total_sums_every_counter() {
        let mut stats = WriteStats::new(WritePath::Direct);
        stats.products_created = 1;
        stats.catalog_items_created = 1;
        stats.stocks_zeroed = 3;
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn options_follow_config() {
        let mut config = SyncConfig::default();
        config.diff_summary_limit = 5;
        config.transaction.max_attempts = 2;
        let options = ApplyOptions::from(&config);
        assert_eq!(options.diff_summary_limit, 5);
        assert_eq!(options.transaction.max_attempts, 2);
    }
}
