//! Shared sync entrypoint: load stored state, then diff or apply.
//!
//! Runs for the same vendor are serialized through a [`VendorRunGate`];
//! different vendors proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use vendorsync_core::{DiffResult, NormalizedProduct, VendorSlug};

use crate::apply::{execute_apply, ApplyContext, ApplyOptions, ApplyOutcome};
use crate::diff::compute_diff;
use crate::store::CatalogStore;
use crate::SyncError;

/// Per-vendor mutual exclusion for sync runs.
#[derive(Debug, Default)]
pub struct VendorRunGate {
    locks: Mutex<HashMap<VendorSlug, Arc<Mutex<()>>>>,
}

impl VendorRunGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, vendor: &VendorSlug) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(vendor.clone()).or_default())
    }

    /// Run `f` while holding `vendor`'s lock. A panic in an earlier holder
    /// does not wedge the vendor.
    pub fn run<T>(&self, vendor: &VendorSlug, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(vendor);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// One sync request as issued by the CLI.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub vendor: VendorSlug,
    pub actor: String,
    pub dry_run: bool,
    pub source_path: Option<String>,
    pub normalized: Vec<NormalizedProduct>,
}

/// Load `request.vendor`'s stored state and run [`execute_apply`] under the
/// vendor's gate.
pub fn run_vendor_sync<S: CatalogStore>(
    gate: &VendorRunGate,
    store: &mut S,
    request: SyncRequest,
    options: &ApplyOptions,
) -> Result<ApplyOutcome, SyncError> {
    let vendor = request.vendor.clone();
    gate.run(&vendor, || {
        let existing = store.load_existing(&request.vendor)?;
        tracing::debug!(
            vendor = %request.vendor,
            catalog_items = existing.catalog_items.len(),
            products = existing.products.len(),
            "loaded stored catalog"
        );
        let ctx = ApplyContext {
            vendor: request.vendor,
            actor: request.actor,
            dry_run: request.dry_run,
            source_path: request.source_path,
            normalized: request.normalized,
            existing,
        };
        execute_apply(store, &ctx, options)
    })
}

/// Diff `normalized` against `store` without recording a run.
pub fn preview_diff<S: CatalogStore + ?Sized>(
    store: &S,
    vendor: &VendorSlug,
    normalized: &[NormalizedProduct],
) -> Result<DiffResult, SyncError> {
    let existing = store.load_existing(vendor)?;
    compute_diff(
        vendor,
        normalized,
        &existing.catalog_items,
        &existing.products,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use vendorsync_core::{Category, Price, RunStatus, SourceRef, Variant, VariantKind, VendorRef};

    use super::*;
    use crate::store::MemoryStore;

    fn lens(catalog_id: &str) -> NormalizedProduct {
        NormalizedProduct {
            vendor: VendorRef {
                slug: VendorSlug::from("acme"),
                name: Some("Acme Optics".into()),
            },
            catalog_id: catalog_id.to_string(),
            name: Some(format!("Lens {catalog_id}")),
            model: None,
            brand: Some("Acme".into()),
            category: Category::Lenses,
            variants: vec![Variant {
                kind: VariantKind::Lens,
                id: format!("{catalog_id}-v1"),
                color: None,
                size_label: None,
                usage: Some("distance".into()),
                barcode: Some("111".into()),
                attributes: serde_json::Value::Null,
                extra: serde_json::Map::new(),
            }],
            photos: vec![],
            source: SourceRef::default(),
            price: Some(Price {
                amount: 10.0,
                currency: Some("USD".into()),
            }),
            extras: None,
            raw: None,
            extra: serde_json::Map::new(),
        }
    }

    fn request(dry_run: bool) -> SyncRequest {
        SyncRequest {
            vendor: VendorSlug::from("acme"),
            actor: "ops@example.com".into(),
            dry_run,
            source_path: Some("feeds/acme.json".into()),
            normalized: vec![lens("L1"), lens("L2")],
        }
    }

    #[test]
    fn run_vendor_sync_loads_state_and_applies() {
        let gate = VendorRunGate::new();
        let mut store = MemoryStore::new();

        let first = run_vendor_sync(&gate, &mut store, request(false), &ApplyOptions::default())
            .expect("first run");
        assert_eq!(first.summary.created, 2);

        let second = run_vendor_sync(&gate, &mut store, request(false), &ApplyOptions::default())
            .expect("second run");
        assert_eq!(second.summary.unchanged, 2);
        assert_eq!(second.summary.hash, first.summary.hash);
        assert!(store
            .runs()
            .iter()
            .all(|r| r.status == RunStatus::Success));
    }

    #[test]
    fn preview_diff_records_nothing() {
        let store = MemoryStore::new();
        let diff = preview_diff(&store, &VendorSlug::from("acme"), &[lens("L1")]).expect("diff");
        assert_eq!(diff.counts.created, 1);
        assert!(store.runs().is_empty());
    }

    #[test]
    fn gate_serializes_runs_for_one_vendor() {
        let gate = Arc::new(VendorRunGate::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    gate.run(&VendorSlug::from("acme"), || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gate_does_not_block_other_vendors() {
        let gate = VendorRunGate::new();
        let inner = gate.run(&VendorSlug::from("acme"), || {
            gate.run(&VendorSlug::from("zeiss"), || "nested")
        });
        assert_eq!(inner, "nested");
    }

    #[test]
    fn gate_recovers_after_panic() {
        let gate = Arc::new(VendorRunGate::new());
        let panicking = Arc::clone(&gate);
        let result = thread::spawn(move || {
            panicking.run(&VendorSlug::from("acme"), || panic!("boom"));
        })
        .join();
        assert!(result.is_err());
        assert_eq!(gate.run(&VendorSlug::from("acme"), || 7), 7);
    }
}
