use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use vendorsync_core::{
    CatalogItemDraft, CatalogItemId, Category, NewSyncRun, NormalizedProduct, ProductId,
    ProductSnapshot, RunFinalization, RunId, RunStatus, SourceRef, StockLevel, StoreError,
    StoreId, StoreStockId, TransactionPolicy, Variant, VariantKind, VendorRef, VendorSlug,
    VendorSyncRunDiff, VendorSyncState,
};
use vendorsync_engine::{
    execute_apply, ApplyContext, ApplyOptions, CatalogStore, CatalogWriter, ExistingCatalog,
    MemoryStore, SyncError, TransactionWork, WritePath,
};

/// Wraps a [`MemoryStore`] and drops the first `drops` transactions after
/// letting the work run halfway against a throwaway copy.
struct FlakyStore {
    inner: MemoryStore,
    drops: u32,
    transaction_calls: u32,
    fail_run_diff: bool,
}

impl FlakyStore {
    fn new(inner: MemoryStore, drops: u32) -> Self {
        Self {
            inner,
            drops,
            transaction_calls: 0,
            fail_run_diff: false,
        }
    }
}

impl CatalogWriter for FlakyStore {
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

impl CatalogStore for FlakyStore {
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
        if self.fail_run_diff {
            return Err(StoreError::Write("connection reset".to_string()));
        }
        self.inner.upsert_run_diff(diff)
    }

    fn upsert_vendor_state(&mut self, state: &VendorSyncState) -> Result<(), StoreError> {
        self.inner.upsert_vendor_state(state)
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn transaction(&mut self, work: TransactionWork<'_>) -> Result<(), StoreError> {
        self.transaction_calls += 1;
        if self.drops > 0 {
            self.drops -= 1;
            let mut doomed = self.inner.clone();
            let _ = work(&mut doomed);
            return Err(StoreError::classify_message(
                "Transaction API error: Transaction not found. Transaction ID is invalid",
            ));
        }
        self.inner.transaction(work)
    }
}

fn acme() -> VendorSlug {
    VendorSlug::from("acme")
}

fn contact(catalog_id: &str, variants: usize) -> NormalizedProduct {
    NormalizedProduct {
        vendor: VendorRef {
            slug: acme(),
            name: None,
        },
        catalog_id: catalog_id.to_string(),
        name: None,
        model: Some(format!("Daily {catalog_id}")),
        brand: Some("Acuvue".to_string()),
        category: Category::Contacts,
        variants: (0..variants)
            .map(|i| Variant {
                kind: VariantKind::Contact,
                id: format!("{catalog_id}-{i}"),
                color: None,
                size_label: Some(format!("-{i}.00")),
                usage: Some("daily".to_string()),
                barcode: Some(format!("77{i}")),
                attributes: serde_json::json!({ "power": -(i as f64) }),
                extra: serde_json::Map::new(),
            })
            .collect(),
        photos: vec![],
        source: SourceRef::default(),
        price: None,
        extras: None,
        raw: None,
        extra: serde_json::Map::new(),
    }
}

/// Store holding `C1` and `C2`, each with one stock row.
fn seeded() -> MemoryStore {
    let mut store = MemoryStore::new();
    let ctx = context(&store, vec![contact("C1", 1), contact("C2", 1)]);
    execute_apply(&mut store, &ctx, &ApplyOptions::default()).expect("seed");
    for sku in ["acme:C1", "acme:C2"] {
        let id = store.product_by_sku(sku).expect("seeded product").id;
        store.insert_stock(
            &id,
            &StoreId::from("north"),
            StockLevel {
                qty: 1,
                barcode: Some("770".to_string()),
            },
        );
    }
    store
}

/// `C1` gains variants and a new brand, `C2` disappears, `C3` is new.
fn next_feed() -> Vec<NormalizedProduct> {
    let mut c1 = contact("C1", 3);
    c1.brand = Some("Acuvue Oasys".to_string());
    vec![c1, contact("C3", 2)]
}

fn context<S: CatalogStore>(store: &S, feed: Vec<NormalizedProduct>) -> ApplyContext {
    ApplyContext {
        vendor: acme(),
        actor: "sync-bot".to_string(),
        dry_run: false,
        source_path: None,
        normalized: feed,
        existing: store.load_existing(&acme()).expect("load existing"),
    }
}

fn options(policy: TransactionPolicy) -> ApplyOptions {
    ApplyOptions {
        transaction: policy,
        ..ApplyOptions::default()
    }
}

/// Catalog rows that matter for equivalence; audit rows and timestamps aside.
fn catalog_rows(store: &MemoryStore) -> (String, String, Vec<(String, String, String)>) {
    let state = store.state();
    let products = serde_json::to_string(&state.products).expect("products json");
    let stocks = serde_json::to_string(&state.stocks).expect("stocks json");
    let items = state
        .catalog_items
        .iter()
        .map(|c| {
            (
                c.catalog_id.clone(),
                c.product_id.to_string(),
                c.hash.clone(),
            )
        })
        .collect();
    (products, stocks, items)
}

#[test]
fn dropped_transaction_falls_back_to_the_same_final_state() {
    let mut plain = seeded();
    let ctx = context(&plain, next_feed());
    execute_apply(&mut plain, &ctx, &ApplyOptions::default()).expect("plain apply");

    let mut flaky = FlakyStore::new(seeded(), 1);
    let ctx = context(&flaky, next_feed());
    let outcome = execute_apply(&mut flaky, &ctx, &ApplyOptions::default()).expect("fallback");

    let writes = outcome.writes.expect("writes");
    assert_eq!(writes.path, WritePath::Fallback);
    assert_eq!(writes.products_created, 1);
    assert_eq!(writes.products_updated, 1);
    assert_eq!(writes.stocks_zeroed, 1);
    assert_eq!(flaky.transaction_calls, 1);
    assert_eq!(catalog_rows(&flaky.inner), catalog_rows(&plain));

    let run = flaky.inner.run(&outcome.run_id).expect("run");
    assert_eq!(run.status, RunStatus::Success);
    assert!(flaky.inner.vendor_state(&acme()).is_some());
}

#[test]
fn retry_within_attempts_stays_transactional() {
    let mut flaky = FlakyStore::new(seeded(), 1);
    let ctx = context(&flaky, next_feed());
    let policy = TransactionPolicy {
        max_attempts: 2,
        backoff_ms: 1,
        fallback_on_drop: true,
    };

    let outcome = execute_apply(&mut flaky, &ctx, &options(policy)).expect("retry");

    assert_eq!(outcome.writes.expect("writes").path, WritePath::Transaction);
    assert_eq!(flaky.transaction_calls, 2);
    assert!(flaky.inner.product_by_sku("acme:C3").is_some());
}

#[test]
fn stats_reflect_only_the_attempt_that_landed() {
    let mut flaky = FlakyStore::new(seeded(), 2);
    let ctx = context(&flaky, next_feed());
    let policy = TransactionPolicy {
        max_attempts: 3,
        backoff_ms: 0,
        fallback_on_drop: true,
    };

    let writes = execute_apply(&mut flaky, &ctx, &options(policy))
        .expect("apply")
        .writes
        .expect("writes");

    assert_eq!(writes.path, WritePath::Transaction);
    assert_eq!(writes.products_created, 1);
    assert_eq!(writes.catalog_items_created, 1);
}

#[test]
fn exhausted_attempts_without_fallback_fail_the_run() {
    let mut flaky = FlakyStore::new(seeded(), 5);
    let state_before = flaky.inner.vendor_state(&acme()).cloned();
    let ctx = context(&flaky, next_feed());
    let policy = TransactionPolicy {
        max_attempts: 2,
        backoff_ms: 0,
        fallback_on_drop: false,
    };

    let err = execute_apply(&mut flaky, &ctx, &options(policy)).unwrap_err();

    let run_id = match err {
        SyncError::Apply { run_id, source } => {
            assert!(source.is_transaction_dropped());
            run_id
        }
        other => panic!("expected apply error, got {other:?}"),
    };
    assert_eq!(flaky.transaction_calls, 2);
    let run = flaky.inner.run(&run_id).expect("run");
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("Transaction not found"));
    assert!(flaky.inner.product_by_sku("acme:C3").is_none());
    assert_eq!(flaky.inner.vendor_state(&acme()).cloned(), state_before);
}

/// Seeded store where an unrelated product already owns the `C3` SKU, so
/// creating `C3` fails with a write error.
fn squatted() -> (MemoryStore, ApplyContext) {
    let mut store = seeded();
    store.insert_product(&ProductSnapshot {
        id: None,
        sku: "acme:C3".to_string(),
        name: "squatter".to_string(),
        category: Category::Contacts,
        brand: None,
        model: None,
        color: None,
        size_label: None,
        usage: None,
        catalog_url: None,
        supplier: None,
    });
    let mut ctx = context(&store, next_feed());
    ctx.existing.products.retain(|p| p.sku != "acme:C3");
    (store, ctx)
}

/// `io::Write` sink shared with a test subscriber.
#[derive(Clone, Default)]
struct LogSink(Arc<Mutex<Vec<u8>>>);

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log sink").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogSink {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log sink")).into_owned()
    }
}

#[test]
fn other_store_errors_are_not_retried() {
    let (store, ctx) = squatted();
    let mut flaky = FlakyStore::new(store, 0);
    let policy = TransactionPolicy {
        max_attempts: 3,
        backoff_ms: 0,
        fallback_on_drop: true,
    };

    let err = execute_apply(&mut flaky, &ctx, &options(policy)).unwrap_err();

    assert!(matches!(
        err,
        SyncError::Apply {
            source: StoreError::Write(_),
            ..
        }
    ));
    assert_eq!(flaky.transaction_calls, 1);
}

#[test]
fn write_failure_is_logged_even_when_audit_write_fails() {
    let (store, ctx) = squatted();
    let mut flaky = FlakyStore::new(store, 0);
    flaky.fail_run_diff = true;

    let sink = LogSink::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let err = tracing::subscriber::with_default(subscriber, || {
        execute_apply(&mut flaky, &ctx, &ApplyOptions::default()).unwrap_err()
    });

    match err {
        SyncError::Store(StoreError::Write(message)) => assert_eq!(message, "connection reset"),
        other => panic!("expected audit write error, got {other:?}"),
    }
    let logs = sink.contents();
    assert!(logs.contains("sync run failed"), "logs: {logs}");
    assert!(logs.contains("unique constraint failed on sku acme:C3"), "logs: {logs}");
    assert_eq!(flaky.inner.pending_runs().len(), 1);
    assert!(flaky.inner.catalog_item(&acme(), "C3").is_none());
}

#[test]
fn audit_write_failure_leaves_run_pending() {
    let mut flaky = FlakyStore::new(seeded(), 0);
    flaky.fail_run_diff = true;
    let ctx = context(&flaky, next_feed());

    let err = execute_apply(&mut flaky, &ctx, &ApplyOptions::default()).unwrap_err();

    assert!(matches!(err, SyncError::Store(StoreError::Write(_))));
    let pending = flaky.inner.pending_runs();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].finished_at.is_none());
}
