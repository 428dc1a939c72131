//! `vendorsync apply`: run one audited sync and persist the store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use vendorsync_core::{RunId, VendorSlug};
use vendorsync_engine::{
    run_vendor_sync, ApplyOptions, ApplyOutcome, SyncRequest, SyncSummary, VendorRunGate,
    WritePath, WriteStats,
};

use super::{load_feed, short_hash, Workspace};

/// Arguments for `vendorsync apply`.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Vendor slug the feed belongs to.
    #[arg(long)]
    pub vendor: String,

    /// Path to a JSON array of normalized products.
    #[arg(long)]
    pub feed: PathBuf,

    /// Who triggered the run; defaults to $USER.
    #[arg(long)]
    pub actor: Option<String>,

    /// Record the run and its diff without touching the catalog.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplyReportJson<'a> {
    run_id: &'a RunId,
    summary: &'a SyncSummary,
    writes: Option<&'a WriteStats>,
}

impl ApplyArgs {
    pub fn run(self) -> Result<()> {
        let workspace = Workspace::load()?;
        let feed = load_feed(&self.feed)?;
        // Held until this function returns, covering open, apply and save.
        let _lock = workspace.lock_store()?;
        let mut store = workspace.open_store()?;
        let vendor = VendorSlug::from(self.vendor.as_str());
        let actor = self
            .actor
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "vendorsync".to_string());

        let request = SyncRequest {
            vendor: vendor.clone(),
            actor,
            dry_run: self.dry_run,
            source_path: Some(self.feed.display().to_string()),
            normalized: feed,
        };
        let options = ApplyOptions::from(&workspace.config);
        let gate = VendorRunGate::new();
        let result = run_vendor_sync(&gate, &mut store, request, &options);

        // Saved before the result is checked: failed runs keep their audit rows.
        store
            .save()
            .with_context(|| format!("failed to save store '{}'", store.path().display()))?;
        let outcome = result.with_context(|| format!("apply failed for vendor '{vendor}'"))?;

        if self.json {
            let payload = ApplyReportJson {
                run_id: &outcome.run_id,
                summary: &outcome.summary,
                writes: outcome.writes.as_ref(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize apply JSON")?
            );
            return Ok(());
        }

        print_outcome(&outcome);
        Ok(())
    }
}

fn print_outcome(outcome: &ApplyOutcome) {
    let summary = &outcome.summary;
    let prefix = if summary.dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}{} '{}' synced ({} created, {} updated, {} unchanged, {} removed) in {} ms",
        "✓".green().bold(),
        summary.vendor,
        summary.created,
        summary.updated,
        summary.unchanged,
        summary.removed,
        summary.duration_ms
    );
    println!(
        "  run: {}  hash: {}",
        outcome.run_id,
        short_hash(&summary.hash)
    );

    if let Some(writes) = &outcome.writes {
        println!(
            "  writes via {}: {} products created, {} updated, {} catalog items created, \
             {} updated, {} stocks updated, {} zeroed",
            path_label(writes.path),
            writes.products_created,
            writes.products_updated,
            writes.catalog_items_created,
            writes.catalog_items_updated,
            writes.stocks_updated,
            writes.stocks_zeroed
        );
        if writes.path == WritePath::Fallback {
            println!(
                "  {}",
                "transaction was dropped; writes were replayed without atomicity".yellow()
            );
        }
    }
}

fn path_label(path: WritePath) -> &'static str {
    match path {
        WritePath::Transaction => "transaction",
        WritePath::Fallback => "fallback",
        WritePath::Direct => "direct writes",
    }
}
