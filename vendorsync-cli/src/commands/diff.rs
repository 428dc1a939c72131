//! `vendorsync diff`: preview a feed against the stored catalog.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use vendorsync_core::{DiffItem, DiffResult, DiffStatus, VendorSlug};
use vendorsync_engine::preview_diff;

use super::{load_feed, short_hash, Workspace};

/// Arguments for `vendorsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Vendor slug the feed belongs to.
    #[arg(long)]
    pub vendor: String,

    /// Path to a JSON array of normalized products.
    #[arg(long)]
    pub feed: PathBuf,

    /// Emit the full change-set as JSON.
    #[arg(long)]
    pub json: bool,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let workspace = Workspace::load()?;
        let store = workspace.open_store()?;
        let feed = load_feed(&self.feed)?;
        let vendor = VendorSlug::from(self.vendor.as_str());

        let diff = preview_diff(&store, &vendor, &feed)
            .with_context(|| format!("diff failed for vendor '{vendor}'"))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&diff).context("failed to serialize diff JSON")?
            );
            return Ok(());
        }

        print_diff(&diff);
        Ok(())
    }
}

fn print_diff(diff: &DiffResult) {
    let counts = diff.counts;
    println!(
        "'{}': {} items ({} new, {} updated, {} unchanged, {} removed)",
        diff.vendor, counts.total, counts.created, counts.updated, counts.unchanged, counts.removed
    );
    println!("  hash: {}", short_hash(&diff.hash));

    if diff.is_noop() {
        println!("No changes for '{}'.", diff.vendor);
        return;
    }

    for item in &diff.items {
        match item.status {
            DiffStatus::New => println!("  {}  {}", "+".green().bold(), item.catalog_id),
            DiffStatus::Updated => println!(
                "  {}  {} ({})",
                "~".yellow().bold(),
                item.catalog_id,
                describe_update(item)
            ),
            DiffStatus::Unchanged => {}
        }
    }
    for removed in &diff.removed {
        println!(
            "  {}  {} ({} stock rows zeroed)",
            "-".red().bold(),
            removed.catalog_id,
            removed.stocks.len()
        );
    }
}

fn describe_update(item: &DiffItem) -> String {
    let mut parts: Vec<String> = item
        .product_changes
        .iter()
        .map(|c| c.field.as_str().to_string())
        .collect();
    let stocks = item.changed_stocks().count();
    if stocks > 0 {
        parts.push(format!("{stocks} stock"));
    }
    if parts.is_empty() {
        parts.push("content hash".to_string());
    }
    parts.join(", ")
}
