//! `vendorsync status`: per-vendor sync state and recent runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use vendorsync_core::{RunStatus, VendorSyncRun, VendorSyncState};

use super::{short_hash, Workspace};

/// Runs listed below the vendor table.
const RECENT_RUNS: usize = 10;

/// Arguments for `vendorsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter to a single vendor.
    #[arg(long)]
    pub vendor: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReportJson<'a> {
    vendors: Vec<&'a VendorSyncState>,
    recent_runs: Vec<&'a VendorSyncRun>,
    pending_runs: usize,
}

#[derive(Tabled)]
struct VendorRow {
    #[tabled(rename = "vendor")]
    vendor: String,
    #[tabled(rename = "items")]
    items: usize,
    #[tabled(rename = "hash")]
    hash: String,
    #[tabled(rename = "last run")]
    last_run: String,
    #[tabled(rename = "by")]
    by: String,
    #[tabled(rename = "duration")]
    duration: String,
}

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "run")]
    run: String,
    #[tabled(rename = "vendor")]
    vendor: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "new/upd/same/rm")]
    counts: String,
    #[tabled(rename = "started")]
    started: String,
    #[tabled(rename = "error")]
    error: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let workspace = Workspace::load()?;
        let store = workspace.open_store()?;
        let memory = store.memory();

        let matches_vendor =
            |vendor: &str| self.vendor.as_deref().map_or(true, |wanted| wanted == vendor);

        let vendors: Vec<&VendorSyncState> = memory
            .vendor_states()
            .iter()
            .filter(|s| matches_vendor(s.vendor.as_str()))
            .collect();
        let recent_runs: Vec<&VendorSyncRun> = memory
            .runs()
            .iter()
            .rev()
            .filter(|r| matches_vendor(r.vendor.as_str()))
            .take(RECENT_RUNS)
            .collect();
        let pending_runs = memory
            .pending_runs()
            .into_iter()
            .filter(|r| matches_vendor(r.vendor.as_str()))
            .count();

        if self.json {
            let payload = StatusReportJson {
                vendors,
                recent_runs,
                pending_runs,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_tables(&vendors, &recent_runs, pending_runs);
        Ok(())
    }
}

fn print_tables(vendors: &[&VendorSyncState], runs: &[&VendorSyncRun], pending_runs: usize) {
    println!(
        "vendorsync v{} | {} vendors | {} runs shown",
        env!("CARGO_PKG_VERSION"),
        vendors.len(),
        runs.len()
    );

    if vendors.is_empty() && runs.is_empty() {
        println!("No vendor syncs recorded.");
        return;
    }

    if !vendors.is_empty() {
        let rows: Vec<VendorRow> = vendors
            .iter()
            .map(|s| VendorRow {
                vendor: s.vendor.to_string(),
                items: s.total_items,
                hash: short_hash(&s.last_hash),
                last_run: format_age(s.last_run_at),
                by: s.last_run_by.clone(),
                duration: format!("{} ms", s.last_duration_ms),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if !runs.is_empty() {
        let rows: Vec<RunRow> = runs
            .iter()
            .map(|r| RunRow {
                run: r.id.to_string(),
                vendor: r.vendor.to_string(),
                status: status_label(r),
                counts: format!(
                    "{}/{}/{}/{}",
                    r.counts.created, r.counts.updated, r.counts.unchanged, r.counts.removed
                ),
                started: format_age(r.started_at),
                error: r.error.clone().unwrap_or_default(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if pending_runs > 0 {
        println!(
            "{}",
            format!("{pending_runs} run(s) never finalized; they were interrupted mid-apply.")
                .yellow()
        );
    }
}

fn status_label(run: &VendorSyncRun) -> String {
    let label = match run.status {
        RunStatus::Pending => "PENDING".yellow(),
        RunStatus::Success => "SUCCESS".green(),
        RunStatus::Failed => "FAILED".red(),
    };
    if run.dry_run {
        format!("{label} (dry-run)")
    } else {
        label.to_string()
    }
}

fn format_age(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0);
    let age = if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 60 * 60 {
        format!("{}m", seconds / 60)
    } else if seconds < 60 * 60 * 24 {
        format!("{}h", seconds / (60 * 60))
    } else {
        format!("{}d", seconds / (60 * 60 * 24))
    };
    format!("{age} ago")
}
