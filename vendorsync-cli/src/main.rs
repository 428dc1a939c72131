//! vendorsync: vendor catalog diff and apply CLI.
//!
//! # Usage
//!
//! ```text
//! vendorsync init
//! vendorsync diff --vendor <slug> --feed <file.json> [--json]
//! vendorsync apply --vendor <slug> --feed <file.json> [--actor <name>] [--dry-run] [--json]
//! vendorsync status [--vendor <slug>] [--json]
//! ```
//!
//! Set `VENDORSYNC_LOG` (e.g. `vendorsync=debug`) to see engine events on stderr.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{apply::ApplyArgs, diff::DiffArgs, init::InitArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "vendorsync",
    version,
    about = "Diff and apply normalized vendor catalog feeds",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config to ~/.vendorsync/config.yaml.
    Init(InitArgs),

    /// Show what applying a feed would change, without recording a run.
    Diff(DiffArgs),

    /// Apply a feed to the catalog store and record the run.
    Apply(ApplyArgs),

    /// Show per-vendor sync state and recent runs.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_env("VENDORSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Apply(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
