//! `vendorsync init`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use vendorsync_core::config;

/// Write the default config if none exists.
#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let (path, created) = config::init_at(&home).context("failed to write default config")?;

        if created {
            println!("✓ Wrote default config");
        } else {
            println!("✓ Config already present");
        }
        let settings = config::load_at(&home).context("failed to read config back")?;
        println!("  Path: {}", path.display());
        println!("  Store: {}", settings.store_path_at(&home).display());
        Ok(())
    }
}
