//! Provides application configuration structures.

use std::path::PathBuf;

use clap::Parser;
use derive_more::Constructor;
use getset::{CopyGetters, Getters};
use stable_eyre::{eyre::ensure, Result};

/// Configures the ingestion engine.
#[derive(Parser, Debug, Getters, CopyGetters)]
pub struct Engine {
    /// Whether to enable debug logging.
    #[clap(long, short)]
    #[getset(get_copy = "pub")]
    debug: bool,

    /// Root directory for the per-data-source processing trees.
    #[clap(long)]
    #[getset(get = "pub")]
    processing_root: PathBuf,

    /// JSON document seeding the data sources, folder paths, and settings.
    #[clap(long)]
    #[getset(get = "pub")]
    sources: PathBuf,

    /// Offer finished bundles to the data lake after bundling.
    #[clap(long)]
    #[getset(get_copy = "pub")]
    upload: bool,

    /// Seconds between ingestion ticks.
    #[clap(long, default_value_t = 60)]
    #[getset(get_copy = "pub")]
    tick_seconds: u64,

    /// Housekeeping retention thresholds.
    #[clap(flatten)]
    #[getset(get_copy = "pub")]
    retention: Retention,
}

impl Engine {
    /// Validates that self is correctly formed.
    pub fn validate(self) -> Result<Self> {
        ensure!(
            self.sources.is_file(),
            "sources seed {:?} must be an existing file",
            self.sources
        );
        ensure!(self.tick_seconds > 0, "tick interval must be positive");
        Ok(self)
    }
}

/// Configures the housekeeping retention thresholds.
#[derive(Parser, Copy, Clone, Debug, Constructor, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Retention {
    /// Backups older than this many years are deleted by the daily sweep.
    #[clap(long, default_value_t = 2)]
    retain_backup_years: i32,

    /// Run logs older than this many months are deleted by the daily sweep.
    #[clap(long, default_value_t = 6)]
    retain_log_months: i32,
}
