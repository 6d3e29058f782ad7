//! Daily retention sweeps over the backup and log trees.

use std::{fs, path::Path};

use log::{debug, warn};
use stable_eyre::{eyre::Context, Result};
use time::{Date, OffsetDateTime};
use tokio::task;
use walkdir::WalkDir;

use crate::{config::Retention, layout::SourceLayout, stamp, store::Store};

/// Delete expired backups and run logs for every active data source.
///
/// Backups expire by the `yyyyMMddTHHmmss` stamp embedded in their file name,
/// run logs by their embedded `yyyy-MM-dd` date. Files without a parseable
/// stamp are left alone, and quarantined files under `error/files/` are never
/// touched.
pub async fn sweep<S: Store>(
    store: &S,
    processing_root: &Path,
    retention: Retention,
) -> Result<()> {
    let sources = store
        .active_data_sources()
        .await
        .context("load data sources")?;
    let today = OffsetDateTime::now_utc().date();

    for source in sources {
        let layout = SourceLayout::new(processing_root, &source.name);
        task::spawn_blocking(move || sweep_source(&layout, retention, today))
            .await
            .context("join housekeeping worker")?;
    }
    Ok(())
}

fn sweep_source(layout: &SourceLayout, retention: Retention, today: Date) {
    let backup_cutoff = stamp::subtract_years(today, retention.retain_backup_years());
    prune(layout.backup(), backup_cutoff, |name| {
        stamp::parse_archive_stamp(name).map(|parsed| parsed.date())
    });

    let log_cutoff = stamp::subtract_months(today, retention.retain_log_months());
    prune(layout.log(), log_cutoff, stamp::parse_log_date);
    prune(layout.error_log(), log_cutoff, stamp::parse_log_date);
}

/// Delete files under `dir` whose embedded date is older than `cutoff`.
fn prune(dir: &Path, cutoff: Date, embedded: impl Fn(&str) -> Option<Date>) {
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        if !entry.path().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else { continue };
        let Some(date) = embedded(name) else { continue };

        if date < cutoff {
            debug!("pruning expired {:?}", entry.path());
            if let Err(err) = fs::remove_file(entry.path()) {
                warn!("pruning {:?} failed: {err}", entry.path());
            }
        }
    }
}
