//! Orchestrates one ingestion pass for a single data source.
//!
//! A pass partitions the data source's folders by environment and, per
//! environment: drains the folders into `temp/<env>/`, runs the extract sweep,
//! classifies the survivors, bundles them, and finally ships the bundles to
//! the lake and the backup tree. Environments use disjoint lineage trackers
//! and fail independently.

use std::{collections::BTreeMap, fs, path::PathBuf, sync::Arc, time::Duration};

use defer_lite::defer;
use log::{debug, error, info, warn};
use stable_eyre::{eyre::Context, Result};
use tokio::task;
use typed_builder::TypedBuilder;

use crate::{
    lake::Lake,
    layout::SourceLayout,
    lineage::Tracker,
    runlog::RunLog,
    store::{self, DataSource, FolderPath, Store},
};

mod bundle;
mod pass;

use pass::Pass;

/// Drives the move / extract / rebundle pipeline for one data source at a time.
#[derive(TypedBuilder)]
pub struct Pipeline<S, L> {
    /// Lineage and configuration persistence.
    store: Arc<S>,

    /// Upload seam for finished bundles.
    lake: Arc<L>,

    /// Root of the per-data-source directory trees.
    #[builder(setter(into))]
    processing_root: PathBuf,

    /// Whether finished bundles are offered to the lake at all.
    #[builder(default = false)]
    upload: bool,

    /// How long to wait after closing a bundle before reading it back.
    #[builder(default = Duration::from_secs(1))]
    flush_pause: Duration,
}

impl<S: Store + 'static, L: Lake> Pipeline<S, L> {
    /// Run one full pass for a data source over its configured folders.
    ///
    /// A failing environment is logged and skipped; the other environments of
    /// the same data source still run.
    pub async fn run(&self, source: &DataSource, folders: &[FolderPath]) -> Result<()> {
        debug!("starting pass for {}", source.name);
        defer! { debug!("exited pass"); }

        let layout = SourceLayout::new(&self.processing_root, &source.name);
        layout.ensure().context("materialize directory tree")?;

        let runlog = RunLog::new(layout.log(), &source.name);
        let errlog = RunLog::new(layout.error_log(), &source.name);

        let mut environments: BTreeMap<String, Vec<FolderPath>> = BTreeMap::new();
        for folder in folders {
            if folder.active && folder.data_source_id == source.id {
                environments
                    .entry(folder.environment.clone())
                    .or_default()
                    .push(folder.clone());
            }
        }

        for (environment, folders) in environments {
            let outcome = self
                .run_environment(&layout, source, &environment, folders, &runlog, &errlog)
                .await;
            if let Err(err) = outcome {
                error!("environment {environment} of {} failed: {err:?}", source.name);
                errlog.append(&format!("environment {environment} failed: {err}"));
            }
        }
        Ok(())
    }

    async fn run_environment(
        &self,
        layout: &SourceLayout,
        source: &DataSource,
        environment: &str,
        folders: Vec<FolderPath>,
        runlog: &RunLog,
        errlog: &RunLog,
    ) -> Result<()> {
        let temp = layout.temp_env(environment);
        let backup = layout.backup_env(environment);
        for dir in [&temp, &backup, &layout.error_files_env(environment)] {
            fs::create_dir_all(dir).with_context(|| format!("create {dir:?}"))?;
        }

        let tracker = Arc::new(Tracker::default());

        // Drain, sweep, and classify are synchronous disk work; run them off
        // the async workers. Quarantine rows gathered up to a failure are
        // recorded even when the pass aborts partway.
        let mut pass = Pass::new(
            source.name.clone(),
            environment.to_owned(),
            temp.clone(),
            layout.error_files_env(environment),
            Arc::clone(&tracker),
            runlog.clone(),
            errlog.clone(),
        );
        let (mut pass, outcome) = task::spawn_blocking(move || {
            let outcome = pass
                .drain(&folders)
                .and_then(|_| pass.sweep())
                .and_then(|_| pass.classify());
            (pass, outcome)
        })
        .await
        .context("join pass worker")?;

        for draft in pass.take_drafts() {
            if let Err(err) = self.store.insert_error(draft).await {
                warn!("recording quarantine row failed: {err:?}");
            }
        }
        outcome?;

        let cap = bundle::max_bundle_bytes(self.configured_cap().await);
        let drafts = {
            let data_source = source.name.clone();
            let environment = environment.to_owned();
            let temp = temp.clone();
            let tracker = Arc::clone(&tracker);
            let flush_pause = self.flush_pause;
            task::spawn_blocking(move || {
                bundle::bundle_dir(&data_source, &environment, &temp, &tracker, cap, flush_pause)
            })
            .await
            .context("join bundler worker")??
        };

        let produced: Vec<String> = drafts
            .iter()
            .map(|draft| draft.final_archive_name.clone())
            .collect();
        for draft in drafts {
            if let Err(err) = self.store.insert_bundle(draft).await {
                warn!("recording bundle row failed: {err:?}");
            }
        }

        for name in produced {
            let path = temp.join(&name);

            if self.upload {
                match self.lake.upload(environment, &source.name, &path).await {
                    Ok(()) => {
                        if let Err(err) = self.store.update_uploaded(&name, true).await {
                            warn!("recording upload status failed: {err:?}");
                        }
                    }
                    Err(err) => {
                        error!("upload of {name} failed: {err:?}");
                        errlog.append(&format!("upload failed for {name}: {err}"));
                    }
                }
            }

            let dest = backup.join(&name);
            fs::rename(&path, &dest).with_context(|| format!("archive {name} to backup"))?;
            if let Err(err) = self.store.update_backup_path(&name, &dest).await {
                warn!("recording backup path failed: {err:?}");
            }
            runlog.append(&format!("archived {name} to {}", dest.display()));
        }

        info!("environment {environment} of {} complete", source.name);
        Ok(())
    }

    async fn configured_cap(&self) -> Option<String> {
        match self.store.setting(store::MAX_ZIP_SIZE).await {
            Ok(value) => value,
            Err(err) => {
                warn!("reading {} failed: {err:?}", store::MAX_ZIP_SIZE);
                None
            }
        }
    }
}
