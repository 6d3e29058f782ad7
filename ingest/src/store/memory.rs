//! An in-process store implementation backing tests and single-node runs.

use std::{collections::HashSet, fs, path::Path};

use log::{debug, warn};
use rand::Rng;
use stable_eyre::eyre::Context;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::*;

/// Rows loaded into a fresh [`Memory`] store.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Seed {
    /// The configured data sources.
    pub data_sources: Vec<DataSource>,

    /// The configured folder paths.
    pub folder_paths: Vec<FolderPath>,

    /// Configuration settings; optional in the document.
    #[serde(default)]
    pub settings: Vec<Setting>,
}

impl Seed {
    /// Load a seed document from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read seed {path:?}"))?;
        serde_json::from_str(&raw).with_context(|| format!("parse seed {path:?}"))
    }
}

/// Keeps every table in memory behind one lock.
///
/// Generated ids are random and unique within the store; the generator
/// retries on collision.
#[derive(Debug, Default)]
pub struct Memory {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    data_sources: Vec<DataSource>,
    folder_paths: Vec<FolderPath>,
    settings: Vec<Setting>,
    errors: Vec<ErrorRecord>,
    bundles: Vec<BundleRecord>,
    ids: HashSet<u64>,
}

impl Inner {
    fn fresh_id(&mut self) -> u64 {
        let mut rng = rand::thread_rng();
        loop {
            let id = rng.gen();
            if self.ids.insert(id) {
                return id;
            }
        }
    }
}

impl Memory {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with the provided configuration rows.
    pub fn seeded(seed: Seed) -> Self {
        Self {
            inner: Mutex::new(Inner {
                data_sources: seed.data_sources,
                folder_paths: seed.folder_paths,
                settings: seed.settings,
                ..Inner::default()
            }),
        }
    }

    /// Snapshot of the persisted quarantine rows.
    pub async fn errors(&self) -> Vec<ErrorRecord> {
        self.inner.lock().await.errors.clone()
    }

    /// Snapshot of the persisted bundle-tracking rows.
    pub async fn bundles(&self) -> Vec<BundleRecord> {
        self.inner.lock().await.bundles.clone()
    }
}

#[async_trait]
impl Store for Memory {
    async fn active_data_sources(&self) -> Result<Vec<DataSource>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .data_sources
            .iter()
            .filter(|source| source.active)
            .cloned()
            .collect())
    }

    async fn active_folder_paths(&self, data_source_id: i64) -> Result<Vec<FolderPath>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .folder_paths
            .iter()
            .filter(|folder| folder.active && folder.data_source_id == data_source_id)
            .cloned()
            .collect())
    }

    async fn setting(&self, name: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .settings
            .iter()
            .find(|setting| setting.name == name)
            .map(|setting| setting.value.clone()))
    }

    async fn insert_error(&self, draft: ErrorDraft) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let id = inner.fresh_id();
        debug!("error row {id}: {} {}", draft.kind, draft.file_name);
        inner.errors.push(ErrorRecord {
            id,
            draft,
            solved: false,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(id)
    }

    async fn insert_bundle(&self, draft: BundleDraft) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let id = inner.fresh_id();
        debug!("bundle row {id}: {}", draft.final_archive_name);
        inner.bundles.push(BundleRecord {
            id,
            draft,
            created_at: OffsetDateTime::now_utc(),
            backup_path: None,
            uploaded_to_datalake: false,
        });
        Ok(id)
    }

    async fn update_backup_path(&self, final_archive_name: &str, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner
            .bundles
            .iter_mut()
            .rev()
            .find(|bundle| bundle.draft.final_archive_name == final_archive_name)
        {
            Some(bundle) => bundle.backup_path = Some(path.to_owned()),
            None => warn!("no bundle row named {final_archive_name} to update"),
        }
        Ok(())
    }

    async fn update_uploaded(&self, final_archive_name: &str, uploaded: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner
            .bundles
            .iter_mut()
            .rev()
            .find(|bundle| bundle.draft.final_archive_name == final_archive_name)
        {
            Some(bundle) => bundle.uploaded_to_datalake = uploaded,
            None => warn!("no bundle row named {final_archive_name} to update"),
        }
        Ok(())
    }
}
