//! The persistence contract for configuration reads and lineage writes.
//!
//! The engine does not own a database. It reads its configuration rows and
//! records what it did through the [`Store`] trait; the in-process [`Memory`]
//! implementation backs tests and single-node deployments, and production
//! deployments plug a real DAO in behind the same contract.
//!
//! Persistence failures never abort ingestion: callers log and swallow them.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stable_eyre::Result;
use time::OffsetDateTime;

mod memory;

pub use memory::*;

/// Name of the setting holding the bundle size cap, in megabytes.
pub const MAX_ZIP_SIZE: &str = "MAX_ZIP_SIZE";

/// A logical ingest target.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DataSource {
    /// Row id.
    pub id: i64,

    /// Name of the data source; also names its directory tree.
    pub name: String,

    /// Inactive data sources are skipped by every tick.
    pub active: bool,
}

/// A physical directory drained into a data source, partitioned by environment.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FolderPath {
    /// Row id.
    pub id: i64,

    /// The data source this folder feeds.
    pub data_source_id: i64,

    /// Environment label partitioning the temp and backup subdirectories.
    pub environment: String,

    /// The directory drained on every tick.
    pub folder_path: PathBuf,

    /// Inactive folders are not drained.
    pub active: bool,
}

/// A named scalar configuration row.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Setting {
    /// Setting name.
    pub name: String,

    /// Raw value; interpretation is up to the reader.
    pub value: String,
}

/// Why a file was quarantined.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Debug,
    strum::Display,
    strum::EnumString,
    Deserialize,
    Serialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The file collided with an incumbent of the same name.
    DuplicateFile,

    /// The file survived extraction but is not an accepted terminal type.
    WrongFileType,

    /// The archive could not be read.
    ExtractionError,
}

/// How a file arrived in the working directory.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrigin {
    /// Moved straight from a configured source folder.
    Direct,

    /// Produced by decompressing an archive.
    Extracted,
}

/// Lineage of a single working file, as recorded on a bundle row.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FileInfo {
    /// Working file name at bundling time.
    pub file_name: String,

    /// Whether the file was drained directly or extracted from an archive.
    pub origin: FileOrigin,

    /// Size in bytes.
    pub size_bytes: u64,

    /// The source folder the file (or its first-level archive) was drained from.
    pub original_folder_path: Option<PathBuf>,

    /// The first-level archive the file was extracted from, if any.
    pub original_zip: Option<String>,
}

/// A quarantine event waiting for an id.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorDraft {
    /// The data source the offender belonged to.
    pub data_source: String,

    /// The environment the offender was processed under.
    pub environment: String,

    /// Why the file was quarantined.
    pub kind: ErrorKind,

    /// The offender's working file name (after any collision suffixing).
    pub file_name: String,

    /// The source folder the offender descends from, when known.
    pub folder_path: Option<PathBuf>,

    /// The offender's first-level archive, when it was extracted.
    pub original_archive_file_name: Option<String>,
}

/// A persisted quarantine row.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorRecord {
    /// Generated unique id.
    pub id: u64,

    /// The quarantine event.
    #[serde(flatten)]
    pub draft: ErrorDraft,

    /// Whether an operator has resolved the offender. Always false on insert.
    pub solved: bool,

    /// Insertion time.
    pub created_at: OffsetDateTime,
}

/// A finished bundle waiting for an id.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BundleDraft {
    /// The bundle's file name, unique per pass by virtue of its timestamp.
    pub final_archive_name: String,

    /// The data source the bundle belongs to.
    pub data_source: String,

    /// The environment the bundle was produced under.
    pub environment: String,

    /// Every source folder that contributed to the pass.
    pub source_folder_paths: BTreeSet<PathBuf>,

    /// Lineage of the bundle's members, in append order.
    pub files_info: Vec<FileInfo>,

    /// Size of the finished bundle on disk.
    pub bundle_size_bytes: u64,

    /// Number of member files.
    pub total_files_count: usize,
}

/// A persisted bundle-tracking row.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BundleRecord {
    /// Generated unique id.
    pub id: u64,

    /// The bundle description.
    #[serde(flatten)]
    pub draft: BundleDraft,

    /// Insertion time.
    pub created_at: OffsetDateTime,

    /// Where the bundle was archived; set after it ships to the backup tree.
    pub backup_path: Option<PathBuf>,

    /// Whether the bundle reached the data lake. Always false on insert.
    pub uploaded_to_datalake: bool,
}

/// The engine's read/write contract with the backing database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Load all active data sources.
    async fn active_data_sources(&self) -> Result<Vec<DataSource>>;

    /// Load the active folder paths configured for a data source.
    async fn active_folder_paths(&self, data_source_id: i64) -> Result<Vec<FolderPath>>;

    /// Read a named setting, if present.
    async fn setting(&self, name: &str) -> Result<Option<String>>;

    /// Insert a quarantine row. The store generates the unique id.
    async fn insert_error(&self, draft: ErrorDraft) -> Result<u64>;

    /// Insert a bundle-tracking row. The store generates the unique id.
    async fn insert_bundle(&self, draft: BundleDraft) -> Result<u64>;

    /// Record where a bundle was archived, located by archive name. When
    /// several rows share the name, the latest wins.
    async fn update_backup_path(&self, final_archive_name: &str, path: &Path) -> Result<()>;

    /// Record whether a bundle reached the data lake, located by archive name.
    /// When several rows share the name, the latest wins.
    async fn update_uploaded(&self, final_archive_name: &str, uploaded: bool) -> Result<()>;
}
