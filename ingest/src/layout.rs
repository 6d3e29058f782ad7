//! Materializes the per-data-source directory tree.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use getset::Getters;

/// The directory tree owned by one data source:
///
/// ```not_rust
/// <processing_root>/<data_source>/
///   temp/<env>/          transient working files
///   backup/<env>/        finished bundles
///   log/                 date-stamped activity logs
///   error/files/<env>/   quarantined offenders
///   error/log/           date-stamped error logs
/// ```
///
/// The tree is owned exclusively by the data source's pipeline instance while
/// a run is in flight; the single-flight gate and the one-worker-per-source
/// dispatch enforce that.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct SourceLayout {
    /// `<processing_root>/<data_source>`.
    base: PathBuf,

    /// Transient working directories, one subdirectory per environment.
    temp: PathBuf,

    /// Finished bundles, one subdirectory per environment.
    backup: PathBuf,

    /// Date-stamped activity logs.
    log: PathBuf,

    /// Quarantined offenders, one subdirectory per environment.
    error_files: PathBuf,

    /// Date-stamped error logs.
    error_log: PathBuf,
}

impl SourceLayout {
    /// Lay out the tree for a data source under the processing root.
    pub fn new(processing_root: &Path, data_source: &str) -> Self {
        let base = processing_root.join(data_source);
        let error = base.join("error");
        Self {
            temp: base.join("temp"),
            backup: base.join("backup"),
            log: base.join("log"),
            error_files: error.join("files"),
            error_log: error.join("log"),
            base,
        }
    }

    /// Create every directory of the tree, parents included. Idempotent.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            &self.base,
            &self.temp,
            &self.backup,
            &self.log,
            &self.error_files,
            &self.error_log,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// The transient working directory for an environment.
    pub fn temp_env(&self, environment: &str) -> PathBuf {
        self.temp.join(environment)
    }

    /// The bundle archive directory for an environment.
    pub fn backup_env(&self, environment: &str) -> PathBuf {
        self.backup.join(environment)
    }

    /// The quarantine directory for an environment.
    pub fn error_files_env(&self, environment: &str) -> PathBuf {
        self.error_files.join(environment)
    }
}
