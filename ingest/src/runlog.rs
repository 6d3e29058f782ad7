//! Date-stamped per-data-source log files.
//!
//! The engine appends one activity log and one error log per data source,
//! rolled daily by embedding the date in the file name. Run logging is
//! best-effort: write failures degrade to process-level warnings and never
//! abort ingestion.

use std::{
    fs,
    fs::OpenOptions,
    io::Write,
    path::PathBuf,
};

use log::warn;
use stable_eyre::{eyre::Context, Result};
use time::OffsetDateTime;

use crate::stamp;

/// Appends timestamped lines to `<data_source>_<yyyy-MM-dd>.txt` under a fixed
/// directory, creating missing directories on write.
#[derive(Clone, Debug)]
pub struct RunLog {
    dir: PathBuf,
    data_source: String,
}

impl RunLog {
    /// A log writing under `dir` for the named data source.
    pub fn new(dir: impl Into<PathBuf>, data_source: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            data_source: data_source.into(),
        }
    }

    /// Append one `<yyyy:MM:dd HH:mm:ss>: <message>` line.
    pub fn append(&self, message: &str) {
        if let Err(err) = self.try_append(OffsetDateTime::now_utc(), message) {
            warn!("run log write for {} failed: {err:?}", self.data_source);
        }
    }

    fn try_append(&self, now: OffsetDateTime, message: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).context("create log directory")?;

        let date = now.date().format(stamp::LOG_DATE).context("format log date")?;
        let prefix = now.format(stamp::LOG_LINE).context("format log line stamp")?;

        let path = self.dir.join(format!("{}_{date}.txt", self.data_source));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {path:?}"))?;
        writeln!(file, "{prefix}: {message}").context("append log line")?;
        Ok(())
    }
}
