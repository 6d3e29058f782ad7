//! Packs the drained working directory into size-capped zip bundles.

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use archive::bundle::Bundle;
use log::{debug, warn};
use stable_eyre::{
    eyre::{eyre, Context},
    Result,
};
use time::OffsetDateTime;

use crate::{lineage::Tracker, stamp, store::BundleDraft};

/// Fallback bundle cap when the setting is missing or invalid, in megabytes.
const DEFAULT_MAX_BUNDLE_MB: u64 = 1;

const BYTES_PER_MB: u64 = 1_048_576;

/// Interpret the `MAX_ZIP_SIZE` setting (megabytes) as a byte cap.
///
/// Missing, unparseable, zero, and negative values all fall back to the 1 MB
/// default; deployments that need larger bundles must configure it.
pub(crate) fn max_bundle_bytes(setting: Option<String>) -> u64 {
    let configured = setting
        .as_deref()
        .map(str::trim)
        .and_then(|raw| match raw.parse::<i64>() {
            Ok(mb) if mb > 0 => Some(mb as u64),
            Ok(mb) => {
                warn!("ignoring non-positive bundle cap {mb} MB");
                None
            }
            Err(_) => {
                warn!("ignoring unparseable bundle cap {raw:?}");
                None
            }
        });
    configured.unwrap_or(DEFAULT_MAX_BUNDLE_MB) * BYTES_PER_MB
}

/// Pack every top-level file of `temp` into timestamp-named bundles of at most
/// `cap` bytes of input each, deleting inputs as they are consumed. Returns
/// one draft row per bundle, in production order.
///
/// The listing is snapshotted once, so bundles opened along the way are not
/// picked up as inputs. An empty listing produces no bundle and no row. A
/// single file larger than the cap still bundles, alone.
pub(crate) fn bundle_dir(
    data_source: &str,
    environment: &str,
    temp: &Path,
    tracker: &Tracker,
    cap: u64,
    flush_pause: Duration,
) -> Result<Vec<BundleDraft>> {
    let inputs = snapshot(temp)?;
    if inputs.is_empty() {
        debug!("nothing to bundle for {data_source}/{environment}");
        return Ok(Vec::new());
    }

    let mut drafts = Vec::new();
    let mut open: Option<Open> = None;

    for input in inputs {
        let split = match &open {
            None => true,
            // Strictly greater-than: a file exactly filling the cap stays in
            // the current bundle.
            Some(bundle) => bundle.bytes + input.size > cap,
        };

        if split {
            if let Some(finished) = open.take() {
                drafts.push(finished.close(data_source, environment, tracker, flush_pause)?);
            }
            open = Some(Open::start(data_source, temp)?);
        }

        let bundle = open.as_mut().ok_or_else(|| eyre!("no open bundle"))?;
        bundle.append(&input)?;
    }

    if let Some(finished) = open.take() {
        drafts.push(finished.close(data_source, environment, tracker, flush_pause)?);
    }

    Ok(drafts)
}

struct Input {
    path: PathBuf,
    name: String,
    size: u64,
}

/// Files currently at the top level of the working directory, in listing order.
fn snapshot(temp: &Path) -> Result<Vec<Input>> {
    let mut inputs = Vec::new();
    for entry in fs::read_dir(temp).context("list working directory")? {
        let entry = entry.context("read working directory entry")?;
        let meta = entry.metadata().context("stat working directory entry")?;
        if !meta.is_file() {
            continue;
        }
        inputs.push(Input {
            path: entry.path(),
            name: entry.file_name().to_string_lossy().into_owned(),
            size: meta.len(),
        });
    }
    Ok(inputs)
}

struct Open {
    bundle: Bundle,
    bytes: u64,
    members: Vec<String>,
}

impl Open {
    fn start(data_source: &str, temp: &Path) -> Result<Self> {
        let stamp = stamp::archive_stamp(OffsetDateTime::now_utc())
            .context("format archive timestamp")?;
        let candidate = temp.join(format!("{data_source}_{stamp}.zip"));
        // Sub-second reopens can reuse a stamp; never clobber a closed bundle.
        let (path, _) = archive::unique_path(&candidate);

        Ok(Self {
            bundle: Bundle::create(&path).context("open bundle")?,
            bytes: 0,
            members: Vec::new(),
        })
    }

    fn append(&mut self, input: &Input) -> Result<()> {
        self.bundle
            .append(&input.path)
            .with_context(|| format!("append {}", input.name))?;
        self.bytes += input.size;
        self.members.push(input.name.clone());
        fs::remove_file(&input.path).with_context(|| format!("consume {}", input.name))?;
        Ok(())
    }

    fn close(
        self,
        data_source: &str,
        environment: &str,
        tracker: &Tracker,
        flush_pause: Duration,
    ) -> Result<BundleDraft> {
        let closed = self.bundle.finish().context("finish bundle")?;
        // Let the OS finalize the handle before the size is read and the
        // archive is shipped.
        thread::sleep(flush_pause);

        let name = closed
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| eyre!("bundle has no file name"))?;
        debug!("closed {name} with {} member(s)", self.members.len());

        Ok(BundleDraft {
            final_archive_name: name,
            data_source: data_source.to_owned(),
            environment: environment.to_owned(),
            source_folder_paths: tracker.source_folders(),
            files_info: self
                .members
                .iter()
                .filter_map(|member| tracker.info(member))
                .collect(),
            bundle_size_bytes: closed.size_on_disk().context("stat finished bundle")?,
            total_files_count: self.members.len(),
        })
    }
}
