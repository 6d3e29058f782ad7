//! The synchronous disk half of an environment pass: drain, sweep, classify,
//! and the quarantine moves they trigger.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use archive::{unique_path, EntryKind, Format};
use log::{debug, warn};
use stable_eyre::{eyre::Context, Result};
use walkdir::WalkDir;

use crate::{
    lineage::Tracker,
    runlog::RunLog,
    store::{ErrorDraft, ErrorKind, FolderPath},
};

/// Iteration cap for the extract sweep. Pathological nesting and accidental
/// cycles terminate here instead of spinning forever.
const SWEEP_CAP: usize = 100;

/// Working state for one (data source, environment) pass.
pub(crate) struct Pass {
    data_source: String,
    environment: String,
    temp: PathBuf,
    error_dir: PathBuf,
    tracker: Arc<Tracker>,
    runlog: RunLog,
    errlog: RunLog,
    /// First-level archive for extraction outputs still below the top level,
    /// keyed by their current path.
    roots: HashMap<PathBuf, String>,
    drafts: Vec<ErrorDraft>,
}

impl Pass {
    pub(crate) fn new(
        data_source: String,
        environment: String,
        temp: PathBuf,
        error_dir: PathBuf,
        tracker: Arc<Tracker>,
        runlog: RunLog,
        errlog: RunLog,
    ) -> Self {
        Self {
            data_source,
            environment,
            temp,
            error_dir,
            tracker,
            runlog,
            errlog,
            roots: HashMap::new(),
            drafts: Vec::new(),
        }
    }

    /// Quarantine rows gathered so far, in occurrence order.
    pub(crate) fn take_drafts(&mut self) -> Vec<ErrorDraft> {
        std::mem::take(&mut self.drafts)
    }

    /// Move every top-level entry of the configured folders into the working
    /// directory. Directories move wholesale; files are tracked as direct.
    ///
    /// Entries that refuse to move are left in the source folder for the next
    /// tick rather than failing the pass.
    pub(crate) fn drain(&mut self, folders: &[FolderPath]) -> Result<()> {
        for folder in folders {
            let listing = match list_dir(&folder.folder_path) {
                Ok(listing) => listing,
                Err(err) => {
                    warn!("listing {:?} failed: {err:?}", folder.folder_path);
                    continue;
                }
            };

            let mut drained = 0usize;
            for (path, meta) in listing {
                let Some(name) = file_name(&path) else { continue };
                let (dest, collided) = unique_path(&self.temp.join(&name));
                if let Err(err) = fs::rename(&path, &dest) {
                    warn!("moving {path:?} failed, leaving it for the next tick: {err}");
                    continue;
                }
                drained += 1;

                if meta.is_dir() {
                    continue;
                }

                let Some(final_name) = file_name(&dest) else { continue };
                self.tracker
                    .track_direct(&final_name, &folder.folder_path, meta.len());
                if collided {
                    self.quarantine(Some(dest), final_name, ErrorKind::DuplicateFile);
                }
            }
            self.runlog.append(&format!(
                "drained {drained} entr(ies) from {} into {}",
                folder.folder_path.display(),
                self.environment
            ));
        }
        Ok(())
    }

    /// Iteratively flatten directories and expand archives until only plain
    /// top-level files remain, re-listing the working directory each round.
    pub(crate) fn sweep(&mut self) -> Result<()> {
        for _ in 0..SWEEP_CAP {
            let listing = list_dir(&self.temp).context("list working directory")?;

            let mut dirs = Vec::new();
            let mut archives = Vec::new();
            for (path, meta) in listing {
                if meta.is_dir() {
                    dirs.push(path);
                } else if Format::detect_path(&path).is_some() {
                    archives.push(path);
                }
            }

            if dirs.is_empty() && archives.is_empty() {
                return Ok(());
            }

            for dir in dirs {
                self.flatten(&dir);
            }
            for archive in archives {
                self.extract(archive, true);
            }
        }

        warn!(
            "sweep cap ({SWEEP_CAP}) reached for {}/{}; leaving the rest for the next tick",
            self.data_source, self.environment
        );
        self.runlog.append(&format!(
            "sweep cap ({SWEEP_CAP}) reached in {}",
            self.environment
        ));
        Ok(())
    }

    /// Quarantine every top-level survivor that is not a terminal `.xml` file.
    pub(crate) fn classify(&mut self) -> Result<()> {
        let listing = list_dir(&self.temp).context("list working directory")?;
        for (path, meta) in listing {
            if meta.is_dir() {
                continue;
            }
            let Some(name) = file_name(&path) else { continue };
            if name.to_lowercase().ends_with(".xml") {
                continue;
            }
            self.quarantine(Some(path), name, ErrorKind::WrongFileType);
        }
        Ok(())
    }

    /// Expand one archive in place, tracking what it produced.
    fn extract(&mut self, path: PathBuf, top_level: bool) {
        let Some(name) = file_name(&path) else { return };
        let root = self.resolve_root(&path, &name);

        match archive::extract_in_place(&path) {
            Ok(entries) => {
                self.roots.remove(&path);
                for entry in &entries {
                    if entry.kind() != EntryKind::File {
                        continue;
                    }
                    let Some(entry_name) = file_name(entry.path()) else { continue };

                    if entry.path().parent() == Some(self.temp.as_path()) {
                        // Top-level output: track it now. The tracker resolves
                        // the first-level archive through the parent.
                        let parent = if top_level { name.as_str() } else { root.as_str() };
                        self.tracker
                            .track_extracted(&entry_name, parent, entry.size());
                        if entry.renamed() {
                            self.quarantine(
                                Some(entry.path().clone()),
                                entry_name,
                                ErrorKind::DuplicateFile,
                            );
                        }
                    } else if entry.renamed() {
                        // Collided below the top level: isolate right away.
                        self.quarantine_below(
                            entry.path().clone(),
                            entry_name,
                            ErrorKind::DuplicateFile,
                            &root,
                        );
                    } else {
                        // Below the top level: remember the descent until the
                        // flatten step moves the file up.
                        self.roots.insert(entry.path().clone(), root.clone());
                    }
                }
                debug!("extracted {name}: {} entr(ies)", entries.len());
            }
            Err(err) => {
                warn!("extracting {name} failed: {err:?}");
                if top_level {
                    self.quarantine(Some(path), name, ErrorKind::ExtractionError);
                } else {
                    let root = (root != name).then_some(root);
                    let folder = root
                        .as_ref()
                        .and_then(|root| self.tracker.folder_of(root));
                    self.isolate(Some(path), name, ErrorKind::ExtractionError, folder, root);
                }
            }
        }
    }

    /// Move a directory's plain files up to the top level, expand archives
    /// where they sit, then prune emptied directories.
    fn flatten(&mut self, dir: &Path) {
        let files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.into_path())
            .collect();

        for file in files {
            let Some(name) = file_name(&file) else { continue };

            if Format::detect(&name).is_some() {
                // Expanded where it sits; the outputs surface on a later round.
                self.extract(file, false);
                continue;
            }

            let size = fs::metadata(&file).map(|meta| meta.len()).unwrap_or(0);
            let (dest, collided) = unique_path(&self.temp.join(&name));
            if let Err(err) = fs::rename(&file, &dest) {
                warn!("flattening {file:?} failed: {err}");
                continue;
            }
            let Some(final_name) = file_name(&dest) else { continue };

            match self.roots.remove(&file) {
                Some(root) => {
                    self.tracker.track_extracted(&final_name, &root, size);
                    if collided {
                        self.quarantine(Some(dest), final_name, ErrorKind::DuplicateFile);
                    }
                }
                None => {
                    // Out of a plain drained directory: an untracked
                    // intermediate until it survives classification.
                    if collided {
                        self.isolate(
                            Some(dest),
                            final_name,
                            ErrorKind::DuplicateFile,
                            None,
                            None,
                        );
                    }
                }
            }
        }

        // Bottom-up so nested directories empty before their parents. A
        // directory that still has content stays for the next round.
        for entry in WalkDir::new(dir)
            .follow_links(false)
            .contents_first(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if entry.path().is_dir() {
                let _ = fs::remove_dir(entry.path());
            }
        }
    }

    /// Quarantine a file the tracker may know about, resolving its lineage
    /// before dropping it from the maps.
    fn quarantine(&mut self, path: Option<PathBuf>, file_name: String, kind: ErrorKind) {
        let folder = self.tracker.folder_of(&file_name);
        let zip = self.tracker.root_archive_of(&file_name);
        self.tracker.remove(&file_name);
        self.isolate(path, file_name, kind, folder, zip);
    }

    /// Quarantine a colliding extraction output that never reached the top
    /// level; its descent is carried by the sweep rather than the tracker.
    fn quarantine_below(&mut self, path: PathBuf, file_name: String, kind: ErrorKind, root: &str) {
        self.roots.remove(&path);
        let folder = self.tracker.folder_of(root);
        self.isolate(
            Some(path),
            file_name,
            kind,
            folder,
            Some(root.to_owned()),
        );
    }

    /// Move the offender into the error tree (when it still exists on disk)
    /// and record the quarantine row draft.
    fn isolate(
        &mut self,
        path: Option<PathBuf>,
        file_name: String,
        kind: ErrorKind,
        folder: Option<PathBuf>,
        zip: Option<String>,
    ) {
        if let Some(path) = path.filter(|path| path.exists()) {
            let (dest, _) = unique_path(&self.error_dir.join(&file_name));
            if let Err(err) = fs::rename(&path, &dest) {
                warn!("quarantining {file_name} failed: {err}");
            }
        }

        self.errlog.append(&format!(
            "{kind}: {file_name} quarantined in {}",
            self.environment
        ));
        self.drafts.push(ErrorDraft {
            data_source: self.data_source.clone(),
            environment: self.environment.clone(),
            kind,
            file_name,
            folder_path: folder,
            original_archive_file_name: zip,
        });
    }

    /// The first-level archive this archive instance descends from; itself
    /// when it was drained straight from a folder or out of a plain directory.
    fn resolve_root(&self, path: &Path, name: &str) -> String {
        if let Some(root) = self.roots.get(path) {
            return root.clone();
        }
        self.tracker
            .root_archive_of(name)
            .unwrap_or_else(|| name.to_owned())
    }
}

fn list_dir(dir: &Path) -> Result<Vec<(PathBuf, fs::Metadata)>> {
    let mut listing = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list {dir:?}"))? {
        let entry = entry.context("read directory entry")?;
        let meta = entry.metadata().context("stat directory entry")?;
        listing.push((entry.path(), meta));
    }
    Ok(listing)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}
