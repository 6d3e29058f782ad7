//! In-memory lineage for one (data source, environment) pass.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::store::{FileInfo, FileOrigin};

/// Tracks where every working file came from during a pass.
///
/// Keys are working file names, which are unique within the per-environment
/// temp directory at any instant. One tracker lives for exactly one
/// (data source, environment) pass; concurrent passes use disjoint trackers,
/// and mutations within a pass serialize on an internal lock.
#[derive(Debug, Default)]
pub struct Tracker {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    info: HashMap<String, FileInfo>,
    folders: HashMap<String, PathBuf>,
    immediate: HashMap<String, String>,
    roots: HashMap<String, String>,
    contributed: BTreeSet<PathBuf>,
}

impl Tracker {
    /// Record a file moved straight from a configured source folder.
    pub fn track_direct(&self, name: &str, origin_folder: &Path, size: u64) {
        let mut state = self.lock();
        state.info.insert(
            name.to_owned(),
            FileInfo {
                file_name: name.to_owned(),
                origin: FileOrigin::Direct,
                size_bytes: size,
                original_folder_path: Some(origin_folder.to_owned()),
                original_zip: None,
            },
        );
        state.folders.insert(name.to_owned(), origin_folder.to_owned());
        state.contributed.insert(origin_folder.to_owned());
    }

    /// Record a file produced by extracting `parent_archive`.
    ///
    /// The first-level archive is resolved through the parent before the child
    /// is inserted, so any depth of nesting collapses to the archive that was
    /// drained from a source folder. The origin folder is inherited from the
    /// parent's entry when known.
    pub fn track_extracted(&self, name: &str, parent_archive: &str, size: u64) {
        let mut state = self.lock();
        let root = state
            .roots
            .get(parent_archive)
            .cloned()
            .unwrap_or_else(|| parent_archive.to_owned());
        let folder = state.folders.get(parent_archive).cloned();

        state.info.insert(
            name.to_owned(),
            FileInfo {
                file_name: name.to_owned(),
                origin: FileOrigin::Extracted,
                size_bytes: size,
                original_folder_path: folder.clone(),
                original_zip: Some(root.clone()),
            },
        );
        if let Some(folder) = folder {
            state.folders.insert(name.to_owned(), folder);
        }
        state.immediate.insert(name.to_owned(), parent_archive.to_owned());
        state.roots.insert(name.to_owned(), root);
    }

    /// The recorded lineage of a working file.
    pub fn info(&self, name: &str) -> Option<FileInfo> {
        self.lock().info.get(name).cloned()
    }

    /// The source folder a working file descends from.
    pub fn folder_of(&self, name: &str) -> Option<PathBuf> {
        self.lock().folders.get(name).cloned()
    }

    /// The first-level archive a working file descends from.
    pub fn root_archive_of(&self, name: &str) -> Option<String> {
        self.lock().roots.get(name).cloned()
    }

    /// Every source folder that contributed to the pass so far.
    ///
    /// Folders stay recorded even when their files are later quarantined.
    pub fn source_folders(&self) -> BTreeSet<PathBuf> {
        self.lock().contributed.clone()
    }

    /// Drop a working file from every map in one step. Called before a file is
    /// quarantined so it can never appear on a bundle row.
    pub fn remove(&self, name: &str) {
        let mut state = self.lock();
        state.info.remove(name);
        state.folders.remove(name);
        state.immediate.remove(name);
        state.roots.remove(name);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
