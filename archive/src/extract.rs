//! Single-layer in-place archive extraction.

use std::{
    fs,
    fs::File,
    path::{Component, Path, PathBuf},
};

use compress_tools::{list_archive_files, uncompress_archive_file, uncompress_data};
use derive_more::Constructor;
use getset::{CopyGetters, Getters};
use log::debug;

use crate::{unique_path, Error, Format};

/// A directory created or a file written by an extraction.
#[derive(Clone, Debug, Constructor, Getters, CopyGetters)]
pub struct Entry {
    /// Where the entry landed on disk.
    #[getset(get = "pub")]
    path: PathBuf,

    /// Size in bytes. Zero for directories.
    #[getset(get_copy = "pub")]
    size: u64,

    /// Whether the entry is a file or a directory.
    #[getset(get_copy = "pub")]
    kind: EntryKind,

    /// Whether the uniqueness rule renamed the entry away from its archived name.
    #[getset(get_copy = "pub")]
    renamed: bool,
}

/// The kind of an extracted entry.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EntryKind {
    /// A regular file.
    File,

    /// A directory.
    Directory,
}

/// Extract all entries of the archive into its parent directory.
///
/// Directory entries are created (and merge with directories already present);
/// file entries are streamed to `<parent>/<entry path>` with the uniqueness rule
/// applied to the file name, so an incumbent file is never overwritten. On
/// success the archive file itself is deleted and one [`Entry`] is returned per
/// directory created and file written.
///
/// On failure the archive and any entries already written stay on disk; the
/// caller re-encounters them on its next sweep of the directory.
///
/// Gzip-compressed tars are handled in two steps: the outer gzip is decompressed
/// into an intermediate `.tar` beside the archive, the tar is extracted, and the
/// intermediate is removed. The intermediate never appears in the returned
/// entries.
pub fn extract_in_place(archive: &Path) -> Result<Vec<Entry>, Error> {
    let format =
        Format::detect_path(archive).ok_or_else(|| Error::NotAnArchive(archive.to_owned()))?;
    debug!("extracting {archive:?} as {format:?}");

    match format {
        Format::TarGz => extract_gzip_tar(archive),
        Format::Zip | Format::Tar | Format::SevenZ => extract_entries(archive),
    }
}

fn extract_entries(archive: &Path) -> Result<Vec<Entry>, Error> {
    let parent = parent_dir(archive)?;
    let names = list_archive_files(&mut File::open(archive)?)?;

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let rel = sanitize(&name)?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        if name.ends_with('/') {
            let dir = parent.join(&rel);
            fs::create_dir_all(&dir)?;
            entries.push(Entry::new(dir, 0, EntryKind::Directory, false));
            continue;
        }

        let candidate = parent.join(&rel);
        if let Some(dir) = candidate.parent() {
            fs::create_dir_all(dir)?;
        }

        let (dest, renamed) = unique_path(&candidate);
        let mut source = File::open(archive)?;
        let mut target = File::create(&dest)?;
        let size = uncompress_archive_file(&mut source, &mut target, &name)? as u64;
        debug!("wrote {dest:?} ({size} bytes)");
        entries.push(Entry::new(dest, size, EntryKind::File, renamed));
    }

    fs::remove_file(archive)?;
    Ok(entries)
}

fn extract_gzip_tar(archive: &Path) -> Result<Vec<Entry>, Error> {
    let parent = parent_dir(archive)?;
    let (tar_path, _) = unique_path(&parent.join(inner_tar_name(archive)));

    // The tar extraction consumes the intermediate on success; a failed round
    // must not leak it either, or the next sweep would pick it up as input.
    let result = gunzip_to(archive, &tar_path).and_then(|_| extract_entries(&tar_path));
    match result {
        Ok(entries) => {
            fs::remove_file(archive)?;
            Ok(entries)
        }
        Err(err) => {
            if tar_path.exists() {
                let _ = fs::remove_file(&tar_path);
            }
            Err(err)
        }
    }
}

fn gunzip_to(archive: &Path, tar_path: &Path) -> Result<(), Error> {
    let mut source = File::open(archive)?;
    let mut target = File::create(tar_path)?;
    let size = uncompress_data(&mut source, &mut target)?;
    debug!("decompressed {archive:?} into {tar_path:?} ({size} bytes)");
    Ok(())
}

/// Derive the intermediate tar name for a gzip-compressed tar:
/// `data.tar.gz` becomes `data.tar`, `data.tz` becomes `data.tar`.
pub(crate) fn inner_tar_name(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(stem) = strip_suffix_ignore_ascii_case(&name, ".gz") {
        stem.to_owned()
    } else if let Some(stem) = strip_suffix_ignore_ascii_case(&name, ".tz") {
        format!("{stem}.tar")
    } else {
        format!("{name}.tar")
    }
}

fn strip_suffix_ignore_ascii_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if name.len() < suffix.len() {
        return None;
    }
    let split = name.len() - suffix.len();
    match (name.get(..split), name.get(split..)) {
        (Some(stem), Some(tail)) if tail.eq_ignore_ascii_case(suffix) => Some(stem),
        _ => None,
    }
}

fn parent_dir(archive: &Path) -> Result<&Path, Error> {
    archive
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| Error::NoParent(archive.to_owned()))
}

/// Reject entry paths that would escape the extraction directory.
fn sanitize(name: &str) -> Result<PathBuf, Error> {
    let mut rel = PathBuf::new();
    for component in Path::new(name.trim_end_matches('/')).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafeEntry(name.to_owned()))
            }
        }
    }
    Ok(rel)
}
