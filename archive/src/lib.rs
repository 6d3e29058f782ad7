//! Recognizes compressed archives, expands them in place, and packs files into zip bundles.
//!
//! Extraction is deliberately single-layer: expanding an archive writes its entries
//! next to it and consumes the archive file, but archives discovered among the
//! entries are left alone. Callers that want full recursion drive this crate in a
//! loop, re-listing the working directory between rounds; that keeps partially
//! extracted state observable on disk instead of hidden inside a call stack.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

use std::path::{Path, PathBuf};

pub mod bundle;
mod error;
mod extract;

pub use error::*;
pub use extract::{extract_in_place, Entry, EntryKind};

/// The archive formats the extractor recognizes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Format {
    /// A `.zip` archive.
    Zip,

    /// An uncompressed `.tar` archive.
    Tar,

    /// A gzip-compressed tar archive (`.tar.gz` or `.tz`).
    TarGz,

    /// A `.7z` archive.
    SevenZ,
}

impl Format {
    /// Identify the archive format from a file name.
    ///
    /// Recognition is purely name-based: the lower-cased name must end in one of
    /// the known archive suffixes. Anything else is not an archive.
    pub fn detect(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tz") {
            Some(Self::TarGz)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".7z") {
            Some(Self::SevenZ)
        } else {
            None
        }
    }

    /// Identify the archive format from the file name portion of a path.
    pub fn detect_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::detect)
    }
}

/// Resolve a candidate path to one that does not exist yet.
///
/// If the candidate is free it is returned as-is. Otherwise `(k)` is inserted
/// before the final extension, probing `base(1).ext`, `base(2).ext`, ... until a
/// free name is found. The boolean is `true` iff the candidate was taken and a
/// suffixed name had to be chosen.
pub fn unique_path(candidate: &Path) -> (PathBuf, bool) {
    if !candidate.exists() {
        return (candidate.to_owned(), false);
    }

    let stem = candidate
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = candidate
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned());

    let mut k = 1u64;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem}({k}).{ext}"),
            None => format!("{stem}({k})"),
        };

        let probe = candidate.with_file_name(name);
        if !probe.exists() {
            return (probe, true);
        }
        k += 1;
    }
}
