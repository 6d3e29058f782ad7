use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors encountered while extracting an archive in place.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The file name does not match any recognized archive format.
    #[error("{0:?} is not a recognized archive")]
    NotAnArchive(PathBuf),

    /// The archive path has no parent directory to extract into.
    #[error("{0:?} has no parent directory")]
    NoParent(PathBuf),

    /// An entry path would escape the extraction directory.
    #[error("entry path {0:?} escapes the extraction directory")]
    UnsafeEntry(String),

    /// Generic IO error while reading the archive or writing entries.
    #[error("generic io")]
    Io(#[from] io::Error),

    /// The libarchive backend failed to read the archive.
    #[error("libarchive backend")]
    Backend(#[from] compress_tools::Error),
}
