//! Packs files into zip bundles, one entry per input file.

use std::{
    fs,
    fs::File,
    io,
    path::{Path, PathBuf},
};

use getset::Getters;
use log::debug;
use thiserror::Error;
use zip::{result::ZipError, write::FileOptions, CompressionMethod, ZipWriter};

/// Errors encountered while writing a bundle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The input path has no usable file name to derive an entry name from.
    #[error("{0:?} has no file name")]
    NoFileName(PathBuf),

    /// Generic IO error while reading inputs or writing the bundle.
    #[error("generic io")]
    Io(#[from] io::Error),

    /// The zip writer failed.
    #[error("zip writer")]
    Zip(#[from] ZipError),
}

/// An open zip bundle being written.
///
/// Entries are appended one file at a time; [`Bundle::finish`] writes the
/// central directory and closes the handle.
pub struct Bundle {
    path: PathBuf,
    writer: ZipWriter<File>,
    entries: Vec<String>,
}

impl Bundle {
    /// Open a new bundle at the provided path.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let writer = ZipWriter::new(File::create(&path)?);
        debug!("opened bundle {path:?}");

        Ok(Self {
            path,
            writer,
            entries: Vec::new(),
        })
    }

    /// The path the bundle is being written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry names appended so far, in append order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Append a file as a single entry named by its file name.
    ///
    /// The input file is left in place; deleting consumed inputs is the
    /// caller's policy, not the writer's.
    pub fn append(&mut self, file: &Path) -> Result<(), Error> {
        let name = file
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| Error::NoFileName(file.to_owned()))?;

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true);
        self.writer.start_file(&name, options)?;

        let mut input = File::open(file)?;
        io::copy(&mut input, &mut self.writer)?;
        debug!("appended {name} to {:?}", self.path);
        self.entries.push(name);
        Ok(())
    }

    /// Finalize the bundle, writing the central directory.
    pub fn finish(mut self) -> Result<Closed, Error> {
        self.writer.finish()?;
        debug!("finished bundle {:?}", self.path);

        Ok(Closed {
            path: self.path,
            entries: self.entries,
        })
    }
}

/// A finished bundle.
#[derive(Clone, Debug, Getters)]
pub struct Closed {
    /// Where the bundle was written.
    #[getset(get = "pub")]
    path: PathBuf,

    /// Entry names, in append order.
    #[getset(get = "pub")]
    entries: Vec<String>,
}

impl Closed {
    /// The size of the finished bundle on disk.
    pub fn size_on_disk(&self) -> io::Result<u64> {
        fs::metadata(&self.path).map(|meta| meta.len())
    }
}
