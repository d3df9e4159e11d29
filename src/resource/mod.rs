//! Byte sources and resource lookup
//!
//! Clips and streams read their encoded bytes through a [`ResourceProvider`]:
//! open a resource by name and get back a sized, readable byte stream. The
//! same [`ByteSource`] shape is used whether the bytes come from a loose file
//! ([`FileSystemResources`]) or from an entry of a packed
//! [`ResourceArchive`].

pub mod archive;

pub use archive::{ResourceArchive, ResourceArchiveWriter};

use crate::{Result, SoundError};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Readable byte stream handed to decoders
///
/// A short or zero-length read signals end of data.
pub trait ByteSource: Read + Send {}

impl<T: Read + Send> ByteSource for T {}

/// Opens named resources as byte streams
pub trait ResourceProvider {
    /// Open `name` for reading
    ///
    /// Fails with [`SoundError::ResourceNotFound`] when the name is unknown.
    fn open(&self, name: &str) -> Result<Box<dyn ByteSource>>;

    /// Size of `name` in bytes
    fn size(&self, name: &str) -> Result<u64>;
}

/// Resources read directly from loose files below a root directory
#[derive(Debug, Clone)]
pub struct FileSystemResources {
    root: PathBuf,
}

impl FileSystemResources {
    /// Resolve names relative to `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FileSystemResources {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(SoundError::ResourceNotFound(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

/// Map a missing file to `ResourceNotFound`, keep other IO failures
pub(crate) fn open_error(name: &str, err: io::Error) -> SoundError {
    if err.kind() == io::ErrorKind::NotFound {
        SoundError::ResourceNotFound(name.to_string())
    } else {
        SoundError::Io(err)
    }
}

impl ResourceProvider for FileSystemResources {
    fn open(&self, name: &str) -> Result<Box<dyn ByteSource>> {
        let path = self.resolve(name)?;
        let file = File::open(&path).map_err(|e| open_error(name, e))?;
        Ok(Box::new(file))
    }

    fn size(&self, name: &str) -> Result<u64> {
        let path = self.resolve(name)?;
        let metadata = std::fs::metadata(&path).map_err(|e| open_error(name, e))?;
        Ok(metadata.len())
    }
}
