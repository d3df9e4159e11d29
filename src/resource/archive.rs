//! Packed resource archive
//!
//! Aggregates many data files into one. The file is a plain sequence of
//! entries with no version field or checksum:
//!
//! ```text
//! payload_size: i32 LE | name_length: i32 LE | reserved: i32 | reserved: i32
//! name bytes (name_length, not NUL-terminated)
//! payload bytes (payload_size)
//! ```
//!
//! When a name occurs more than once, the last entry wins. Appending to an
//! archive therefore overrides earlier resources without rewriting them.

use super::{open_error, ByteSource, ResourceProvider};
use crate::{Result, SoundError};
use nom::number::complete::le_i32;
use nom::sequence::tuple;
use nom::IResult;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Size of an entry header in bytes
pub const HEADER_LEN: usize = 16;

/// Longest accepted resource name in bytes
pub const MAX_NAME_LEN: usize = 1000;

/// Entry header as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct EntryHeader {
    size: i32,
    name_length: i32,
    reserved1: i32,
    reserved2: i32,
}

impl EntryHeader {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.name_length.to_le_bytes());
        out[8..12].copy_from_slice(&self.reserved1.to_le_bytes());
        out[12..16].copy_from_slice(&self.reserved2.to_le_bytes());
        out
    }
}

fn parse_header(input: &[u8]) -> IResult<&[u8], EntryHeader> {
    let (rest, (size, name_length, reserved1, reserved2)) =
        tuple((le_i32, le_i32, le_i32, le_i32))(input)?;
    Ok((
        rest,
        EntryHeader {
            size,
            name_length,
            reserved1,
            reserved2,
        },
    ))
}

/// Location of one resource inside the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    offset: u64,
    size: u64,
}

/// Read-only index over a packed resource archive
#[derive(Debug, Clone)]
pub struct ResourceArchive {
    path: PathBuf,
    index: BTreeMap<String, Entry>,
}

impl ResourceArchive {
    /// Open an archive and index its entries
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| open_error(&path.to_string_lossy(), e))?;
        let total = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut index = BTreeMap::new();
        let mut position = 0u64;

        while position < total {
            let mut raw = [0u8; HEADER_LEN];
            reader
                .read_exact(&mut raw)
                .map_err(|_| SoundError::Archive(format!("truncated header at offset {position}")))?;
            let (_, header) = parse_header(&raw)
                .map_err(|e| SoundError::Archive(format!("bad header at offset {position}: {e}")))?;

            if header.name_length < 0 || header.name_length as usize > MAX_NAME_LEN {
                return Err(SoundError::Archive(format!(
                    "resource name length {} outside 0..={MAX_NAME_LEN}",
                    header.name_length
                )));
            }
            if header.size < 0 {
                return Err(SoundError::Archive(format!(
                    "negative payload size {} at offset {position}",
                    header.size
                )));
            }

            let mut name = vec![0u8; header.name_length as usize];
            reader
                .read_exact(&mut name)
                .map_err(|_| SoundError::Archive(format!("truncated name at offset {position}")))?;
            let name = String::from_utf8_lossy(&name).into_owned();

            let offset = position + HEADER_LEN as u64 + header.name_length as u64;
            let size = header.size as u64;
            if offset + size > total {
                return Err(SoundError::Archive(format!(
                    "payload of '{name}' runs past end of archive"
                )));
            }
            reader.seek(SeekFrom::Start(offset + size))?;
            index.insert(name, Entry { offset, size });
            position = offset + size;
        }

        tracing::debug!(archive = %path.display(), entries = index.len(), "indexed resource archive");
        Ok(ResourceArchive { path, index })
    }

    /// Archive file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct resources
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when the archive holds no resources
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Resource names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    fn entry(&self, name: &str) -> Result<Entry> {
        if name.is_empty() {
            return Err(SoundError::ResourceNotFound(String::new()));
        }
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SoundError::ResourceNotFound(name.to_string()))
    }
}

impl ResourceProvider for ResourceArchive {
    fn open(&self, name: &str) -> Result<Box<dyn ByteSource>> {
        let entry = self.entry(name)?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(entry.offset))?;
        Ok(Box::new(file.take(entry.size)))
    }

    fn size(&self, name: &str) -> Result<u64> {
        Ok(self.entry(name)?.size)
    }
}

/// Creates or extends a resource archive
#[derive(Debug)]
pub struct ResourceArchiveWriter {
    file: BufWriter<File>,
}

impl ResourceArchiveWriter {
    /// Open `path` for writing
    ///
    /// With `append`, new entries are added after the existing ones (and
    /// override same-named ones); otherwise the archive is truncated.
    pub fn create<P: AsRef<Path>>(path: P, append: bool) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(path.as_ref()).map_err(|e| {
            SoundError::Archive(format!(
                "cannot open '{}' for writing: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(ResourceArchiveWriter {
            file: BufWriter::new(file),
        })
    }

    /// Add a resource by copying a file; the path as given becomes its name
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();
        let mut source = File::open(path).map_err(|e| open_error(&name, e))?;
        let size = source.metadata()?.len();
        self.write_header(&name, size)?;
        let copied = io::copy(&mut source, &mut self.file)?;
        if copied != size {
            return Err(SoundError::Archive(format!(
                "size mismatch between metadata ({size}) and read ({copied}): {name}"
            )));
        }
        Ok(())
    }

    /// Add a resource from a memory buffer
    pub fn add_resource(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.write_header(name, data.len() as u64)?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Flush buffered entries to disk
    pub fn finish(mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn write_header(&mut self, name: &str, size: u64) -> Result<()> {
        if name.is_empty() {
            return Err(SoundError::Archive("resource name is empty".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(SoundError::Archive(format!(
                "resource name too long (max {MAX_NAME_LEN}): {name}"
            )));
        }
        let size = i32::try_from(size)
            .map_err(|_| SoundError::Archive(format!("resource too large: {name}")))?;
        let header = EntryHeader {
            size,
            name_length: name.len() as i32,
            ..EntryHeader::default()
        };
        self.file.write_all(&header.encode())?;
        self.file.write_all(name.as_bytes())?;
        Ok(())
    }
}
