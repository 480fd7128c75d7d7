//! Byte sources for fingerprint computation.
//!
//! A source is exclusively owned by its `FileSum` and only ever read by one
//! thread at a time. Two variants: a file on disk and an in-memory buffer.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Read+seek capability over the bytes being fingerprinted.
pub trait SumSource: Read + Seek {
    /// Total size in bytes. May reposition the source; callers rewind
    /// explicitly before hashing.
    fn size(&mut self) -> Result<u64>;
}

/// File-backed source. Size comes from metadata, not from seeking.
pub struct FileSource {
    path: PathBuf,
    file: File,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl SumSource for FileSource {
    fn size(&mut self) -> Result<u64> {
        let meta = self
            .file
            .metadata()
            .with_context(|| format!("stat {}", self.path.display()))?;
        Ok(meta.len())
    }
}

/// In-memory buffer source. Size is determined with an end-seek, the way a
/// generic stream would be measured, and the cursor is rewound afterward.
pub struct MemSource {
    inner: Cursor<Vec<u8>>,
}

impl MemSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(bytes),
        }
    }
}

impl Read for MemSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for MemSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl SumSource for MemSource {
    fn size(&mut self) -> Result<u64> {
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(0))?;
        Ok(end)
    }
}
