//! Byte sources for point streams
//!
//! Large files are memory-mapped when the `io-mmap` feature is enabled and
//! the platform supports it; everything else goes through buffered file I/O.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
#[cfg(feature = "io-mmap")]
use std::io::Cursor;
use std::path::Path;

#[cfg(feature = "io-mmap")]
use memmap2::Mmap;

/// Files below this size are always read with buffered I/O
pub const MIN_MMAP_SIZE: u64 = 64 * 1024;

/// Which backend a [`ByteSource`] ended up using
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Buffered,
    Mapped,
}

/// Seekable byte stream over an opened file
pub enum ByteSource {
    Buffered(BufReader<File>),
    #[cfg(feature = "io-mmap")]
    Mapped(Cursor<Mmap>),
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ByteSource").field(&self.kind()).finish()
    }
}

/// Check if memory mapping is supported on this platform
pub fn is_mmap_supported() -> bool {
    cfg!(all(feature = "io-mmap", any(unix, windows)))
}

/// Check if a file is worth mapping
pub fn should_use_mmap<P: AsRef<Path>>(path: P) -> bool {
    if !is_mmap_supported() {
        return false;
    }
    std::fs::metadata(path)
        .map(|m| m.len() >= MIN_MMAP_SIZE)
        .unwrap_or(false)
}

impl ByteSource {
    /// Open `path`, mapping it when `prefer_mmap` is set and the file qualifies.
    ///
    /// A failed mapping falls back to buffered reads.
    pub fn open<P: AsRef<Path>>(path: P, prefer_mmap: bool) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        if prefer_mmap && should_use_mmap(path) {
            if let Some(mapped) = Self::map(&file, path) {
                return Ok(mapped);
            }
        }
        Ok(ByteSource::Buffered(BufReader::new(file)))
    }

    #[cfg(feature = "io-mmap")]
    fn map(file: &File, path: &Path) -> Option<Self> {
        // SAFETY: the map is read-only; a concurrent writer truncating the file
        // is outside what a viewer can guard against.
        match unsafe { Mmap::map(file) } {
            Ok(map) => Some(ByteSource::Mapped(Cursor::new(map))),
            Err(e) => {
                log::warn!("mmap of {} failed, using buffered reads: {}", path.display(), e);
                None
            }
        }
    }

    #[cfg(not(feature = "io-mmap"))]
    fn map(_file: &File, _path: &Path) -> Option<Self> {
        None
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            ByteSource::Buffered(_) => SourceKind::Buffered,
            #[cfg(feature = "io-mmap")]
            ByteSource::Mapped(_) => SourceKind::Mapped,
        }
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteSource::Buffered(r) => r.read(buf),
            #[cfg(feature = "io-mmap")]
            ByteSource::Mapped(c) => c.read(buf),
        }
    }
}

impl Seek for ByteSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            ByteSource::Buffered(r) => r.seek(pos),
            #[cfg(feature = "io-mmap")]
            ByteSource::Mapped(c) => c.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_of(len: usize) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        f.write_all(&data).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_small_file_is_buffered() {
        let f = file_of(128);
        let src = ByteSource::open(f.path(), true).unwrap();
        assert_eq!(src.kind(), SourceKind::Buffered);
    }

    #[cfg(feature = "io-mmap")]
    #[test]
    fn test_large_file_is_mapped_and_seekable() {
        let f = file_of(80_000);
        let mut src = ByteSource::open(f.path(), true).unwrap();
        if is_mmap_supported() {
            assert_eq!(src.kind(), SourceKind::Mapped);
        }
        src.seek(SeekFrom::Start(260)).unwrap();
        let mut b = [0u8; 2];
        src.read_exact(&mut b).unwrap();
        assert_eq!(b, [9, 10]);
    }

    #[test]
    fn test_mmap_can_be_declined() {
        let f = file_of(80_000);
        let src = ByteSource::open(f.path(), false).unwrap();
        assert_eq!(src.kind(), SourceKind::Buffered);
    }
}
