//! Forward-only point streaming with restart

use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::header::Header;
use crate::mmap::{ByteSource, SourceKind};
use crate::record::PointRecord;
use pointvis_core::{Error, Result};

/// Options applied when a stream is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Map large files into memory instead of buffered reads
    pub use_mmap: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            use_mmap: cfg!(feature = "io-mmap"),
        }
    }
}

impl ReadOptions {
    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }
}

#[derive(Debug)]
struct OpenStream {
    path: PathBuf,
    source: ByteSource,
    header: Header,
    next_index: u64,
    record: Vec<u8>,
}

/// Sequential reader over the point records of one file.
///
/// At most one file is open at a time; opening another closes the first.
#[derive(Debug, Default)]
pub struct PointStreamReader {
    options: ReadOptions,
    stream: Option<OpenStream>,
}

/// Fill `buf` completely. `Ok(false)` when the stream ended before the first byte.
fn read_record<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "point record cut short",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

impl PointStreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ReadOptions) -> Self {
        Self {
            options,
            stream: None,
        }
    }

    pub fn options(&self) -> ReadOptions {
        self.options
    }

    /// Change read options. Takes effect on the next [`open`](Self::open).
    pub fn set_options(&mut self, options: ReadOptions) {
        self.options = options;
    }

    /// Open `path`, read and validate its header, and position at the first point.
    ///
    /// Any previously open file is closed first, even if this open fails.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<&Header> {
        self.close();
        let path = path.as_ref();

        let mut source =
            ByteSource::open(path, self.options.use_mmap).map_err(|e| Error::SourceOpenFailure {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let header = Header::read_from(&mut source)?;
        source.seek(SeekFrom::Start(u64::from(header.offset_to_point_data)))?;

        info!(
            "Opened {} (LAS {}, format {}, {} points, {:?})",
            path.display(),
            header.version_string(),
            header.point_data_format_id,
            header.num_point_records,
            source.kind()
        );

        let record = vec![0u8; usize::from(header.point_data_record_length)];
        let stream = self.stream.insert(OpenStream {
            path: path.to_path_buf(),
            source,
            header,
            next_index: 0,
            record,
        });
        Ok(&stream.header)
    }

    /// Release the open file, if any
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Closed {}", stream.path.display());
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn header(&self) -> Option<&Header> {
        self.stream.as_ref().map(|s| &s.header)
    }

    pub fn path(&self) -> Option<&Path> {
        self.stream.as_ref().map(|s| s.path.as_path())
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.stream.as_ref().map(|s| s.source.kind())
    }

    /// Index of the next record [`read_next`](Self::read_next) will produce
    pub fn position(&self) -> u64 {
        self.stream.as_ref().map_or(0, |s| s.next_index)
    }

    fn stream_mut(&mut self) -> Result<&mut OpenStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::InvalidAccess("no open point stream".into()))
    }

    /// Rewind to the first point record
    pub fn reset_iteration(&mut self) -> Result<()> {
        let stream = self.stream_mut()?;
        stream
            .source
            .seek(SeekFrom::Start(u64::from(stream.header.offset_to_point_data)))?;
        stream.next_index = 0;
        Ok(())
    }

    /// Read the next record into `out`.
    ///
    /// Returns `Ok(false)` once the header's point count has been produced or
    /// the file ends on a record boundary. A record cut short is an error.
    pub fn read_next(&mut self, out: &mut PointRecord) -> Result<bool> {
        let stream = self.stream_mut()?;
        if stream.next_index >= stream.header.num_point_records {
            return Ok(false);
        }
        if !read_record(&mut stream.source, &mut stream.record)? {
            debug!(
                "{} ended after {} of {} points",
                stream.path.display(),
                stream.next_index,
                stream.header.num_point_records
            );
            return Ok(false);
        }
        *out = PointRecord::decode(&stream.record)
            .ok_or_else(|| Error::SourceFormatUnsupported("record shorter than core fields".into()))?;
        stream.next_index += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_record_boundaries() {
        let mut buf = [0u8; 4];
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(!read_record(&mut empty, &mut buf).unwrap());

        let mut full = Cursor::new(vec![1u8, 2, 3, 4]);
        assert!(read_record(&mut full, &mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3, 4]);

        let mut partial = Cursor::new(vec![1u8, 2]);
        let err = read_record(&mut partial, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_closed_reader() {
        let mut reader = PointStreamReader::new();
        let mut p = PointRecord::default();
        assert!(!reader.is_open());
        assert!(reader.header().is_none());
        assert!(matches!(reader.read_next(&mut p), Err(Error::InvalidAccess(_))));
        assert!(reader.reset_iteration().is_err());
    }

    #[test]
    fn test_missing_file() {
        let mut reader = PointStreamReader::new();
        let err = reader.open("/definitely/not/here.las").unwrap_err();
        assert!(matches!(err, Error::SourceOpenFailure { .. }));
        assert!(!reader.is_open());
    }
}
