//! Streaming access to LAS point cloud files
//!
//! [`PointStreamReader`] opens one file at a time, exposes its validated
//! [`Header`] and produces [`PointRecord`]s in file order. Iteration can be
//! restarted without reopening. Large files are memory-mapped when the
//! `io-mmap` feature is enabled.

pub mod header;
pub mod mmap;
pub mod record;
pub mod stream;
pub mod synthetic;

pub use header::{Header, PointFormat};
pub use mmap::{is_mmap_supported, ByteSource, SourceKind};
pub use record::PointRecord;
pub use stream::{PointStreamReader, ReadOptions};
pub use synthetic::SyntheticCloud;
