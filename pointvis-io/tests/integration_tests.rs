//! Integration tests for pointvis-io
//!
//! Synthetic files are written to temporary directories and streamed back.

use approx::assert_relative_eq;
use pointvis_core::Error;
use pointvis_io::*;
use std::io::Write;
use tempfile::TempDir;

fn sample_cloud() -> SyntheticCloud {
    SyntheticCloud::new()
        .with_creation(123, 2019)
        .with_scale_offset([0.01, 0.01, 0.001], [1000.0, 2000.0, 0.0])
        .with_point(0, 0, 0, 10, 1, 1)
        .with_point(100, 200, 3000, 500, 1, 2)
        .with_point(-50, 400, 1500, 65535, 2, 2)
}

fn write(dir: &TempDir, name: &str, cloud: &SyntheticCloud) -> std::path::PathBuf {
    let path = dir.path().join(name);
    cloud.write_file(&path).unwrap();
    path
}

fn read_all(reader: &mut PointStreamReader) -> Vec<PointRecord> {
    let mut out = Vec::new();
    let mut p = PointRecord::default();
    while reader.read_next(&mut p).unwrap() {
        out.push(p);
    }
    out
}

#[test]
fn test_header_fields_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "a.las", &sample_cloud());

    let mut reader = PointStreamReader::new();
    let header = reader.open(&path).unwrap().clone();

    assert_eq!(header.version_string(), "1.2");
    assert_eq!(header.creation_date(), "123/2019");
    assert_eq!(header.point_data_format_id, 0);
    assert_eq!(header.point_data_record_length, 20);
    assert_eq!(header.num_point_records, 3);
    assert_eq!(header.num_points_by_return[..2], [2, 1]);
    assert_eq!(header.system_identifier, "pointvis");

    let bounds = header.bounds();
    assert_relative_eq!(bounds.min.x, 999.5);
    assert_relative_eq!(bounds.max.y, 2004.0);
    assert_relative_eq!(bounds.max.z, 3.0);
}

#[test]
fn test_records_and_world_positions() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "a.las", &sample_cloud());
    let mut reader = PointStreamReader::new();
    reader.open(&path).unwrap();

    let points = read_all(&mut reader);
    assert_eq!(points.len(), 3);
    assert_eq!(points[2].intensity, 65535);
    assert_eq!(points[2].return_number(), 2);
    assert_eq!(points[1].num_returns(), 2);

    let header = reader.header().unwrap();
    let world = points[1].world_position(header);
    assert_relative_eq!(world.x, 1001.0);
    assert_relative_eq!(world.y, 2002.0);
    assert_relative_eq!(world.z, 3.0);
}

#[test]
fn test_restart_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "a.las", &sample_cloud());
    let mut reader = PointStreamReader::new();
    reader.open(&path).unwrap();

    let first = read_all(&mut reader);
    let mut p = PointRecord::default();
    assert!(!reader.read_next(&mut p).unwrap());

    reader.reset_iteration().unwrap();
    assert_eq!(reader.position(), 0);
    let second = read_all(&mut reader);
    assert_eq!(first, second);
}

#[test]
fn test_every_supported_format_streams() {
    let dir = TempDir::new().unwrap();
    for format in [
        PointFormat::Format0,
        PointFormat::Format1,
        PointFormat::Format2,
        PointFormat::Format3,
    ] {
        let cloud = sample_cloud().with_format(format);
        let path = write(&dir, &format!("f{}.las", format.id()), &cloud);
        let mut reader = PointStreamReader::new();
        let header = reader.open(&path).unwrap();
        assert_eq!(header.point_data_record_length, format.min_record_length());
        assert_eq!(read_all(&mut reader), cloud.points);
    }
}

#[test]
fn test_padded_records_are_skipped_over() {
    let dir = TempDir::new().unwrap();
    let cloud = sample_cloud().with_record_length(40);
    let path = write(&dir, "padded.las", &cloud);
    let mut reader = PointStreamReader::new();
    reader.open(&path).unwrap();
    assert_eq!(read_all(&mut reader), cloud.points);
}

#[test]
fn test_unsupported_version_and_format() {
    let dir = TempDir::new().unwrap();
    let mut reader = PointStreamReader::new();

    let path = write(&dir, "v2.las", &sample_cloud().with_version(2, 0));
    assert!(matches!(reader.open(&path), Err(Error::SourceFormatUnsupported(_))));
    assert!(!reader.is_open());

    let mut bytes = Vec::new();
    sample_cloud().write_to(&mut bytes).unwrap();
    bytes[104] = 6; // point data format id
    let path = dir.path().join("f6.las");
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(reader.open(&path), Err(Error::SourceFormatUnsupported(_))));

    let path = write(&dir, "short.las", &sample_cloud().with_record_length(12));
    assert!(matches!(reader.open(&path), Err(Error::SourceFormatUnsupported(_))));
}

#[test]
fn test_not_a_las_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("junk.las");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"PLY not a point file at all").unwrap();
    drop(f);

    let mut reader = PointStreamReader::new();
    assert!(matches!(reader.open(&path), Err(Error::SourceFormatUnsupported(_))));
}

#[test]
fn test_failed_open_closes_previous_stream() {
    let dir = TempDir::new().unwrap();
    let good = write(&dir, "good.las", &sample_cloud());
    let mut reader = PointStreamReader::new();
    reader.open(&good).unwrap();
    assert!(reader.is_open());

    assert!(reader.open(dir.path().join("missing.las")).is_err());
    assert!(!reader.is_open());
    assert!(reader.header().is_none());
}

#[test]
fn test_short_file_ends_iteration_early() {
    let dir = TempDir::new().unwrap();
    let cloud = sample_cloud().with_declared_count(10);
    let path = write(&dir, "short.las", &cloud);

    let mut reader = PointStreamReader::new();
    assert_eq!(reader.open(&path).unwrap().num_point_records, 10);
    assert_eq!(read_all(&mut reader).len(), 3);
}

#[test]
fn test_truncated_record_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut bytes = Vec::new();
    sample_cloud().write_to(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 7);
    let path = dir.path().join("cut.las");
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = PointStreamReader::new();
    reader.open(&path).unwrap();
    let mut p = PointRecord::default();
    assert!(reader.read_next(&mut p).unwrap());
    assert!(reader.read_next(&mut p).unwrap());
    assert!(matches!(reader.read_next(&mut p), Err(Error::Io(_))));
}

#[test]
fn test_mapped_and_buffered_agree() {
    let dir = TempDir::new().unwrap();
    let mut cloud = SyntheticCloud::new();
    for i in 0..5000 {
        cloud.push(i, -i, i * 2, (i % 65536) as u16, (i % 3 + 1) as u8, 3);
    }
    let path = write(&dir, "big.las", &cloud);

    let mut mapped = PointStreamReader::with_options(ReadOptions::default().with_mmap(true));
    mapped.open(&path).unwrap();
    if cfg!(feature = "io-mmap") && is_mmap_supported() {
        assert_eq!(mapped.source_kind(), Some(SourceKind::Mapped));
    }

    let mut buffered = PointStreamReader::with_options(ReadOptions::default().with_mmap(false));
    buffered.open(&path).unwrap();
    assert_eq!(buffered.source_kind(), Some(SourceKind::Buffered));

    assert_eq!(read_all(&mut mapped), read_all(&mut buffered));
}

#[test]
fn test_expected_header_matches_reader() {
    let dir = TempDir::new().unwrap();
    let cloud = sample_cloud();
    let path = write(&dir, "a.las", &cloud);
    let mut reader = PointStreamReader::new();
    assert_eq!(reader.open(&path).unwrap(), &cloud.expected_header().unwrap());
}
