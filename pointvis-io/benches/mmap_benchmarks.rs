//! Benchmarks comparing memory-mapped vs buffered point streaming
//!
//! Each iteration restarts the stream and decodes every record, the access
//! pattern of an uncached draw.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pointvis_io::{PointFormat, PointRecord, PointStreamReader, ReadOptions, SyntheticCloud};
use tempfile::NamedTempFile;

/// Write a synthetic cloud of `num_points` format 1 records
fn create_las_file(num_points: usize) -> NamedTempFile {
    let mut cloud = SyntheticCloud::new().with_format(PointFormat::Format1);
    for i in 0..num_points {
        let t = i as f32 * 0.1;
        cloud.push(
            (t.sin() * 10_000.0) as i32,
            (t.cos() * 10_000.0) as i32,
            i as i32,
            (i % 4096) as u16,
            (i % 3 + 1) as u8,
            3,
        );
    }
    let temp_file = NamedTempFile::new().expect("Failed to create temporary file");
    cloud
        .write_file(temp_file.path())
        .expect("Failed to write LAS file");
    temp_file
}

fn stream_all(reader: &mut PointStreamReader) -> u64 {
    reader.reset_iteration().expect("Failed to restart stream");
    let mut record = PointRecord::default();
    let mut sum = 0u64;
    while reader.read_next(&mut record).expect("Failed to read record") {
        sum += u64::from(record.intensity);
    }
    sum
}

fn benchmark_stream_reading(c: &mut Criterion) {
    let sizes = vec![1000, 10000, 100000, 500000];

    let mut group = c.benchmark_group("las_streaming");

    for size in sizes {
        let temp_file = create_las_file(size);
        let file_size = std::fs::metadata(temp_file.path())
            .expect("Failed to get file metadata")
            .len();

        group.throughput(Throughput::Bytes(file_size));

        #[cfg(feature = "io-mmap")]
        {
            let mut reader = PointStreamReader::with_options(ReadOptions::default().with_mmap(true));
            reader.open(temp_file.path()).expect("Failed to open LAS file");
            group.bench_with_input(BenchmarkId::new("mmap_enabled", size), &size, |b, _| {
                b.iter(|| black_box(stream_all(&mut reader)));
            });
        }

        let mut reader = PointStreamReader::with_options(ReadOptions::default().with_mmap(false));
        reader.open(temp_file.path()).expect("Failed to open LAS file");
        group.bench_with_input(BenchmarkId::new("buffered_io", size), &size, |b, _| {
            b.iter(|| black_box(stream_all(&mut reader)));
        });
    }

    group.finish();
}

/// Benchmark opening, which parses and validates the header
fn benchmark_open(c: &mut Criterion) {
    let temp_file = create_las_file(100_000);
    c.bench_function("las_open", |b| {
        b.iter(|| {
            let mut reader = PointStreamReader::new();
            let header = reader.open(temp_file.path()).expect("Failed to open LAS file");
            black_box(header.num_point_records);
        });
    });
}

criterion_group!(benches, benchmark_stream_reading, benchmark_open);
criterion_main!(benches);
