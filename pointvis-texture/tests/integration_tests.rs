//! Integration tests for pointvis-texture
//!
//! These tests drive the sampler end to end against host and device buffers.

use std::sync::Arc;

use approx::assert_relative_eq;
use pointvis_core::{
    BufferBackend, CachedBuffer, DeviceMemory, Error, FloatColorSample, HeadlessDevice, Point3f,
    PositionSample, SystemBuffer, TriangleMesh,
};
use pointvis_texture::*;

/// A strip of `n` right triangles along +x
fn strip(n: usize) -> TriangleMesh {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    for i in 0..n {
        let x = i as f32;
        let base = vertices.len();
        vertices.push(Point3f::new(x, 0.0, 0.0));
        vertices.push(Point3f::new(x + 1.0, 0.0, 0.0));
        vertices.push(Point3f::new(x, 1.0, 0.0));
        faces.push([base, base + 1, base + 2]);
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

/// Each face filled with its own index in channel 0
fn indexed_texture(faces: usize, res: u32, channels: usize) -> MemoryTexture {
    MemoryTexture::from_fn(channels, &vec![FaceResolution::new(res, res); faces], |f, u, v, c| {
        c.fill(0.0);
        c[0] = f as f32;
        if c.len() > 1 {
            c[1] = (u + v) as f32;
        }
    })
}

fn point_filter(tex: &MemoryTexture) -> Arc<dyn TextureFilter> {
    create_filter(Arc::new(tex.clone()), FilterOptions::default())
}

type Buf = SystemBuffer<PositionSample, FloatColorSample>;

#[test]
fn test_face_count_mismatch_keeps_previous_samples() {
    let tex = indexed_texture(9, 4, 1);
    let filter = point_filter(&tex);
    let source = SampleSource::default();
    let mut buf = Buf::new();
    let n = source
        .sample(&tex, filter.as_ref(), Some(&strip(9)), SampleMode::FaceRelative, 1.0, &mut buf)
        .unwrap();
    assert_eq!(n, 9 * 16);
    let before = buf.positions().to_vec();

    let tex10 = indexed_texture(10, 4, 1);
    let filter10 = point_filter(&tex10);
    let err = source
        .sample(&tex10, filter10.as_ref(), Some(&strip(9)), SampleMode::FaceRelative, 1.0, &mut buf)
        .unwrap_err();
    match err {
        Error::GeometryMismatch {
            mesh_faces,
            texture_faces,
        } => {
            assert_eq!(mesh_faces, 9);
            assert_eq!(texture_faces, 10);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(buf.size(), 9 * 16);
    assert_eq!(buf.positions(), before.as_slice());
}

#[test]
fn test_too_many_channels_is_rejected() {
    let tex = indexed_texture(2, 4, 5);
    let filter = point_filter(&tex);
    let mut buf = Buf::new();
    let err = SampleSource::default()
        .sample(&tex, filter.as_ref(), Some(&strip(2)), SampleMode::FaceAbsolute, 1.0, &mut buf)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedChannelCount(5)));
    assert_eq!(buf.size(), 0);
}

#[test]
fn test_mesh_requirements() {
    let tex = indexed_texture(2, 4, 3);
    let filter = point_filter(&tex);
    let source = SampleSource::default();
    let mut buf = Buf::new();

    let err = source
        .sample(&tex, filter.as_ref(), None, SampleMode::FaceAbsolute, 1.0, &mut buf)
        .unwrap_err();
    assert!(matches!(err, Error::MissingMesh));

    let quads = tex.clone().with_mesh_type(MeshType::Quad);
    let err = source
        .sample(&quads, filter.as_ref(), Some(&strip(2)), SampleMode::FaceRelative, 1.0, &mut buf)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedMeshTopology(_)));

    // the tile layout needs neither a mesh nor triangle topology
    let n = source
        .sample(&quads, filter.as_ref(), None, SampleMode::TexelTile, 1.0, &mut buf)
        .unwrap();
    assert_eq!(n, 32);
}

#[test]
fn test_empty_texture_is_rejected() {
    let tex = MemoryTexture::new(1, MeshType::Triangle);
    let filter = point_filter(&tex);
    let mut buf = Buf::new();
    let err = SampleSource::default()
        .sample(&tex, filter.as_ref(), None, SampleMode::TexelTile, 1.0, &mut buf)
        .unwrap_err();
    assert!(matches!(err, Error::SourceFormatUnsupported(_)));
}

#[test]
fn test_texel_tile_layout() {
    let tex = indexed_texture(2, 4, 2);
    let filter = point_filter(&tex);
    let mut buf = Buf::new();
    // multiplier is clamped to 1 for tiles
    let n = SampleSource::default()
        .sample(&tex, filter.as_ref(), None, SampleMode::TexelTile, 3.0, &mut buf)
        .unwrap();
    assert_eq!(n, 32);

    let pos = buf.positions();
    let col = buf.colors().unwrap();
    // v advances along y within a column
    assert_relative_eq!(pos[1].xyz[1], 0.01, epsilon = 1e-6);
    assert_relative_eq!(pos[1].xyz[0], 0.0);
    // u advances x, and x keeps going across faces
    assert_relative_eq!(pos[4].xyz[0], 0.01, epsilon = 1e-6);
    assert_relative_eq!(pos[16].xyz[0], 0.04, epsilon = 1e-6);
    assert_relative_eq!(pos[16].xyz[1], 0.0);
    assert_eq!(col[16].rgb[0], 1.0);
    // channel 1 holds u + v, blue stays zero for two channels
    assert_eq!(col[5].rgb, [0.0, 2.0, 0.0]);
}

#[test]
fn test_half_density_tiles() {
    let tex = indexed_texture(1, 8, 1);
    let filter = point_filter(&tex);
    let mut buf = Buf::new();
    let n = SampleSource::default()
        .sample(&tex, filter.as_ref(), None, SampleMode::TexelTile, 0.5, &mut buf)
        .unwrap();
    assert_eq!(n, 16);
    assert_relative_eq!(buf.positions()[1].xyz[1], 0.02, epsilon = 1e-6);
}

#[test]
fn test_face_relative_positions() {
    let tex = indexed_texture(3, 4, 1);
    let filter = point_filter(&tex);
    let mut buf = Buf::new();
    let n = SampleSource::default()
        .sample(&tex, filter.as_ref(), Some(&strip(3)), SampleMode::FaceRelative, 1.0, &mut buf)
        .unwrap();
    assert_eq!(n, 48);

    let pos = buf.positions();
    let col = buf.colors().unwrap();
    // face 1 starts at its first vertex
    assert_eq!(pos[16].xyz, [1.0, 0.0, 0.0]);
    assert_eq!(col[16].rgb, [1.0; 3]);
    // u = 0.5, v index 2 -> vf = 0.5 * 0.5
    assert_relative_eq!(pos[2 * 4 + 2].xyz[0], 0.5, epsilon = 1e-6);
    assert_relative_eq!(pos[2 * 4 + 2].xyz[1], 0.25, epsilon = 1e-6);
}

#[test]
fn test_density_multiplier_per_face() {
    let tex = indexed_texture(4, 8, 1);
    let filter = point_filter(&tex);
    let source = SampleSource::default();
    for m in [0.25f32, 0.5, 1.0, 1.5] {
        let per_face = (8.0 * m).floor() as usize;
        for mode in [SampleMode::FaceRelative, SampleMode::FaceAbsolute] {
            let mut buf = Buf::new();
            let n = source
                .sample(&tex, filter.as_ref(), Some(&strip(4)), mode, m, &mut buf)
                .unwrap();
            assert_eq!(n, 4 * per_face * per_face);
            assert_eq!(buf.size(), n);
        }
    }
}

#[test]
fn test_non_square_faces_count_raster_exactly() {
    let tex = MemoryTexture::from_fn(
        1,
        &[FaceResolution::new(6, 3), FaceResolution::new(2, 5)],
        |_, _, _, c| c[0] = 1.0,
    );
    let filter = point_filter(&tex);
    let mut buf = Buf::new();
    let n = SampleSource::default()
        .sample(&tex, filter.as_ref(), Some(&strip(2)), SampleMode::FaceAbsolute, 1.0, &mut buf)
        .unwrap();
    assert_eq!(n, raster_count(6, 3) + raster_count(2, 5));
    assert_eq!(n, (11 + 9 + 7) + (3 + 1));
}

#[test]
fn test_parallel_matches_serial() {
    let tex = indexed_texture(16, 8, 3);
    let filter = point_filter(&tex);
    let mesh = strip(16);

    let mut serial = Buf::new();
    SampleSource::with_config(SamplingConfig::serial())
        .unwrap()
        .sample(&tex, filter.as_ref(), Some(&mesh), SampleMode::FaceAbsolute, 1.0, &mut serial)
        .unwrap();

    let mut parallel = Buf::new();
    SampleSource::with_config(SamplingConfig::default().with_threads(4))
        .unwrap()
        .sample(&tex, filter.as_ref(), Some(&mesh), SampleMode::FaceAbsolute, 1.0, &mut parallel)
        .unwrap();

    assert_eq!(serial.positions(), parallel.positions());
    assert_eq!(serial.colors(), parallel.colors());
}

#[test]
fn test_higher_order_filters_sample_serially() {
    let tex = indexed_texture(4, 8, 1);
    let filter = create_filter(
        Arc::new(tex.clone()),
        FilterOptions::new(FilterType::from_index(7), 0.05),
    );
    assert!(!filter.is_thread_safe());
    let mut buf = Buf::new();
    let n = SampleSource::default()
        .sample(&tex, filter.as_ref(), Some(&strip(4)), SampleMode::FaceAbsolute, 1.0, &mut buf)
        .unwrap();
    assert_eq!(n, 4 * 64);
    // constant per face, so any normalized kernel reproduces the face index
    assert_relative_eq!(buf.colors().unwrap()[3 * 64].rgb[0], 3.0, epsilon = 1e-4);
}

#[test]
fn test_device_buffer_receives_samples() {
    let device = Arc::new(HeadlessDevice::new());
    let memory: Arc<dyn DeviceMemory> = device.clone();
    let mut buf: CachedBuffer<PositionSample, FloatColorSample> = CachedBuffer::device(memory);

    let tex = indexed_texture(2, 4, 1);
    let filter = point_filter(&tex);
    let n = SampleSource::default()
        .sample(&tex, filter.as_ref(), Some(&strip(2)), SampleMode::FaceAbsolute, 1.0, &mut buf)
        .unwrap();
    assert_eq!(n, 32);
    assert!(buf.is_valid());
    assert_eq!(device.live_allocations(), 2);
}
