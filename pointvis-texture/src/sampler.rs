//! Sampling driver: turns a texture plus mesh into point samples
//!
//! Sample counts are computed per face in a prepass, the destination buffer
//! is sized once, and faces are filled into disjoint slices of it. When the
//! filter allows concurrent evaluation the faces are fanned out over a rayon
//! pool; the buffer is finalized once all faces are done.

use log::{debug, info};
use nalgebra::Vector3;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::filter::TextureFilter;
use crate::parallel::SamplingConfig;
use crate::texture::{FaceResolution, MeshType, ProceduralTexture};
use pointvis_core::{
    BufferBackend, Error, FloatColorSample, Point3f, PositionSample, Result, TriangleMesh,
};

/// Maximum channels a texture may carry
pub const MAX_CHANNELS: usize = 4;

/// Grid step of the texel tile layout at multiplier 1
pub const TILE_STEP: f32 = 0.01;

/// How sample positions are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    /// Planar grid of raw texels, ignoring the mesh
    TexelTile,
    /// Linear walk over the face's parametric space
    FaceRelative,
    /// Texel centres of the authored resolution
    #[default]
    FaceAbsolute,
}

impl SampleMode {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(SampleMode::TexelTile),
            1 => Some(SampleMode::FaceRelative),
            2 => Some(SampleMode::FaceAbsolute),
            _ => None,
        }
    }

    /// Multiplier actually used; the tile layout never upsamples
    pub fn effective_multiplier(self, multiplier: f32) -> f32 {
        match self {
            SampleMode::TexelTile => multiplier.min(1.0),
            _ => multiplier,
        }
    }
}

fn scaled(res: u32, multiplier: f32) -> usize {
    (res as f32 * multiplier).max(0.0) as usize
}

/// Samples produced by the face-absolute raster of a `ures` x `vres` face
pub fn raster_count(ures: usize, vres: usize) -> usize {
    (0..vres.min(ures)).map(|v| 2 * (ures - v) - 1).sum()
}

/// Samples one face yields under `mode`
pub fn face_sample_count(res: FaceResolution, mode: SampleMode, multiplier: f32) -> usize {
    let m = mode.effective_multiplier(multiplier);
    let (ures, vres) = (scaled(res.u, m), scaled(res.v, m));
    match mode {
        SampleMode::FaceAbsolute => raster_count(ures, vres),
        _ => ures * vres,
    }
}

/// Per-face start offsets and the total, in face order
pub fn sample_offsets(
    texture: &dyn ProceduralTexture,
    mode: SampleMode,
    multiplier: f32,
) -> (Vec<usize>, usize) {
    let mut offsets = Vec::with_capacity(texture.num_faces());
    let mut total = 0;
    for face in 0..texture.num_faces() {
        offsets.push(total);
        total += face_sample_count(texture.face_resolution(face), mode, multiplier);
    }
    (offsets, total)
}

/// Recover `(u, v)` of `p` in the basis spanned by `b - a` and `c - a`
pub fn uv_from_pos(a: &Point3f, b: &Point3f, c: &Point3f, p: &Point3f) -> (f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let dot00 = v0.dot(&v0);
    let dot01 = v0.dot(&v1);
    let dot02 = v0.dot(&v2);
    let dot11 = v1.dot(&v1);
    let dot12 = v1.dot(&v2);

    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() <= f32::EPSILON {
        return (0.0, 0.0);
    }
    let inv = 1.0 / denom;
    (
        (dot11 * dot02 - dot01 * dot12) * inv,
        (dot00 * dot12 - dot01 * dot02) * inv,
    )
}

struct FaceJob<'a> {
    face: usize,
    ures: usize,
    vres: usize,
    triangle: [Point3f; 3],
    positions: &'a mut [PositionSample],
    colors: &'a mut [FloatColorSample],
}

struct FaceSampler<'a> {
    filter: &'a dyn TextureFilter,
    channels: usize,
    mode: SampleMode,
}

impl FaceSampler<'_> {
    fn emit(&self, job: &mut FaceJob<'_>, k: &mut usize, p: Point3f, u: f32, v: f32) {
        let mut pix = [0.0f32; MAX_CHANNELS];
        self.filter.eval(&mut pix[..self.channels], job.face, u, v);
        job.positions[*k] = PositionSample::from(p);
        job.colors[*k] = FloatColorSample::from_channels(&pix[..self.channels]);
        *k += 1;
    }

    fn run(&self, mut job: FaceJob<'_>) {
        let [a, b, c] = job.triangle;
        let (ures, vres) = (job.ures, job.vres);
        let mut k = 0;
        match self.mode {
            SampleMode::FaceRelative => {
                for u in 0..ures {
                    let uf = u as f32 / ures as f32;
                    let uvec = (b - a) * uf;
                    for v in 0..vres {
                        let vf = (1.0 - uf) * (v as f32 / vres as f32);
                        let p = a + uvec + (c - a) * vf;
                        self.emit(&mut job, &mut k, p, uf, vf);
                    }
                }
            }
            SampleMode::FaceAbsolute => {
                let suv: Vector3<f32> = (b - a) / ures as f32;
                let svv: Vector3<f32> = (c - a) / vres as f32;
                for v in 0..vres.min(ures) {
                    let cells = ures - v;
                    let mut ta = a + svv * v as f32;
                    for u in 0..cells {
                        let tb = ta + suv;
                        let tc = ta + svv;
                        let even = Point3f::from((ta.coords + tb.coords + tc.coords) / 3.0);
                        let (uf, vf) = uv_from_pos(&a, &b, &c, &even);
                        self.emit(&mut job, &mut k, even, uf, vf);
                        if u + 1 < cells {
                            let td = ta + suv + svv;
                            let odd = Point3f::from((tb.coords + tc.coords + td.coords) / 3.0);
                            let (uf, vf) = uv_from_pos(&a, &b, &c, &odd);
                            self.emit(&mut job, &mut k, odd, uf, vf);
                        }
                        ta += suv;
                    }
                }
            }
            SampleMode::TexelTile => {}
        }
        debug_assert_eq!(k, job.positions.len());
    }
}

/// Produces point samples from a procedural texture
pub struct SampleSource {
    config: SamplingConfig,
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for SampleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSource")
            .field("config", &self.config)
            .field("dedicated_pool", &self.pool.is_some())
            .finish()
    }
}

impl Default for SampleSource {
    fn default() -> Self {
        Self {
            config: SamplingConfig::default(),
            pool: None,
        }
    }
}

impl SampleSource {
    /// Sampling with the given parallelism; a thread count builds a dedicated pool
    pub fn with_config(config: SamplingConfig) -> Result<Self> {
        let pool = match config.num_threads {
            Some(_) if config.enabled => Some(config.build_pool()?),
            _ => None,
        };
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Check inputs without touching any buffer. Returns the triangles to sample on.
    pub fn validate(
        texture: &dyn ProceduralTexture,
        mesh: Option<&TriangleMesh>,
        mode: SampleMode,
    ) -> Result<Vec<[Point3f; 3]>> {
        let channels = texture.num_channels();
        if channels > MAX_CHANNELS {
            return Err(Error::UnsupportedChannelCount(channels));
        }
        if texture.num_faces() == 0 {
            return Err(Error::SourceFormatUnsupported(
                "texture has zero faces - it is empty or corrupt".into(),
            ));
        }
        if mode == SampleMode::TexelTile {
            return Ok(Vec::new());
        }
        if texture.mesh_type() != MeshType::Triangle {
            return Err(Error::UnsupportedMeshTopology(
                "cannot visualize non-triangle meshes".into(),
            ));
        }
        let mesh = mesh.ok_or(Error::MissingMesh)?;
        if mesh.face_count() != texture.num_faces() {
            return Err(Error::GeometryMismatch {
                mesh_faces: mesh.face_count(),
                texture_faces: texture.num_faces(),
            });
        }
        mesh.validate()?;
        (0..mesh.face_count())
            .map(|i| {
                mesh.triangle(i).ok_or_else(|| {
                    Error::UnsupportedMeshTopology(format!("face {i} is not a triangle"))
                })
            })
            .collect()
    }

    /// Fill `buffer` with samples of `texture`.
    ///
    /// All validation happens before the buffer is resized, so a rejected
    /// input leaves the previous contents in place. Returns the sample count.
    pub fn sample<B>(
        &self,
        texture: &dyn ProceduralTexture,
        filter: &dyn TextureFilter,
        mesh: Option<&TriangleMesh>,
        mode: SampleMode,
        multiplier: f32,
        buffer: &mut B,
    ) -> Result<usize>
    where
        B: BufferBackend<PositionSample, FloatColorSample> + ?Sized,
    {
        let triangles = Self::validate(texture, mesh, mode)?;
        let multiplier = mode.effective_multiplier(multiplier);
        let (offsets, total) = sample_offsets(texture, mode, multiplier);

        buffer.resize(total)?;
        if total == 0 {
            return Ok(0);
        }
        buffer.begin_access()?;
        let parallel = {
            let channels = buffer.channels_mut()?;
            let colors = channels
                .colors
                .ok_or_else(|| Error::InvalidAccess("colour channel missing".into()))?;
            match mode {
                SampleMode::TexelTile => {
                    Self::fill_tiles(texture, multiplier, channels.positions, colors);
                    false
                }
                _ => self.fill_faces(
                    texture,
                    filter,
                    &triangles,
                    &offsets,
                    total,
                    mode,
                    multiplier,
                    channels.positions,
                    colors,
                ),
            }
        };
        buffer.end_access()?;

        info!(
            "Sampled {} points from {} faces ({:?}, {})",
            total,
            texture.num_faces(),
            mode,
            if parallel { "parallel" } else { "serial" }
        );
        Ok(total)
    }

    fn fill_tiles(
        texture: &dyn ProceduralTexture,
        multiplier: f32,
        positions: &mut [PositionSample],
        colors: &mut [FloatColorSample],
    ) {
        let channels = texture.num_channels();
        let inv = 1.0 / multiplier;
        let step = TILE_STEP * inv;
        let mut pix = [0.0f32; MAX_CHANNELS];
        let mut k = 0;
        let mut x = 0.0f32;
        for face in 0..texture.num_faces() {
            let res = texture.face_resolution(face);
            let (ures, vres) = (scaled(res.u, multiplier), scaled(res.v, multiplier));
            for u in 0..ures {
                let mut y = 0.0f32;
                for v in 0..vres {
                    texture.texel(
                        face,
                        (u as f32 * inv) as u32,
                        (v as f32 * inv) as u32,
                        &mut pix[..channels],
                    );
                    positions[k] = PositionSample::new(x, y, 0.0);
                    colors[k] = FloatColorSample::from_channels(&pix[..channels]);
                    k += 1;
                    y += step;
                }
                x += step;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_faces(
        &self,
        texture: &dyn ProceduralTexture,
        filter: &dyn TextureFilter,
        triangles: &[[Point3f; 3]],
        offsets: &[usize],
        total: usize,
        mode: SampleMode,
        multiplier: f32,
        positions: &mut [PositionSample],
        colors: &mut [FloatColorSample],
    ) -> bool {
        let mut jobs = Vec::with_capacity(offsets.len());
        let mut pos_rest = positions;
        let mut col_rest = colors;
        for (face, &start) in offsets.iter().enumerate() {
            let end = offsets.get(face + 1).copied().unwrap_or(total);
            let (p, pr) = std::mem::take(&mut pos_rest).split_at_mut(end - start);
            let (c, cr) = std::mem::take(&mut col_rest).split_at_mut(end - start);
            pos_rest = pr;
            col_rest = cr;
            let res = texture.face_resolution(face);
            jobs.push(FaceJob {
                face,
                ures: scaled(res.u, multiplier),
                vres: scaled(res.v, multiplier),
                triangle: triangles[face],
                positions: p,
                colors: c,
            });
        }

        let sampler = FaceSampler {
            filter,
            channels: texture.num_channels(),
            mode,
        };
        let parallel = self.config.enabled && filter.is_thread_safe() && jobs.len() > 1;
        if parallel {
            let run = || jobs.into_par_iter().for_each(|job| sampler.run(job));
            match &self.pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        } else {
            debug!("Sampling serially ({:?} filter)", filter.options().filter);
            jobs.into_iter().for_each(|job| sampler.run(job));
        }
        parallel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{create_filter, FilterOptions};
    use crate::texture::MemoryTexture;
    use approx::assert_relative_eq;
    use pointvis_core::SystemBuffer;
    use std::sync::Arc;

    #[test]
    fn test_raster_count_square_faces() {
        for n in 0..12 {
            assert_eq!(raster_count(n, n), n * n);
        }
        // each row loses a cell
        assert_eq!(raster_count(4, 2), 7 + 5);
        assert_eq!(raster_count(2, 4), 3 + 1);
    }

    #[test]
    fn test_density_scaling() {
        let res = FaceResolution::new(8, 8);
        for m in [0.1f32, 0.5, 0.75, 1.0, 1.3, 2.0] {
            let n = (8.0 * m).floor() as usize;
            for mode in [SampleMode::FaceRelative, SampleMode::FaceAbsolute] {
                assert_eq!(face_sample_count(res, mode, m), n * n, "{mode:?} {m}");
            }
        }
        assert_eq!(face_sample_count(res, SampleMode::TexelTile, 2.0), 64);
    }

    #[test]
    fn test_uv_from_pos_recovers_basis() {
        let a = Point3f::new(1.0, 0.0, 0.0);
        let b = Point3f::new(3.0, 0.0, 0.0);
        let c = Point3f::new(1.0, 4.0, 0.0);
        let p = a + (b - a) * 0.25 + (c - a) * 0.5;
        let (u, v) = uv_from_pos(&a, &b, &c, &p);
        assert_relative_eq!(u, 0.25, epsilon = 1e-6);
        assert_relative_eq!(v, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_absolute_samples_are_inside_the_face() {
        let tex = MemoryTexture::from_fn(1, &[FaceResolution::new(5, 5)], |_, u, v, c| {
            c[0] = (u + v) as f32;
        });
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        let filter = create_filter(Arc::new(tex.clone()), FilterOptions::default());
        let mut buf = SystemBuffer::new();
        let n = SampleSource::default()
            .sample(&tex, filter.as_ref(), Some(&mesh), SampleMode::FaceAbsolute, 1.0, &mut buf)
            .unwrap();
        assert_eq!(n, 25);
        for p in buf.positions() {
            let [x, y, z] = p.xyz;
            assert!(x > 0.0 && y > 0.0 && x + y < 1.0);
            assert_eq!(z, 0.0);
        }
        // first sample is the centroid of the corner cell
        assert_relative_eq!(buf.positions()[0].xyz[0], 0.2 / 3.0, epsilon = 1e-6);
    }
}
