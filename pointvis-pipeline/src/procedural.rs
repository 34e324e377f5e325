//! Procedural texture pipeline: sample a texture over a mesh and draw the samples

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::pipeline::{DrawOutcome, InputEffect, PointPipeline};
use crate::settings::{clamp_filter_size, clamp_multiplier, TextureSettings};
use pointvis_core::{
    BoundingVolume, BufferBackend, BufferMode, CachedBuffer, DeviceMemory, DrawSurface,
    FloatColorSample, Point3d, PositionSample, Result, TriangleMesh,
};
use pointvis_texture::{
    create_filter, sampler::TILE_STEP, BorderMode, DataType, FilterType, JsonTextureLoader,
    MeshType, ProceduralTexture, SampleMode, SampleSource, TextureFilter, TextureLoader,
};

/// Buffer type holding texture samples
pub type SampleBuffer = CachedBuffer<PositionSample, FloatColorSample>;

/// One host attribute change of a [`ProceduralSource`]
#[derive(Clone)]
pub enum TextureInput {
    /// Texture file, read through the source's loader
    Path(Option<PathBuf>),
    /// A texture supplied directly
    Texture(Option<Arc<dyn ProceduralTexture>>),
    Mesh(Option<Arc<TriangleMesh>>),
    Filter(FilterType),
    FilterSize(f32),
    SampleMultiplier(f32),
    Mode(SampleMode),
    Storage(BufferMode),
    PointSize(f32),
}

/// Texture properties exposed to the host; zero without a texture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureMetadata {
    pub num_channels: usize,
    pub num_faces: usize,
    pub alpha_channel: Option<usize>,
    pub has_edits: bool,
    pub has_mip_maps: bool,
    pub metadata_keys: Vec<String>,
    pub mesh_type: Option<MeshType>,
    pub data_type: Option<DataType>,
    pub u_border_mode: Option<BorderMode>,
    pub v_border_mode: Option<BorderMode>,
    /// Samples produced by the last recompute
    pub num_samples: usize,
}

/// A texture and the filter built for it, replaced as one unit
struct TextureBinding {
    texture: Arc<dyn ProceduralTexture>,
    filter: Arc<dyn TextureFilter>,
}

/// Samples of a procedural texture, always drawn from a cache
pub struct ProceduralSource {
    settings: TextureSettings,
    loader: Arc<dyn TextureLoader>,
    path: Option<PathBuf>,
    binding: Option<TextureBinding>,
    mesh: Option<Arc<TriangleMesh>>,
    sampler: SampleSource,
    cache: SampleBuffer,
    device: Option<Arc<dyn DeviceMemory>>,
    num_samples: usize,
    bounds: BoundingVolume,
}

impl std::fmt::Debug for ProceduralSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProceduralSource")
            .field("settings", &self.settings)
            .field("path", &self.path)
            .field("has_texture", &self.binding.is_some())
            .field("has_mesh", &self.mesh.is_some())
            .field("cache", &self.cache)
            .field("num_samples", &self.num_samples)
            .finish()
    }
}

impl ProceduralSource {
    pub fn new(settings: TextureSettings) -> Result<Self> {
        let settings = settings.sanitized();
        let sampler = SampleSource::with_config(settings.sampling.clone())?;
        Ok(Self {
            settings,
            loader: Arc::new(JsonTextureLoader),
            path: None,
            binding: None,
            mesh: None,
            sampler,
            cache: SampleBuffer::system(),
            device: None,
            num_samples: 0,
            bounds: BoundingVolume::empty(),
        })
    }

    pub fn with_loader(mut self, loader: Arc<dyn TextureLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_device(mut self, device: Arc<dyn DeviceMemory>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_texture(mut self, texture: Arc<dyn ProceduralTexture>) -> Self {
        self.bind(Some(texture));
        self
    }

    pub fn with_mesh(mut self, mesh: Arc<TriangleMesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn settings(&self) -> &TextureSettings {
        &self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn texture(&self) -> Option<&Arc<dyn ProceduralTexture>> {
        self.binding.as_ref().map(|b| &b.texture)
    }

    pub fn cache(&self) -> &SampleBuffer {
        &self.cache
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Replace texture and filter together. The old pair is dropped after the swap.
    fn bind(&mut self, texture: Option<Arc<dyn ProceduralTexture>>) {
        let binding = texture.map(|texture| TextureBinding {
            filter: create_filter(texture.clone(), self.settings.filter_options()),
            texture,
        });
        self.binding = binding;
    }

    fn rebuild_filter(&mut self) {
        let texture = self.binding.as_ref().map(|b| b.texture.clone());
        self.bind(texture);
    }

    fn clear_samples(&mut self) {
        self.release_cache();
        self.bounds = BoundingVolume::empty();
    }

    fn load(&mut self) -> Result<()> {
        self.bind(None);
        self.clear_samples();
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let texture = self.loader.load(&path)?;
        self.bind(Some(texture));
        Ok(())
    }

    fn sample_bounds(&self, texture: &dyn ProceduralTexture) -> BoundingVolume {
        match self.settings.mode {
            SampleMode::TexelTile => {
                let m = self.settings.mode.effective_multiplier(self.settings.sample_multiplier);
                let step = f64::from(TILE_STEP / m);
                let (mut cols, mut rows) = (0usize, 0usize);
                for face in 0..texture.num_faces() {
                    let res = texture.face_resolution(face);
                    cols += (res.u as f32 * m) as usize;
                    rows = rows.max((res.v as f32 * m) as usize);
                }
                BoundingVolume::from_corners(
                    Point3d::origin(),
                    Point3d::new(
                        cols.saturating_sub(1) as f64 * step,
                        rows.saturating_sub(1) as f64 * step,
                        0.0,
                    ),
                )
            }
            _ => self
                .mesh
                .as_ref()
                .and_then(|mesh| mesh_bounds(mesh))
                .unwrap_or_default(),
        }
    }
}

fn mesh_bounds(mesh: &TriangleMesh) -> Option<BoundingVolume> {
    let first = mesh.vertices.first()?;
    let mut min = first.cast::<f64>();
    let mut max = min;
    for v in &mesh.vertices {
        let v = v.cast::<f64>();
        min = min.inf(&v);
        max = max.sup(&v);
    }
    Some(BoundingVolume::from_corners(min, max))
}

impl PointPipeline for ProceduralSource {
    type Input = TextureInput;
    type Metadata = TextureMetadata;

    fn apply_input(&mut self, input: TextureInput) -> Result<InputEffect> {
        let effect = match input {
            TextureInput::Path(path) => {
                self.path = path;
                self.load()?;
                InputEffect::SourceChanged
            }
            TextureInput::Texture(texture) => {
                self.path = None;
                self.clear_samples();
                self.bind(texture);
                InputEffect::SourceChanged
            }
            TextureInput::Mesh(mesh) => {
                let same = match (&self.mesh, &mesh) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                };
                if same {
                    return Ok(InputEffect::Unchanged);
                }
                self.mesh = mesh;
                InputEffect::CacheInvalidated
            }
            TextureInput::Filter(filter) => {
                if self.settings.filter == filter {
                    return Ok(InputEffect::Unchanged);
                }
                self.settings.filter = filter;
                self.rebuild_filter();
                InputEffect::CacheInvalidated
            }
            TextureInput::FilterSize(size) => {
                let size = clamp_filter_size(size);
                if self.settings.filter_size == size {
                    return Ok(InputEffect::Unchanged);
                }
                self.settings.filter_size = size;
                self.rebuild_filter();
                InputEffect::CacheInvalidated
            }
            TextureInput::SampleMultiplier(m) => {
                let m = clamp_multiplier(m);
                if self.settings.sample_multiplier == m {
                    return Ok(InputEffect::Unchanged);
                }
                self.settings.sample_multiplier = m;
                InputEffect::CacheInvalidated
            }
            TextureInput::Mode(mode) => {
                if self.settings.mode == mode {
                    return Ok(InputEffect::Unchanged);
                }
                self.settings.mode = mode;
                InputEffect::CacheInvalidated
            }
            TextureInput::Storage(storage) => {
                if self.settings.storage == storage {
                    return Ok(InputEffect::Unchanged);
                }
                self.settings.storage = storage;
                InputEffect::CacheInvalidated
            }
            TextureInput::PointSize(size) => {
                self.settings.point_size = size.max(0.0);
                InputEffect::Cosmetic
            }
        };
        Ok(effect)
    }

    fn has_source(&self) -> bool {
        self.binding.is_some()
    }

    fn recompute(&mut self) -> Result<usize> {
        let Some(binding) = self.binding.as_ref() else {
            self.clear_samples();
            return Ok(0);
        };
        let texture = binding.texture.clone();
        let filter = binding.filter.clone();

        // a rejected input must leave the previous samples and storage alone
        SampleSource::validate(texture.as_ref(), self.mesh.as_deref(), self.settings.mode)?;
        let actual = self.cache.switch_to(self.settings.storage, self.device.as_ref());
        if actual != self.settings.storage {
            self.settings.storage = actual;
        }
        let n = self.sampler.sample(
            texture.as_ref(),
            filter.as_ref(),
            self.mesh.as_deref(),
            self.settings.mode,
            self.settings.sample_multiplier,
            &mut self.cache,
        )?;
        self.num_samples = n;
        self.bounds = self.sample_bounds(texture.as_ref());
        Ok(n)
    }

    fn draw(&mut self, surface: &mut dyn DrawSurface) -> Result<DrawOutcome> {
        if !self.cache.is_valid() {
            return Ok(DrawOutcome::Nothing);
        }
        self.cache.draw(surface)?;
        Ok(DrawOutcome::Cached(self.cache.size()))
    }

    fn draws_through_errors(&self) -> bool {
        true
    }

    fn point_size(&self) -> f32 {
        self.settings.point_size
    }

    fn bounding_volume(&self) -> BoundingVolume {
        self.bounds
    }

    fn metadata(&self) -> TextureMetadata {
        let Some(binding) = self.binding.as_ref() else {
            return TextureMetadata::default();
        };
        let tex = binding.texture.as_ref();
        TextureMetadata {
            num_channels: tex.num_channels(),
            num_faces: tex.num_faces(),
            alpha_channel: tex.alpha_channel(),
            has_edits: tex.has_edits(),
            has_mip_maps: tex.has_mip_maps(),
            metadata_keys: tex.metadata_keys(),
            mesh_type: Some(tex.mesh_type()),
            data_type: Some(tex.data_type()),
            u_border_mode: Some(tex.u_border_mode()),
            v_border_mode: Some(tex.v_border_mode()),
            num_samples: self.num_samples,
        }
    }

    fn release_cache(&mut self) {
        if let Err(e) = self.cache.resize(0) {
            warn!("Releasing sample cache failed: {}", e);
        }
        self.num_samples = 0;
    }

    fn on_draw_failure(&mut self) -> Option<String> {
        if self.cache.mode() != BufferMode::Device {
            return None;
        }
        self.settings.storage = BufferMode::System;
        self.cache.switch_to(BufferMode::System, None);
        self.num_samples = 0;
        info!("Device sample storage failed to draw, switching to system memory");
        Some("device storage failed to draw, using system memory".to_string())
    }
}
