//! User-facing settings of both pipelines, loadable from JSON

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::colorize::ColorMode;
use pointvis_core::{BufferMode, Error, Result};
use pointvis_texture::{FilterOptions, FilterType, SampleMode, SamplingConfig};

/// Smallest accepted intensity scale
pub const MIN_INTENSITY_SCALE: f32 = 1.0;
/// Smallest accepted sample multiplier
pub const MIN_SAMPLE_MULTIPLIER: f32 = 0.0001;

fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    from_json(&text)
}

/// Settings of a point file pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LidarSettings {
    pub point_size: f32,
    pub intensity_scale: f32,
    pub translate_to_origin: bool,
    pub use_cache: bool,
    pub color_mode: ColorMode,
    /// Where the cache lives when enabled
    pub storage: BufferMode,
    pub use_mmap: bool,
}

impl Default for LidarSettings {
    fn default() -> Self {
        Self {
            point_size: 1.0,
            intensity_scale: 1.0,
            translate_to_origin: false,
            use_cache: false,
            color_mode: ColorMode::None,
            storage: BufferMode::System,
            use_mmap: cfg!(feature = "io-mmap"),
        }
    }
}

impl LidarSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        from_json::<Self>(text).map(Self::sanitized)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json::<Self>(path.as_ref()).map(Self::sanitized)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Clamp values into their accepted ranges
    pub fn sanitized(mut self) -> Self {
        self.intensity_scale = clamp_intensity_scale(self.intensity_scale);
        self.point_size = self.point_size.max(0.0);
        self
    }

    pub fn with_point_size(mut self, size: f32) -> Self {
        self.point_size = size.max(0.0);
        self
    }

    pub fn with_intensity_scale(mut self, scale: f32) -> Self {
        self.intensity_scale = clamp_intensity_scale(scale);
        self
    }

    pub fn with_translate_to_origin(mut self, translate: bool) -> Self {
        self.translate_to_origin = translate;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_color_mode(mut self, mode: ColorMode) -> Self {
        self.color_mode = mode;
        self
    }

    pub fn with_storage(mut self, storage: BufferMode) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }
}

pub(crate) fn clamp_intensity_scale(scale: f32) -> f32 {
    if scale.is_nan() {
        MIN_INTENSITY_SCALE
    } else {
        scale.max(MIN_INTENSITY_SCALE)
    }
}

pub(crate) fn clamp_filter_size(size: f32) -> f32 {
    if size.is_nan() {
        0.0
    } else {
        size.clamp(0.0, 1.0)
    }
}

pub(crate) fn clamp_multiplier(multiplier: f32) -> f32 {
    if multiplier.is_nan() {
        MIN_SAMPLE_MULTIPLIER
    } else {
        multiplier.max(MIN_SAMPLE_MULTIPLIER)
    }
}

/// Settings of a procedural texture pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextureSettings {
    pub point_size: f32,
    pub filter: FilterType,
    pub filter_size: f32,
    pub sample_multiplier: f32,
    pub mode: SampleMode,
    pub storage: BufferMode,
    pub sampling: SamplingConfig,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            point_size: 1.0,
            filter: FilterType::Point,
            filter_size: 0.001,
            sample_multiplier: 1.0,
            mode: SampleMode::FaceAbsolute,
            storage: BufferMode::System,
            sampling: SamplingConfig::default(),
        }
    }
}

impl TextureSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        from_json::<Self>(text).map(Self::sanitized)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json::<Self>(path.as_ref()).map(Self::sanitized)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn sanitized(mut self) -> Self {
        self.filter_size = clamp_filter_size(self.filter_size);
        self.sample_multiplier = clamp_multiplier(self.sample_multiplier);
        self.point_size = self.point_size.max(0.0);
        self
    }

    /// Options the texture filter is built with
    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions::new(self.filter, self.filter_size)
    }

    pub fn with_point_size(mut self, size: f32) -> Self {
        self.point_size = size.max(0.0);
        self
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_filter_size(mut self, size: f32) -> Self {
        self.filter_size = clamp_filter_size(size);
        self
    }

    pub fn with_sample_multiplier(mut self, multiplier: f32) -> Self {
        self.sample_multiplier = clamp_multiplier(multiplier);
        self
    }

    pub fn with_mode(mut self, mode: SampleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_storage(mut self, storage: BufferMode) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }
}
