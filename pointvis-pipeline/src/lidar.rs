//! Point file pipeline: stream, transform, colourize, cache, draw

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::colorize::{ColorMode, Colorizer};
use crate::pipeline::{DrawOutcome, InputEffect, PointPipeline};
use crate::render_cache::RenderCache;
use crate::settings::{clamp_intensity_scale, LidarSettings};
use pointvis_core::{
    BoundingVolume, BufferMode, CoordinateTransform, DeviceMemory, DrawSurface, Error,
    PositionSample, Result,
};
use pointvis_io::{Header, PointRecord, PointStreamReader, ReadOptions};

/// One host attribute change of a [`FileBackedSource`]
#[derive(Debug, Clone, PartialEq)]
pub enum LidarInput {
    Path(Option<PathBuf>),
    UseCache(bool),
    TranslateToOrigin(bool),
    ColorMode(ColorMode),
    IntensityScale(f32),
    PointSize(f32),
    Storage(BufferMode),
    UseMmap(bool),
}

/// Header fields exposed to the host; all zero without a source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderMetadata {
    pub system_identifier: String,
    pub generating_software: String,
    pub creation_date: String,
    pub version: String,
    pub num_variable_records: u32,
    pub point_data_format: u8,
    pub num_point_records: u64,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub bbox_min: [f64; 3],
    pub bbox_max: [f64; 3],
}

impl From<&Header> for HeaderMetadata {
    fn from(h: &Header) -> Self {
        Self {
            system_identifier: h.system_identifier.clone(),
            generating_software: h.generating_software.clone(),
            creation_date: h.creation_date(),
            version: h.version_string(),
            num_variable_records: h.num_variable_length_records,
            point_data_format: h.point_data_format_id,
            num_point_records: h.num_point_records,
            scale: h.scale,
            offset: h.offset,
            bbox_min: h.min,
            bbox_max: h.max,
        }
    }
}

/// A point cloud file drawn either from a cache or straight from disk
#[derive(Default)]
pub struct FileBackedSource {
    settings: LidarSettings,
    path: Option<PathBuf>,
    reader: PointStreamReader,
    transform: CoordinateTransform,
    bounds: BoundingVolume,
    cache: RenderCache,
    device: Option<Arc<dyn DeviceMemory>>,
}

impl FileBackedSource {
    pub fn new(settings: LidarSettings) -> Self {
        let settings = settings.sanitized();
        let reader = PointStreamReader::with_options(read_options(&settings));
        Self {
            settings,
            reader,
            transform: CoordinateTransform::compute(None, false),
            ..Default::default()
        }
    }

    /// Device memory used when the cache is stored on the device
    pub fn with_device(mut self, device: Arc<dyn DeviceMemory>) -> Self {
        self.device = Some(device);
        self
    }

    /// Open `path` right away
    pub fn open<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.path = Some(path.as_ref().to_path_buf());
        self.open_source()?;
        Ok(self)
    }

    pub fn settings(&self) -> &LidarSettings {
        &self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> Option<&Header> {
        self.reader.header()
    }

    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    fn colorizer(&self) -> Colorizer {
        Colorizer::new(self.settings.color_mode, self.settings.intensity_scale)
    }

    fn reset_caches(&mut self) {
        self.cache.release();
        self.update_transform();
    }

    fn update_transform(&mut self) {
        let bounds = self.reader.header().map(Header::bounds);
        self.transform =
            CoordinateTransform::compute(bounds.as_ref(), self.settings.translate_to_origin);
        self.bounds = self.transform.bounding_volume(bounds.as_ref());
    }

    /// (Re)open the current path. Without a path the source is cleared.
    fn open_source(&mut self) -> Result<()> {
        self.reader.set_options(read_options(&self.settings));
        let Some(path) = self.path.clone() else {
            self.reader.close();
            self.reset_caches();
            return Ok(());
        };
        match self.reader.open(&path) {
            Ok(_) => {
                self.cache.release();
                self.update_transform();
                Ok(())
            }
            Err(e) => {
                warn!("Could not load {}: {}", path.display(), e);
                self.reset_caches();
                Err(e)
            }
        }
    }

    fn draw_streaming(&mut self, surface: &mut dyn DrawSurface) -> Result<usize> {
        let header = self
            .reader
            .header()
            .cloned()
            .ok_or_else(|| Error::InvalidAccess("no open point stream".into()))?;
        self.reader.reset_iteration().map_err(|e| {
            Error::InvalidAccess(format!("could not initialize point stream for iteration: {e}"))
        })?;
        let colorizer = self.colorizer();
        let mut record = PointRecord::default();
        let mut n = 0;

        surface.begin_points();
        let read = loop {
            match self.reader.read_next(&mut record) {
                Ok(true) => {
                    let p = self.transform.transform_point(&record.world_position(&header));
                    surface.emit_point(PositionSample::from(p), colorizer.color(&record));
                    n += 1;
                }
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        let submitted = surface.end_points();

        if let Err(e) = read {
            // a stream that fails mid-way is dropped
            warn!("Point stream failed while drawing, closing it: {}", e);
            self.reader.close();
            self.reset_caches();
            return Err(e);
        }
        submitted.map(|_| n)
    }
}

impl std::fmt::Debug for FileBackedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackedSource")
            .field("settings", &self.settings)
            .field("path", &self.path)
            .field("reader", &self.reader)
            .field("cache", &self.cache)
            .field("has_device", &self.device.is_some())
            .finish()
    }
}

fn read_options(settings: &LidarSettings) -> ReadOptions {
    ReadOptions::default().with_mmap(settings.use_mmap)
}

impl PointPipeline for FileBackedSource {
    type Input = LidarInput;
    type Metadata = HeaderMetadata;

    fn apply_input(&mut self, input: LidarInput) -> Result<InputEffect> {
        let s = &mut self.settings;
        let effect = match input {
            LidarInput::Path(path) => {
                if path == self.path && (path.is_none() || self.reader.is_open()) {
                    return Ok(InputEffect::Unchanged);
                }
                self.path = path;
                self.open_source()?;
                InputEffect::SourceChanged
            }
            LidarInput::UseMmap(use_mmap) => {
                if s.use_mmap == use_mmap {
                    return Ok(InputEffect::Unchanged);
                }
                s.use_mmap = use_mmap;
                self.open_source()?;
                InputEffect::SourceChanged
            }
            LidarInput::TranslateToOrigin(translate) => {
                if s.translate_to_origin == translate {
                    return Ok(InputEffect::Unchanged);
                }
                s.translate_to_origin = translate;
                self.update_transform();
                InputEffect::CacheInvalidated
            }
            LidarInput::UseCache(use_cache) => {
                if s.use_cache == use_cache {
                    return Ok(InputEffect::Unchanged);
                }
                s.use_cache = use_cache;
                if !use_cache {
                    self.cache.release();
                }
                InputEffect::CacheInvalidated
            }
            LidarInput::ColorMode(mode) => {
                if s.color_mode == mode {
                    return Ok(InputEffect::Unchanged);
                }
                s.color_mode = mode;
                InputEffect::CacheInvalidated
            }
            LidarInput::IntensityScale(scale) => {
                let scale = clamp_intensity_scale(scale);
                if s.intensity_scale == scale {
                    return Ok(InputEffect::Unchanged);
                }
                s.intensity_scale = scale;
                InputEffect::CacheInvalidated
            }
            LidarInput::Storage(mode) => {
                if s.storage == mode {
                    return Ok(InputEffect::Unchanged);
                }
                s.storage = mode;
                InputEffect::CacheInvalidated
            }
            LidarInput::PointSize(size) => {
                s.point_size = size.max(0.0);
                InputEffect::Cosmetic
            }
        };
        Ok(effect)
    }

    fn has_source(&self) -> bool {
        self.reader.is_open()
    }

    fn recompute(&mut self) -> Result<usize> {
        if !self.reader.is_open() || !self.settings.use_cache {
            self.cache.release();
            return Ok(0);
        }
        let actual = self
            .cache
            .switch_storage(self.settings.storage, self.device.as_ref());
        if actual != self.settings.storage {
            self.settings.storage = actual;
        }
        let colorizer = self.colorizer();
        self.cache.update(&mut self.reader, &colorizer, &self.transform)
    }

    fn draw(&mut self, surface: &mut dyn DrawSurface) -> Result<DrawOutcome> {
        if self.cache.is_valid() {
            self.cache.draw(surface)?;
            Ok(DrawOutcome::Cached(self.cache.len()))
        } else if self.reader.is_open() {
            self.draw_streaming(surface).map(DrawOutcome::Streamed)
        } else {
            Ok(DrawOutcome::Nothing)
        }
    }

    fn draws_through_errors(&self) -> bool {
        false
    }

    fn point_size(&self) -> f32 {
        self.settings.point_size
    }

    fn bounding_volume(&self) -> BoundingVolume {
        self.bounds
    }

    fn metadata(&self) -> HeaderMetadata {
        self.reader
            .header()
            .map(HeaderMetadata::from)
            .unwrap_or_default()
    }

    fn release_cache(&mut self) {
        self.cache.release();
    }

    fn on_draw_failure(&mut self) -> Option<String> {
        if !self.settings.use_cache {
            return None;
        }
        self.settings.use_cache = false;
        self.cache.release();
        info!("Display cache disabled after a failed draw, streaming from file");
        Some("display cache not supported, drawing directly from the file".to_string())
    }
}
