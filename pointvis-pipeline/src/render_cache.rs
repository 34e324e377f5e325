//! Cached positions and colours of a streamed point source

use std::sync::Arc;

use log::{debug, info, warn};

use crate::colorize::Colorizer;
use pointvis_core::{
    BufferBackend, BufferMode, CachedBuffer, Channel, ColorSample, CoordinateTransform,
    DeviceMemory, DrawSurface, Error, PositionSample, Result,
};
use pointvis_io::{Header, PointRecord, PointStreamReader};

/// Buffer type holding point cloud samples
pub type PointBuffer = CachedBuffer<PositionSample, ColorSample>;

/// Transformed, colourized samples of one point file
#[derive(Debug, Default)]
pub struct RenderCache {
    buffer: PointBuffer,
}

fn fill(
    buffer: &mut PointBuffer,
    reader: &mut PointStreamReader,
    header: &Header,
    colorizer: &Colorizer,
    transform: &CoordinateTransform,
) -> Result<usize> {
    let channels = buffer.channels_mut()?;
    let positions = channels.positions;
    let mut colors = channels.colors;
    let mut record = PointRecord::default();
    let mut n = 0;
    while n < positions.len() && reader.read_next(&mut record)? {
        let world = record.world_position(header);
        positions[n] = PositionSample::from(transform.transform_point(&world));
        if let (Some(colors), Some(color)) = (colors.as_deref_mut(), colorizer.color(&record)) {
            colors[n] = color;
        }
        n += 1;
    }
    Ok(n)
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(buffer: PointBuffer) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> &PointBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut PointBuffer {
        &mut self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_valid(&self) -> bool {
        self.buffer.is_valid()
    }

    pub fn has_colors(&self) -> bool {
        self.buffer.has_channel(Channel::Color)
    }

    /// Free all sample memory
    pub fn release(&mut self) {
        if let Err(e) = self.buffer.resize(0) {
            warn!("Releasing render cache failed: {}", e);
        }
    }

    /// Move to another storage location, dropping the current samples
    pub fn switch_storage(
        &mut self,
        mode: BufferMode,
        device: Option<&Arc<dyn DeviceMemory>>,
    ) -> BufferMode {
        self.buffer.switch_to(mode, device)
    }

    /// Re-read every point of `reader` into the cache.
    ///
    /// The cache is sized from the header's point count; a file that ends
    /// early leaves a shorter cache. Any error leaves the cache empty.
    pub fn update(
        &mut self,
        reader: &mut PointStreamReader,
        colorizer: &Colorizer,
        transform: &CoordinateTransform,
    ) -> Result<usize> {
        let header = reader
            .header()
            .cloned()
            .ok_or_else(|| Error::InvalidAccess("no open point stream".into()))?;
        let declared = usize::try_from(header.num_point_records).map_err(|_| {
            Error::BufferAllocationFailure {
                requested: usize::MAX,
            }
        })?;
        reader.reset_iteration()?;

        self.buffer.resize(declared)?;
        if colorizer.mode.has_color() {
            if !self.buffer.has_channel(Channel::Color)
                && !self.buffer.revive_channel(Channel::Color)
            {
                self.release();
                return Err(Error::BufferAllocationFailure {
                    requested: declared,
                });
            }
        } else {
            self.buffer.delete_channel(Channel::Color);
        }
        if declared == 0 {
            return Ok(0);
        }

        self.buffer.begin_access()?;
        let filled = fill(&mut self.buffer, reader, &header, colorizer, transform);
        let finished = self.buffer.end_access();
        let n = match (filled, finished) {
            (Ok(n), Ok(())) => n,
            (Err(e), _) | (Ok(_), Err(e)) => {
                self.release();
                return Err(e);
            }
        };

        if n < declared {
            debug!("Point stream ended after {} of {} declared points", n, declared);
            self.buffer.truncate(n)?;
        }
        info!(
            "Cached {} points ({:?} storage, {:?} colour)",
            n,
            self.buffer.mode(),
            colorizer.mode
        );
        Ok(n)
    }

    /// Submit the cached samples
    pub fn draw(&self, surface: &mut dyn DrawSurface) -> Result<()> {
        self.buffer.draw(surface)
    }
}
