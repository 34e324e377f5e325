//! The render surface seen from the pipeline
//!
//! Everything the pipeline needs from a renderer: point size, frame
//! brackets, batched submission of host or device channels, immediate
//! point emission for uncached drawing, and an error query.

use crate::buffer::DeviceHandle;
use crate::error::Result;
use crate::point::{ColorSample, PositionSample, PrimitiveFormat};

/// Raw bytes of one host channel
#[derive(Debug, Clone, Copy)]
pub struct ChannelData<'a> {
    pub bytes: &'a [u8],
    pub format: PrimitiveFormat,
}

/// `count` samples held in host memory
#[derive(Debug, Clone, Copy)]
pub struct HostBatch<'a> {
    pub count: usize,
    pub positions: ChannelData<'a>,
    pub colors: Option<ChannelData<'a>>,
}

/// One device-resident channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceChannel {
    pub handle: DeviceHandle,
    pub format: PrimitiveFormat,
}

/// `count` samples held in device memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBatch {
    pub count: usize,
    pub positions: DeviceChannel,
    pub colors: Option<DeviceChannel>,
}

/// An opaque drawing target
pub trait DrawSurface {
    /// Size of drawn points, in pixels
    fn set_point_size(&mut self, size: f32);

    fn begin_frame(&mut self) -> Result<()>;

    fn end_frame(&mut self) -> Result<()>;

    /// Draw a batch from host memory
    fn submit_host(&mut self, batch: &HostBatch<'_>) -> Result<()>;

    /// Draw a batch from device memory
    fn submit_device(&mut self, batch: &DeviceBatch) -> Result<()>;

    /// Start emitting points one at a time
    fn begin_points(&mut self);

    fn emit_point(&mut self, position: PositionSample, color: Option<ColorSample>);

    /// Flush the points emitted since `begin_points`
    fn end_points(&mut self) -> Result<()>;

    /// Last error reported by the underlying renderer, 0 if none.
    /// Reading clears it.
    fn error_code(&mut self) -> u32;
}
