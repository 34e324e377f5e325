//! Storage-agnostic sample buffers
//!
//! A buffer owns two channels of equal length: a mandatory position channel
//! and an optional colour channel. Backends differ only in where the data
//! lives; callers talk to them through [`BufferBackend`].

mod cached;
mod device;
mod system;

pub use cached::CachedBuffer;
pub use device::{DeviceBuffer, DeviceHandle, DeviceMemory};
pub use system::SystemBuffer;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::point::Primitive;
use crate::surface::DrawSurface;

/// The two channels of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Position,
    Color,
}

/// Where a buffer keeps its samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferMode {
    /// Host memory, drawn from client-side arrays
    #[default]
    System,
    /// Device memory, drawn from resident buffers
    Device,
}

/// Mutable view of both channels, valid between `begin_access` and `end_access`
pub struct ChannelsMut<'a, V, C> {
    pub positions: &'a mut [V],
    pub colors: Option<&'a mut [C]>,
}

/// Uniform contract for host- and device-resident sample buffers
pub trait BufferBackend<V: Primitive, C: Primitive> {
    /// Storage location of this backend
    fn mode(&self) -> BufferMode;

    /// Amount of samples stored
    fn size(&self) -> usize;

    /// True if the buffer holds at least one sample and can be drawn
    fn is_valid(&self) -> bool {
        self.size() != 0
    }

    /// True if the given channel currently owns memory
    fn has_channel(&self, channel: Channel) -> bool;

    /// Resize both channels.
    ///
    /// Zero releases all memory, the current size is a no-op, and any other
    /// size reallocates both channels (reviving a deleted colour channel).
    /// If an allocation fails the buffer is left empty.
    fn resize(&mut self, len: usize) -> Result<()>;

    /// Shrink the drawable length, keeping the leading samples
    fn truncate(&mut self, len: usize) -> Result<()>;

    /// Start writing samples
    fn begin_access(&mut self) -> Result<()>;

    /// Both channels, only while access is open
    fn channels_mut(&mut self) -> Result<ChannelsMut<'_, V, C>>;

    /// Finish writing; after this the written samples are drawable
    fn end_access(&mut self) -> Result<()>;

    /// Drop a channel so it is neither drawn nor holds memory.
    /// Only the colour channel can be deleted.
    fn delete_channel(&mut self, channel: Channel) -> bool;

    /// Re-create a deleted channel sized to the current length.
    /// Fails if the buffer is empty or the channel is not the colour channel.
    fn revive_channel(&mut self, channel: Channel) -> bool;

    /// Submit positions, and colours if present, to the surface
    fn draw(&self, surface: &mut dyn DrawSurface) -> Result<()>;
}

/// Check a requested length against an optional element budget
pub(crate) fn within_budget(len: usize, budget: Option<usize>) -> bool {
    budget.map_or(true, |max| len <= max)
}
