//! The single active render cache: one backend at a time

use std::sync::Arc;

use super::{BufferBackend, BufferMode, Channel, ChannelsMut, DeviceBuffer, DeviceMemory, SystemBuffer};
use crate::error::Result;
use crate::point::Primitive;
use crate::surface::DrawSurface;

/// A render cache that is either host- or device-backed, never both
#[derive(Debug)]
pub enum CachedBuffer<V: Primitive, C: Primitive> {
    System(SystemBuffer<V, C>),
    Device(DeviceBuffer<V, C>),
}

impl<V: Primitive, C: Primitive> CachedBuffer<V, C> {
    /// An empty host-backed cache
    pub fn system() -> Self {
        CachedBuffer::System(SystemBuffer::new())
    }

    /// An empty device-backed cache
    pub fn device(device: Arc<dyn DeviceMemory>) -> Self {
        CachedBuffer::Device(DeviceBuffer::new(device))
    }

    /// Switch storage location.
    ///
    /// The current backend is zeroed before the new one exists, so the same
    /// samples are never held twice. Without a device, `Device` falls back to
    /// host memory. Returns the mode actually in use.
    pub fn switch_to(
        &mut self,
        mode: BufferMode,
        device: Option<&Arc<dyn DeviceMemory>>,
    ) -> BufferMode {
        if self.mode() == mode {
            return mode;
        }
        // Zero-sizing never fails
        let _ = self.resize(0);
        *self = match (mode, device) {
            (BufferMode::Device, Some(device)) => Self::device(device.clone()),
            (BufferMode::Device, None) => {
                log::warn!("device storage requested without a device, using system memory");
                Self::system()
            }
            (BufferMode::System, _) => Self::system(),
        };
        self.mode()
    }

    fn backend(&self) -> &dyn BufferBackend<V, C> {
        match self {
            CachedBuffer::System(b) => b,
            CachedBuffer::Device(b) => b,
        }
    }

    fn backend_mut(&mut self) -> &mut dyn BufferBackend<V, C> {
        match self {
            CachedBuffer::System(b) => b,
            CachedBuffer::Device(b) => b,
        }
    }
}

impl<V: Primitive, C: Primitive> Default for CachedBuffer<V, C> {
    fn default() -> Self {
        Self::system()
    }
}

impl<V: Primitive, C: Primitive> BufferBackend<V, C> for CachedBuffer<V, C> {
    fn mode(&self) -> BufferMode {
        self.backend().mode()
    }

    fn size(&self) -> usize {
        self.backend().size()
    }

    fn has_channel(&self, channel: Channel) -> bool {
        self.backend().has_channel(channel)
    }

    fn resize(&mut self, len: usize) -> Result<()> {
        self.backend_mut().resize(len)
    }

    fn truncate(&mut self, len: usize) -> Result<()> {
        self.backend_mut().truncate(len)
    }

    fn begin_access(&mut self) -> Result<()> {
        self.backend_mut().begin_access()
    }

    fn channels_mut(&mut self) -> Result<ChannelsMut<'_, V, C>> {
        match self {
            CachedBuffer::System(b) => b.channels_mut(),
            CachedBuffer::Device(b) => b.channels_mut(),
        }
    }

    fn end_access(&mut self) -> Result<()> {
        self.backend_mut().end_access()
    }

    fn delete_channel(&mut self, channel: Channel) -> bool {
        self.backend_mut().delete_channel(channel)
    }

    fn revive_channel(&mut self, channel: Channel) -> bool {
        self.backend_mut().revive_channel(channel)
    }

    fn draw(&self, surface: &mut dyn DrawSurface) -> Result<()> {
        self.backend().draw(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use crate::point::{FloatColorSample, PositionSample};

    type Cache = CachedBuffer<PositionSample, FloatColorSample>;

    #[test]
    fn test_switch_releases_previous_backend() {
        let headless = Arc::new(HeadlessDevice::new());
        let device: Arc<dyn DeviceMemory> = headless.clone();
        let mut cache = Cache::system();
        cache.resize(16).unwrap();

        assert_eq!(cache.switch_to(BufferMode::Device, Some(&device)), BufferMode::Device);
        assert_eq!(cache.size(), 0);
        cache.resize(16).unwrap();
        assert_eq!(headless.live_allocations(), 2);

        assert_eq!(cache.switch_to(BufferMode::System, Some(&device)), BufferMode::System);
        assert_eq!(headless.live_allocations(), 0);
        assert!(!cache.is_valid());
    }

    #[test]
    fn test_device_without_device_falls_back() {
        let mut cache = Cache::system();
        cache.resize(4).unwrap();
        assert_eq!(cache.switch_to(BufferMode::System, None), BufferMode::System);
        assert_eq!(cache.size(), 4);
        let mut cache = Cache::device(Arc::new(HeadlessDevice::new()));
        assert_eq!(cache.switch_to(BufferMode::Device, None), BufferMode::Device);
        let mut other = Cache::system();
        assert_eq!(other.switch_to(BufferMode::Device, None), BufferMode::System);
        cache.resize(1).unwrap();
        assert!(cache.is_valid());
    }
}
