//! Device memory backend
//!
//! Samples are written into a host staging area while access is open and
//! uploaded to device-resident buffers when access ends.

use std::fmt;
use std::sync::Arc;

use bytemuck::Zeroable;

use super::{within_budget, BufferBackend, BufferMode, Channel, ChannelsMut};
use crate::error::{Error, Result};
use crate::point::Primitive;
use crate::surface::{DeviceBatch, DeviceChannel, DrawSurface};

/// Opaque identifier of a device-resident allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Allocator and uploader for device-resident memory
pub trait DeviceMemory: Send + Sync {
    /// Allocate `bytes` of device memory
    fn allocate(&self, label: &str, bytes: usize) -> Result<DeviceHandle>;

    /// Copy `data` to the start of an allocation
    fn upload(&self, handle: DeviceHandle, data: &[u8]) -> Result<()>;

    /// Free an allocation; unknown handles are ignored
    fn release(&self, handle: DeviceHandle);
}

struct Staging<V, C> {
    positions: Vec<V>,
    colors: Option<Vec<C>>,
}

/// Sample buffer in device memory
pub struct DeviceBuffer<V, C> {
    device: Arc<dyn DeviceMemory>,
    positions: Option<DeviceHandle>,
    colors: Option<DeviceHandle>,
    len: usize,
    budget: Option<usize>,
    staging: Option<Staging<V, C>>,
}

impl<V: Primitive, C: Primitive> DeviceBuffer<V, C> {
    pub fn new(device: Arc<dyn DeviceMemory>) -> Self {
        Self {
            device,
            positions: None,
            colors: None,
            len: 0,
            budget: None,
            staging: None,
        }
    }

    /// Limit the amount of samples this buffer may hold
    pub fn with_budget(mut self, max_len: usize) -> Self {
        self.budget = Some(max_len);
        self
    }

    pub fn set_budget(&mut self, max_len: Option<usize>) {
        self.budget = max_len;
    }

    /// The device this buffer allocates from
    pub fn device(&self) -> &Arc<dyn DeviceMemory> {
        &self.device
    }

    fn release(&mut self) {
        if let Some(h) = self.positions.take() {
            self.device.release(h);
        }
        if let Some(h) = self.colors.take() {
            self.device.release(h);
        }
        self.len = 0;
        self.staging = None;
    }

    fn allocate_channel<T>(&self, label: &str, len: usize) -> Result<DeviceHandle> {
        let bytes = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(Error::BufferAllocationFailure { requested: len })?;
        self.device
            .allocate(label, bytes)
            .map_err(|_| Error::BufferAllocationFailure { requested: len })
    }

    fn staging_vec<T: Zeroable + Clone>(len: usize) -> Result<Vec<T>> {
        let mut v = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|_| Error::BufferAllocationFailure { requested: len })?;
        v.resize(len, T::zeroed());
        Ok(v)
    }
}

impl<V: Primitive, C: Primitive> BufferBackend<V, C> for DeviceBuffer<V, C> {
    fn mode(&self) -> BufferMode {
        BufferMode::Device
    }

    fn size(&self) -> usize {
        self.len
    }

    fn has_channel(&self, channel: Channel) -> bool {
        match channel {
            Channel::Position => self.positions.is_some(),
            Channel::Color => self.colors.is_some(),
        }
    }

    fn resize(&mut self, len: usize) -> Result<()> {
        if self.staging.is_some() {
            return Err(Error::InvalidAccess("cannot resize while access is open".into()));
        }
        if len == self.len {
            return Ok(());
        }
        self.release();
        if len == 0 {
            return Ok(());
        }
        if !within_budget(len, self.budget) {
            return Err(Error::BufferAllocationFailure { requested: len });
        }

        let positions = self.allocate_channel::<V>("pointvis positions", len)?;
        let colors = match self.allocate_channel::<C>("pointvis colors", len) {
            Ok(h) => h,
            Err(e) => {
                self.device.release(positions);
                return Err(e);
            }
        };
        self.positions = Some(positions);
        self.colors = Some(colors);
        self.len = len;
        Ok(())
    }

    fn truncate(&mut self, len: usize) -> Result<()> {
        if self.staging.is_some() {
            return Err(Error::InvalidAccess("cannot truncate while access is open".into()));
        }
        if len >= self.len {
            return Ok(());
        }
        if len == 0 {
            return self.resize(0);
        }
        // The allocation stays; only the drawn range shrinks
        self.len = len;
        Ok(())
    }

    fn begin_access(&mut self) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::InvalidAccess("buffer is empty".into()));
        }
        if self.staging.is_none() {
            let positions = Self::staging_vec::<V>(self.len)?;
            let colors = match self.colors {
                Some(_) => Some(Self::staging_vec::<C>(self.len)?),
                None => None,
            };
            self.staging = Some(Staging { positions, colors });
        }
        Ok(())
    }

    fn channels_mut(&mut self) -> Result<ChannelsMut<'_, V, C>> {
        let staging = self
            .staging
            .as_mut()
            .ok_or_else(|| Error::InvalidAccess("begin_access was not called".into()))?;
        Ok(ChannelsMut {
            positions: &mut staging.positions,
            colors: staging.colors.as_deref_mut(),
        })
    }

    fn end_access(&mut self) -> Result<()> {
        let Some(staging) = self.staging.take() else {
            return Ok(());
        };
        let mut result = match self.positions {
            Some(h) => self.device.upload(h, bytemuck::cast_slice(&staging.positions)),
            None => Ok(()),
        };
        if result.is_ok() {
            if let (Some(h), Some(colors)) = (self.colors, staging.colors.as_ref()) {
                result = self.device.upload(h, bytemuck::cast_slice(colors));
            }
        }
        if let Err(e) = result {
            // Half-uploaded contents must never become drawable
            log::warn!("device upload failed, releasing buffer: {e}");
            self.release();
            return Err(e);
        }
        Ok(())
    }

    fn delete_channel(&mut self, channel: Channel) -> bool {
        if channel != Channel::Color {
            return false;
        }
        if let Some(h) = self.colors.take() {
            self.device.release(h);
        }
        if let Some(staging) = self.staging.as_mut() {
            staging.colors = None;
        }
        true
    }

    fn revive_channel(&mut self, channel: Channel) -> bool {
        if !self.is_valid() || channel != Channel::Color {
            return false;
        }
        if self.colors.is_none() {
            match self.allocate_channel::<C>("pointvis colors", self.len) {
                Ok(h) => self.colors = Some(h),
                Err(_) => return false,
            }
        }
        let missing_staging = self.staging.as_ref().is_some_and(|s| s.colors.is_none());
        if missing_staging {
            match Self::staging_vec::<C>(self.len) {
                Ok(v) => {
                    if let Some(staging) = self.staging.as_mut() {
                        staging.colors = Some(v);
                    }
                }
                Err(_) => {
                    if let Some(h) = self.colors.take() {
                        self.device.release(h);
                    }
                    return false;
                }
            }
        }
        true
    }

    fn draw(&self, surface: &mut dyn DrawSurface) -> Result<()> {
        let Some(positions) = self.positions.filter(|_| self.is_valid()) else {
            return Err(Error::DrawSubmissionFailure("buffer is empty".into()));
        };
        if self.staging.is_some() {
            return Err(Error::DrawSubmissionFailure("buffer access is still open".into()));
        }
        let batch = DeviceBatch {
            count: self.len,
            positions: DeviceChannel {
                handle: positions,
                format: V::FORMAT,
            },
            colors: self.colors.map(|handle| DeviceChannel {
                handle,
                format: C::FORMAT,
            }),
        };
        surface.submit_device(&batch)
    }
}

impl<V, C> Drop for DeviceBuffer<V, C> {
    fn drop(&mut self) {
        if let Some(h) = self.positions.take() {
            self.device.release(h);
        }
        if let Some(h) = self.colors.take() {
            self.device.release(h);
        }
    }
}

impl<V, C> fmt::Debug for DeviceBuffer<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("positions", &self.positions)
            .field("colors", &self.colors)
            .field("len", &self.len)
            .field("accessing", &self.staging.is_some())
            .finish()
    }
}
