//! Host memory backend

use bytemuck::Zeroable;

use super::{within_budget, BufferBackend, BufferMode, Channel, ChannelsMut};
use crate::error::{Error, Result};
use crate::point::Primitive;
use crate::surface::{ChannelData, DrawSurface, HostBatch};

/// Sample buffer in host memory
#[derive(Debug)]
pub struct SystemBuffer<V, C> {
    positions: Vec<V>,
    colors: Option<Vec<C>>,
    budget: Option<usize>,
    accessing: bool,
}

impl<V: Primitive, C: Primitive> SystemBuffer<V, C> {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            colors: None,
            budget: None,
            accessing: false,
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

    /// Positions, empty if the buffer is
    pub fn positions(&self) -> &[V] {
        &self.positions
    }

    /// Colours, if the channel is alive
    pub fn colors(&self) -> Option<&[C]> {
        self.colors.as_deref()
    }

    fn release(&mut self) {
        self.positions = Vec::new();
        self.colors = None;
    }

    fn allocate<T: Zeroable + Clone>(len: usize) -> Option<Vec<T>> {
        let mut v = Vec::new();
        v.try_reserve_exact(len).ok()?;
        v.resize(len, T::zeroed());
        Some(v)
    }
}

impl<V: Primitive, C: Primitive> Default for SystemBuffer<V, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Primitive, C: Primitive> BufferBackend<V, C> for SystemBuffer<V, C> {
    fn mode(&self) -> BufferMode {
        BufferMode::System
    }

    fn size(&self) -> usize {
        self.positions.len()
    }

    fn has_channel(&self, channel: Channel) -> bool {
        match channel {
            Channel::Position => !self.positions.is_empty(),
            Channel::Color => self.colors.is_some(),
        }
    }

    fn resize(&mut self, len: usize) -> Result<()> {
        if self.accessing {
            return Err(Error::InvalidAccess("cannot resize while access is open".into()));
        }
        if len == self.size() {
            return Ok(());
        }
        if len == 0 {
            self.release();
            return Ok(());
        }
        if !within_budget(len, self.budget) {
            self.release();
            return Err(Error::BufferAllocationFailure { requested: len });
        }

        // Free the old storage first so peak usage stays at one copy
        self.release();
        match (Self::allocate::<V>(len), Self::allocate::<C>(len)) {
            (Some(positions), Some(colors)) => {
                self.positions = positions;
                self.colors = Some(colors);
                Ok(())
            }
            _ => Err(Error::BufferAllocationFailure { requested: len }),
        }
    }

    fn truncate(&mut self, len: usize) -> Result<()> {
        if self.accessing {
            return Err(Error::InvalidAccess("cannot truncate while access is open".into()));
        }
        if len >= self.size() {
            return Ok(());
        }
        if len == 0 {
            return self.resize(0);
        }
        self.positions.truncate(len);
        if let Some(colors) = self.colors.as_mut() {
            colors.truncate(len);
        }
        Ok(())
    }

    fn begin_access(&mut self) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::InvalidAccess("buffer is empty".into()));
        }
        self.accessing = true;
        Ok(())
    }

    fn channels_mut(&mut self) -> Result<ChannelsMut<'_, V, C>> {
        if !self.accessing {
            return Err(Error::InvalidAccess("begin_access was not called".into()));
        }
        Ok(ChannelsMut {
            positions: &mut self.positions,
            colors: self.colors.as_deref_mut(),
        })
    }

    fn end_access(&mut self) -> Result<()> {
        self.accessing = false;
        Ok(())
    }

    fn delete_channel(&mut self, channel: Channel) -> bool {
        if channel != Channel::Color {
            return false;
        }
        self.colors = None;
        true
    }

    fn revive_channel(&mut self, channel: Channel) -> bool {
        if !self.is_valid() || channel != Channel::Color {
            return false;
        }
        if self.colors.is_none() {
            self.colors = Self::allocate::<C>(self.size());
        }
        self.colors.is_some()
    }

    fn draw(&self, surface: &mut dyn DrawSurface) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::DrawSubmissionFailure("buffer is empty".into()));
        }
        let batch = HostBatch {
            count: self.size(),
            positions: ChannelData {
                bytes: bytemuck::cast_slice(&self.positions),
                format: V::FORMAT,
            },
            colors: self.colors.as_ref().map(|c| ChannelData {
                bytes: bytemuck::cast_slice(c),
                format: C::FORMAT,
            }),
        };
        surface.submit_host(&batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{ColorSample, PositionSample};
    use crate::headless::{RecordingSurface, SubmissionKind};

    type Buffer = SystemBuffer<PositionSample, ColorSample>;

    fn filled(len: usize) -> Buffer {
        let mut buf = Buffer::new();
        buf.resize(len).unwrap();
        buf.begin_access().unwrap();
        {
            let ch = buf.channels_mut().unwrap();
            for (i, p) in ch.positions.iter_mut().enumerate() {
                *p = PositionSample::new(i as f32, 0.0, 0.0);
            }
        }
        buf.end_access().unwrap();
        buf
    }

    #[test]
    fn test_resize_lifecycle() {
        let mut buf = Buffer::new();
        assert!(!buf.is_valid());
        buf.resize(10).unwrap();
        assert_eq!(buf.size(), 10);
        assert!(buf.has_channel(Channel::Color));
        buf.resize(10).unwrap();
        assert_eq!(buf.size(), 10);
        buf.resize(0).unwrap();
        assert_eq!(buf.size(), 0);
        assert!(!buf.has_channel(Channel::Color));
        assert!(!buf.is_valid());
    }

    #[test]
    fn test_failed_resize_leaves_buffer_empty() {
        let mut buf = Buffer::new().with_budget(16);
        buf.resize(8).unwrap();
        let err = buf.resize(32).unwrap_err();
        assert!(matches!(err, Error::BufferAllocationFailure { requested: 32 }));
        assert_eq!(buf.size(), 0);
        assert!(!buf.is_valid());
        assert!(!buf.has_channel(Channel::Color));
    }

    #[test]
    fn test_color_channel_delete_and_revive() {
        let mut buf = Buffer::new();
        assert!(!buf.revive_channel(Channel::Color));
        buf.resize(4).unwrap();
        assert!(!buf.delete_channel(Channel::Position));
        assert!(buf.delete_channel(Channel::Color));
        assert!(buf.colors().is_none());
        assert!(buf.revive_channel(Channel::Color));
        assert_eq!(buf.colors().map(|c| c.len()), Some(4));
    }

    #[test]
    fn test_resize_revives_deleted_colors() {
        let mut buf = Buffer::new();
        buf.resize(4).unwrap();
        buf.delete_channel(Channel::Color);
        buf.resize(4).unwrap();
        assert!(buf.colors().is_none());
        buf.resize(6).unwrap();
        assert_eq!(buf.colors().map(|c| c.len()), Some(6));
    }

    #[test]
    fn test_access_is_required_for_writing() {
        let mut buf = Buffer::new();
        assert!(buf.begin_access().is_err());
        buf.resize(2).unwrap();
        assert!(buf.channels_mut().is_err());
        buf.begin_access().unwrap();
        assert!(buf.resize(3).is_err());
        buf.end_access().unwrap();
    }

    #[test]
    fn test_truncate_keeps_prefix() {
        let mut buf = filled(5);
        buf.truncate(3).unwrap();
        assert_eq!(buf.size(), 3);
        assert_eq!(buf.positions()[2], PositionSample::new(2.0, 0.0, 0.0));
        assert_eq!(buf.colors().map(|c| c.len()), Some(3));
    }

    #[test]
    fn test_draw_submits_optional_colors() {
        let mut buf = filled(3);
        let mut surface = RecordingSurface::new();
        buf.draw(&mut surface).unwrap();
        buf.delete_channel(Channel::Color);
        buf.draw(&mut surface).unwrap();

        let subs = surface.submissions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].kind, SubmissionKind::Host);
        assert_eq!(subs[0].count, 3);
        assert!(subs[0].color_format.is_some());
        assert!(subs[1].color_format.is_none());
        assert_eq!(subs[1].positions[1], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_draw_failure_is_reported() {
        let buf = filled(2);
        let mut surface = RecordingSurface::new();
        surface.fail_next_submission();
        let err = buf.draw(&mut surface).unwrap_err();
        assert!(err.is_draw_failure());
        assert!(Buffer::new().draw(&mut surface).is_err());
    }
}
