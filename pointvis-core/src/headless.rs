//! Headless implementations of the render surface and device memory
//!
//! Useful for hosts that only want to inspect what would be drawn, and for
//! exercising every backend path without a GPU.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::buffer::{DeviceHandle, DeviceMemory};
use crate::error::{Error, Result};
use crate::point::{ColorSample, PositionSample, PrimitiveFormat};
use crate::surface::{DeviceBatch, DrawSurface, HostBatch};

/// How a recorded submission reached the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Host,
    Device,
    Immediate,
}

/// One draw call as seen by [`RecordingSurface`]
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub kind: SubmissionKind,
    pub count: usize,
    pub point_size: f32,
    pub position_format: PrimitiveFormat,
    pub color_format: Option<PrimitiveFormat>,
    /// Decoded positions; empty for device submissions
    pub positions: Vec<[f32; 3]>,
    /// Decoded 16-bit colours of immediate submissions
    pub colors: Vec<[u16; 3]>,
}

/// A surface that records instead of rendering
#[derive(Debug, Default)]
pub struct RecordingSurface {
    point_size: f32,
    frames: usize,
    submissions: Vec<Submission>,
    pending: Option<(Vec<[f32; 3]>, Vec<[u16; 3]>)>,
    fail_host: bool,
    fail_device: bool,
    fail_once: bool,
    error_code: u32,
}

/// Error code reported after an injected failure
pub const RECORDING_FAILURE_CODE: u32 = 0x0502;

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            point_size: 1.0,
            ..Default::default()
        }
    }

    /// Make every host submission fail
    pub fn fail_host_submissions(&mut self, fail: bool) {
        self.fail_host = fail;
    }

    /// Make every device submission fail
    pub fn fail_device_submissions(&mut self, fail: bool) {
        self.fail_device = fail;
    }

    /// Make only the next submission fail
    pub fn fail_next_submission(&mut self) {
        self.fail_once = true;
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn clear(&mut self) {
        self.submissions.clear();
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    /// Total points drawn over all submissions
    pub fn points_drawn(&self) -> usize {
        self.submissions.iter().map(|s| s.count).sum()
    }

    fn check_failure(&mut self, kind: SubmissionKind) -> Result<()> {
        let fail = std::mem::take(&mut self.fail_once)
            || (kind == SubmissionKind::Host && self.fail_host)
            || (kind == SubmissionKind::Device && self.fail_device);
        if fail {
            self.error_code = RECORDING_FAILURE_CODE;
            return Err(Error::DrawSubmissionFailure(format!(
                "error code {RECORDING_FAILURE_CODE:#x}"
            )));
        }
        Ok(())
    }
}

fn decode_positions(bytes: &[u8], format: PrimitiveFormat, count: usize) -> Vec<[f32; 3]> {
    match format {
        PrimitiveFormat::Float32x3 => bytes
            .chunks_exact(12)
            .take(count)
            .map(bytemuck::pod_read_unaligned::<[f32; 3]>)
            .collect(),
        PrimitiveFormat::Uint16x3 => bytes
            .chunks_exact(6)
            .take(count)
            .map(|c| {
                let v = bytemuck::pod_read_unaligned::<[u16; 3]>(c);
                [v[0] as f32, v[1] as f32, v[2] as f32]
            })
            .collect(),
    }
}

impl DrawSurface for RecordingSurface {
    fn set_point_size(&mut self, size: f32) {
        self.point_size = size;
    }

    fn begin_frame(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn submit_host(&mut self, batch: &HostBatch<'_>) -> Result<()> {
        self.check_failure(SubmissionKind::Host)?;
        self.submissions.push(Submission {
            kind: SubmissionKind::Host,
            count: batch.count,
            point_size: self.point_size,
            position_format: batch.positions.format,
            color_format: batch.colors.map(|c| c.format),
            positions: decode_positions(batch.positions.bytes, batch.positions.format, batch.count),
            colors: Vec::new(),
        });
        Ok(())
    }

    fn submit_device(&mut self, batch: &DeviceBatch) -> Result<()> {
        self.check_failure(SubmissionKind::Device)?;
        self.submissions.push(Submission {
            kind: SubmissionKind::Device,
            count: batch.count,
            point_size: self.point_size,
            position_format: batch.positions.format,
            color_format: batch.colors.map(|c| c.format),
            positions: Vec::new(),
            colors: Vec::new(),
        });
        Ok(())
    }

    fn begin_points(&mut self) {
        self.pending = Some((Vec::new(), Vec::new()));
    }

    fn emit_point(&mut self, position: PositionSample, color: Option<ColorSample>) {
        if let Some((positions, colors)) = self.pending.as_mut() {
            positions.push(position.xyz);
            if let Some(c) = color {
                colors.push(c.rgb);
            }
        }
    }

    fn end_points(&mut self) -> Result<()> {
        let (positions, colors) = self.pending.take().unwrap_or_default();
        self.check_failure(SubmissionKind::Immediate)?;
        self.submissions.push(Submission {
            kind: SubmissionKind::Immediate,
            count: positions.len(),
            point_size: self.point_size,
            position_format: PrimitiveFormat::Float32x3,
            color_format: (!colors.is_empty()).then_some(PrimitiveFormat::Uint16x3),
            positions,
            colors,
        });
        Ok(())
    }

    fn error_code(&mut self) -> u32 {
        std::mem::take(&mut self.error_code)
    }
}

/// Device memory simulated in host memory
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    next_id: AtomicU64,
    byte_limit: Option<usize>,
    fail_uploads: AtomicBool,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse allocations once this many bytes are live
    pub fn with_byte_limit(mut self, limit: usize) -> Self {
        self.byte_limit = Some(limit);
        self
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn live_allocations(&self) -> usize {
        self.buffers.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn allocated_bytes(&self) -> usize {
        self.buffers
            .lock()
            .map(|b| b.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Copy of an allocation's bytes
    pub fn contents(&self, handle: DeviceHandle) -> Option<Vec<u8>> {
        self.buffers.lock().ok()?.get(&handle.0).cloned()
    }
}

impl DeviceMemory for HeadlessDevice {
    fn allocate(&self, _label: &str, bytes: usize) -> Result<DeviceHandle> {
        let mut buffers = self
            .buffers
            .lock()
            .map_err(|_| Error::Gpu("device state poisoned".into()))?;
        let live: usize = buffers.values().map(Vec::len).sum();
        if self.byte_limit.is_some_and(|limit| live + bytes > limit) {
            return Err(Error::Gpu(format!("out of device memory allocating {bytes} bytes")));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        buffers.insert(id, vec![0; bytes]);
        Ok(DeviceHandle(id))
    }

    fn upload(&self, handle: DeviceHandle, data: &[u8]) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(Error::Gpu("upload rejected".into()));
        }
        let mut buffers = self
            .buffers
            .lock()
            .map_err(|_| Error::Gpu("device state poisoned".into()))?;
        let target = buffers
            .get_mut(&handle.0)
            .ok_or_else(|| Error::Gpu(format!("unknown device buffer {}", handle.0)))?;
        if data.len() > target.len() {
            return Err(Error::Gpu("upload exceeds allocation".into()));
        }
        target[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn release(&self, handle: DeviceHandle) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.remove(&handle.0);
        }
    }
}
