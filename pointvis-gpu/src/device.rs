//! GPU device management and device-resident sample memory

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};
use pointvis_core::{DeviceHandle, DeviceMemory, Error, Result};

/// Usage of every sample buffer: drawable as vertices or pulled from storage
pub const SAMPLE_BUFFER_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::VERTEX
    .union(wgpu::BufferUsages::STORAGE)
    .union(wgpu::BufferUsages::COPY_DST)
    .union(wgpu::BufferUsages::COPY_SRC);

/// Round up to the 4-byte granularity of buffer copies
pub(crate) fn padded_len(bytes: usize) -> usize {
    bytes.max(4).next_multiple_of(4)
}

/// GPU context owning the device, its queue and all sample allocations
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
    buffers: Mutex<HashMap<u64, Arc<wgpu::Buffer>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter.get_info().name)
            .field("live_allocations", &self.live_allocations())
            .finish()
    }
}

impl GpuContext {
    /// Create a new GPU context
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::Gpu("Failed to find suitable adapter".to_string()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("pointvis device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| Error::Gpu(format!("Failed to create device: {}", e)))?;

        info!("Using GPU adapter {}", adapter.get_info().name);
        Ok(Self {
            device,
            queue,
            adapter,
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Create a context, blocking the calling thread
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    /// Create an empty buffer
    pub fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Create a shader module from WGSL source
    pub fn create_shader_module(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    }

    fn allocations(&self) -> Result<MutexGuard<'_, HashMap<u64, Arc<wgpu::Buffer>>>> {
        self.buffers
            .lock()
            .map_err(|_| Error::Gpu("device state poisoned".into()))
    }

    /// The wgpu buffer behind a handle
    pub fn buffer(&self, handle: DeviceHandle) -> Option<Arc<wgpu::Buffer>> {
        self.allocations().ok()?.get(&handle.0).cloned()
    }

    pub fn live_allocations(&self) -> usize {
        self.allocations().map(|b| b.len()).unwrap_or(0)
    }

    /// Run `f` inside an error scope and report what the device rejected
    pub(crate) fn scoped<T>(&self, filter: wgpu::ErrorFilter, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(filter);
        let value = f();
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error)
    }

    /// Copy the first `len` bytes of a buffer back to the host
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, len: usize) -> Result<Vec<u8>> {
        let size = padded_len(len) as u64;
        if size > buffer.size() {
            return Err(Error::Gpu(format!(
                "cannot read {} bytes from a {} byte buffer",
                len,
                buffer.size()
            )));
        }
        let staging = self.create_buffer(
            "readback",
            size,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        );
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));
        self.map_read(&staging, len)
    }

    pub(crate) fn map_read(&self, staging: &wgpu::Buffer, len: usize) -> Result<Vec<u8>> {
        let slice = staging.slice(..);
        let (sender, receiver) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = sender.send(v);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match receiver.recv() {
            Ok(Ok(())) => {
                let data = slice.get_mapped_range();
                let bytes = data[..len.min(data.len())].to_vec();
                drop(data);
                staging.unmap();
                Ok(bytes)
            }
            Ok(Err(e)) => Err(Error::Gpu(format!("Failed to map buffer: {}", e))),
            Err(_) => Err(Error::Gpu("Failed to read GPU results".to_string())),
        }
    }
}

impl DeviceMemory for GpuContext {
    fn allocate(&self, label: &str, bytes: usize) -> Result<DeviceHandle> {
        let size = padded_len(bytes) as u64;
        let (buffer, error) = self.scoped(wgpu::ErrorFilter::OutOfMemory, || {
            self.create_buffer(label, size, SAMPLE_BUFFER_USAGE)
        });
        if let Some(e) = error {
            return Err(Error::Gpu(format!("allocating {} bytes failed: {}", bytes, e)));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.allocations()?.insert(id, Arc::new(buffer));
        debug!("Allocated device buffer {} ({}, {} bytes)", id, label, size);
        Ok(DeviceHandle(id))
    }

    fn upload(&self, handle: DeviceHandle, data: &[u8]) -> Result<()> {
        let buffer = self
            .buffer(handle)
            .ok_or_else(|| Error::Gpu(format!("unknown device buffer {}", handle.0)))?;
        if data.len() as u64 > buffer.size() {
            return Err(Error::Gpu("upload exceeds allocation".into()));
        }
        if data.len() % 4 == 0 {
            self.queue.write_buffer(&buffer, 0, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(padded_len(data.len()), 0);
            self.queue.write_buffer(&buffer, 0, &padded);
        }
        Ok(())
    }

    fn release(&self, handle: DeviceHandle) {
        if let Ok(mut buffers) = self.buffers.lock() {
            if let Some(buffer) = buffers.remove(&handle.0) {
                buffer.destroy();
            }
        }
    }
}
