//! Offscreen point rendering behind the [`DrawSurface`] contract

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use log::warn;
use nalgebra::Matrix4;
use pointvis_core::{
    ChannelData, ColorSample, DeviceBatch, DrawSurface, Error, HostBatch, PositionSample,
    PrimitiveFormat, Result,
};
use wgpu::util::DeviceExt;

use crate::device::GpuContext;
use crate::shaders::{COLOR_FLOAT32X3, COLOR_NONE, COLOR_UINT16X3, POINT_SHADER};

/// Format of the offscreen colour target
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Error code reported after the device rejected a draw
pub const VALIDATION_ERROR_CODE: u32 = 0x0502;

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub background_color: [f64; 4],
    pub enable_depth_test: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            background_color: [0.1, 0.1, 0.1, 1.0],
            enable_depth_test: true,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    color_format: u32,
    _padding: [u32; 3],
}

/// GPU point renderer drawing into an offscreen target
pub struct PointRenderer {
    gpu: Arc<GpuContext>,
    config: RenderConfig,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    no_colors: wgpu::Buffer,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    depth_view: Option<wgpu::TextureView>,
    view_proj: Matrix4<f32>,
    point_size: f32,
    clear_pending: bool,
    immediate: Option<(Vec<PositionSample>, Vec<ColorSample>)>,
    error_code: u32,
}

impl std::fmt::Debug for PointRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointRenderer")
            .field("config", &self.config)
            .field("point_size", &self.point_size)
            .finish()
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl PointRenderer {
    /// Create a renderer with its own offscreen target
    pub fn new(gpu: Arc<GpuContext>, config: RenderConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(Error::Config(format!(
                "render target must not be empty, got {}x{}",
                config.width, config.height
            )));
        }
        let device = &gpu.device;

        let uniform_buffer = gpu.create_buffer(
            "point uniforms",
            std::mem::size_of::<Uniforms>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let no_colors = gpu.create_buffer("no colors", 4, wgpu::BufferUsages::STORAGE);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("point bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1),
                storage_entry(2),
            ],
        });

        let (pipeline, error) = gpu.scoped(wgpu::ErrorFilter::Validation, || {
            let shader = gpu.create_shader_module("point shader", POINT_SHADER);
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("point pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("point pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::PointList,
                    ..Default::default()
                },
                depth_stencil: config.enable_depth_test.then(|| wgpu::DepthStencilState {
                    format: wgpu::TextureFormat::Depth32Float,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        });
        if let Some(e) = error {
            return Err(Error::Gpu(format!("Failed to create point pipeline: {}", e)));
        }

        let size = wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        };
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("point target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = config.enable_depth_test.then(|| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("point depth"),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Depth32Float,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });

        Ok(Self {
            gpu,
            config,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            no_colors,
            target,
            target_view,
            depth_view,
            view_proj: Matrix4::identity(),
            point_size: 1.0,
            clear_pending: true,
            immediate: None,
            error_code: 0,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Update the view and projection applied to every point
    pub fn set_view_projection(&mut self, view_proj: Matrix4<f32>) {
        self.view_proj = view_proj;
    }

    /// Requested point size. Point lists rasterize at one pixel in wgpu.
    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    pub fn target(&self) -> &wgpu::Texture {
        &self.target
    }

    /// Run one render pass over the target, clearing it first if the frame is new
    fn pass(&mut self, draw: Option<(u32, &wgpu::BindGroup)>) -> Option<wgpu::Error> {
        let clear = std::mem::take(&mut self.clear_pending);
        let [r, g, b, a] = self.config.background_color;
        let color_load = if clear {
            wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = if clear { wgpu::LoadOp::Clear(1.0) } else { wgpu::LoadOp::Load };

        let (_, error) = self.gpu.scoped(wgpu::ErrorFilter::Validation, || {
            let mut encoder = self
                .gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("point encoder"),
                });
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("point pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &self.target_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: color_load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: self.depth_view.as_ref().map(|view| {
                        wgpu::RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: Some(wgpu::Operations {
                                load: depth_load,
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        }
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                if let Some((count, bind_group)) = draw {
                    render_pass.set_pipeline(&self.pipeline);
                    render_pass.set_bind_group(0, bind_group, &[]);
                    render_pass.draw(0..count, 0..1);
                }
            }
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
        });
        error
    }

    fn draw_buffers(
        &mut self,
        count: usize,
        positions: (&wgpu::Buffer, PrimitiveFormat),
        colors: Option<(&wgpu::Buffer, PrimitiveFormat)>,
    ) -> Result<()> {
        if positions.1 != PrimitiveFormat::Float32x3 {
            return Err(Error::DrawSubmissionFailure(format!(
                "unsupported position format {:?}",
                positions.1
            )));
        }
        let count = u32::try_from(count).map_err(|_| {
            Error::DrawSubmissionFailure(format!("{count} points exceed a single draw"))
        })?;

        let color_format = match colors {
            None => COLOR_NONE,
            Some((_, PrimitiveFormat::Float32x3)) => COLOR_FLOAT32X3,
            Some((_, PrimitiveFormat::Uint16x3)) => COLOR_UINT16X3,
        };
        let uniforms = Uniforms {
            view_proj: self.view_proj.into(),
            color_format,
            _padding: [0; 3],
        };
        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("point bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: positions.0.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: colors.map_or(&self.no_colors, |c| c.0).as_entire_binding(),
                },
            ],
        });

        match self.pass(Some((count, &bind_group))) {
            Some(e) => {
                self.error_code = VALIDATION_ERROR_CODE;
                Err(Error::DrawSubmissionFailure(e.to_string()))
            }
            None => Ok(()),
        }
    }

    fn upload(&self, label: &str, channel: &ChannelData<'_>) -> wgpu::Buffer {
        self.gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: channel.bytes,
                usage: wgpu::BufferUsages::STORAGE,
            })
    }

    /// Copy the target back to the host as rows of RGBA pixels
    pub fn read_pixels(&self) -> Result<Vec<[u8; 4]>> {
        let (width, height) = (self.config.width, self.config.height);
        let row = width * 4;
        let padded_row = row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let staging = self.gpu.create_buffer(
            "target readback",
            u64::from(padded_row) * u64::from(height),
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        );
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("target readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let bytes = self.gpu.map_read(&staging, (padded_row * height) as usize)?;
        Ok(bytes
            .chunks_exact(padded_row as usize)
            .flat_map(|r| r[..row as usize].chunks_exact(4))
            .map(|p| [p[0], p[1], p[2], p[3]])
            .collect())
    }
}

impl DrawSurface for PointRenderer {
    fn set_point_size(&mut self, size: f32) {
        self.point_size = size;
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.clear_pending = true;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        // an empty frame still clears the target
        if self.clear_pending {
            if let Some(e) = self.pass(None) {
                self.error_code = VALIDATION_ERROR_CODE;
                return Err(Error::Gpu(e.to_string()));
            }
        }
        Ok(())
    }

    fn submit_host(&mut self, batch: &HostBatch<'_>) -> Result<()> {
        if batch.count == 0 {
            return Ok(());
        }
        let positions = self.upload("host positions", &batch.positions);
        let colors = batch.colors.map(|c| (self.upload("host colors", &c), c.format));
        self.draw_buffers(
            batch.count,
            (&positions, batch.positions.format),
            colors.as_ref().map(|(b, f)| (b, *f)),
        )
    }

    fn submit_device(&mut self, batch: &DeviceBatch) -> Result<()> {
        if batch.count == 0 {
            return Ok(());
        }
        let lookup = |handle| {
            self.gpu.buffer(handle).ok_or_else(|| {
                Error::DrawSubmissionFailure(format!("unknown device buffer {}", handle.0))
            })
        };
        let positions = lookup(batch.positions.handle)?;
        let colors = batch
            .colors
            .map(|c| lookup(c.handle).map(|b| (b, c.format)))
            .transpose()?;
        self.draw_buffers(
            batch.count,
            (&*positions, batch.positions.format),
            colors.as_ref().map(|(b, f)| (&**b, *f)),
        )
    }

    fn begin_points(&mut self) {
        self.immediate = Some((Vec::new(), Vec::new()));
    }

    fn emit_point(&mut self, position: PositionSample, color: Option<ColorSample>) {
        if let Some((positions, colors)) = self.immediate.as_mut() {
            positions.push(position);
            if let Some(c) = color {
                colors.push(c);
            }
        }
    }

    fn end_points(&mut self) -> Result<()> {
        let Some((positions, colors)) = self.immediate.take() else {
            return Ok(());
        };
        let colors = if colors.len() == positions.len() {
            Some(ChannelData {
                bytes: bytemuck::cast_slice(&colors),
                format: PrimitiveFormat::Uint16x3,
            })
        } else {
            if !colors.is_empty() {
                warn!("Dropping colours of {} of {} points", colors.len(), positions.len());
            }
            None
        };
        self.submit_host(&HostBatch {
            count: positions.len(),
            positions: ChannelData {
                bytes: bytemuck::cast_slice(&positions),
                format: PrimitiveFormat::Float32x3,
            },
            colors,
        })
    }

    fn error_code(&mut self) -> u32 {
        std::mem::take(&mut self.error_code)
    }
}
