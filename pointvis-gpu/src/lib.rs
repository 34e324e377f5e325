//! # pointvis GPU
//!
//! wgpu implementations of the two device-facing seams of pointvis:
//! [`GpuContext`] provides [`pointvis_core::DeviceMemory`] for device-resident
//! render caches and [`PointRenderer`] is a [`pointvis_core::DrawSurface`]
//! rendering point lists into an offscreen target.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pointvis_gpu::{GpuContext, PointRenderer, RenderConfig};
//!
//! fn example() -> pointvis_core::Result<()> {
//!     let gpu = Arc::new(GpuContext::new_blocking()?);
//!     let renderer = PointRenderer::new(gpu.clone(), RenderConfig::default())?;
//!     // hand `gpu` to a pipeline as its device and draw into `renderer`
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod renderer;
pub mod shaders;

pub use device::{GpuContext, SAMPLE_BUFFER_USAGE};
pub use renderer::{PointRenderer, RenderConfig, TARGET_FORMAT, VALIDATION_ERROR_CODE};
