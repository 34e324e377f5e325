//! # pointvis
//!
//! Out-of-core point cloud and procedural texture visualization.
//!
//! This is the umbrella crate that re-exports every pointvis crate. Use it to
//! get everything in one place, or depend on individual crates for more
//! granular control over dependencies.
//!
//! ## Crates
//!
//! - **core**: errors, sample primitives, buffers, the draw surface contract
//!   and coordinate transforms
//! - **io**: streaming LAS reader, buffered or memory-mapped
//! - **texture**: procedural textures, filters and the sampling driver
//! - **pipeline**: render caches, both pipelines and the dirty-tracking controller
//! - **gpu**: wgpu device memory and renderer (feature `gpu`)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use pointvis::prelude::*;
//!
//! let texture = MemoryTexture::from_fn(3, &[FaceResolution::new(8, 8)], |_, u, v, c| {
//!     c.copy_from_slice(&[u as f32 / 8.0, v as f32 / 8.0, 0.5]);
//! });
//! let mesh = TriangleMesh::from_vertices_and_faces(
//!     vec![
//!         Point3f::new(0.0, 0.0, 0.0),
//!         Point3f::new(1.0, 0.0, 0.0),
//!         Point3f::new(0.0, 1.0, 0.0),
//!     ],
//!     vec![[0, 1, 2]],
//! );
//!
//! let source = ProceduralSource::new(TextureSettings::default())?
//!     .with_mesh(Arc::new(mesh))
//!     .with_texture(Arc::new(texture));
//! let mut controller = VisController::new(source);
//!
//! let mut surface = RecordingSurface::new();
//! assert_eq!(controller.draw(&mut surface), DrawOutcome::Cached(64));
//! # Ok::<(), pointvis::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: enables `io-mmap`
//! - `io-mmap`: memory-mapped reading of large point files
//! - `gpu`: the wgpu backend

// Re-export core functionality
pub use pointvis_core::*;

// Re-export sub-crates
pub use pointvis_io as io;
pub use pointvis_pipeline as pipeline;
pub use pointvis_texture as texture;

#[cfg(feature = "gpu")]
pub use pointvis_gpu as gpu;

/// Convenient imports for common use cases
pub mod prelude {
    pub use pointvis_core::*;
    pub use pointvis_io::*;
    pub use pointvis_pipeline::*;
    pub use pointvis_texture::*;

    #[cfg(feature = "gpu")]
    pub use pointvis_gpu::*;
}
