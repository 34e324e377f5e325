//! Procedural texture sampling
//!
//! A [`ProceduralTexture`] carries one texel grid per mesh face. A
//! [`TextureFilter`] reconstructs it at arbitrary face coordinates, and
//! [`SampleSource`] turns texture, filter and mesh into point samples
//! written into any [`pointvis_core::BufferBackend`].

pub mod filter;
pub mod loader;
pub mod parallel;
pub mod sampler;
pub mod texture;

pub use filter::{create_filter, FilterOptions, FilterType, TextureFilter};
pub use loader::{JsonTextureLoader, TextureLoader};
pub use parallel::SamplingConfig;
pub use sampler::{
    face_sample_count, raster_count, sample_offsets, uv_from_pos, SampleMode, SampleSource,
    MAX_CHANNELS,
};
pub use texture::{
    BorderMode, DataType, FaceResolution, MemoryTexture, MeshType, ProceduralTexture, TextureFace,
};
