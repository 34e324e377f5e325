//! Point cloud and procedural texture visualization pipelines
//!
//! Two sources share the [`PointPipeline`] capability set:
//! - [`FileBackedSource`] streams a LAS file, transforms and colourizes its
//!   points and either caches them or draws them straight from disk
//! - [`ProceduralSource`] samples a procedural texture over a triangle mesh
//!
//! [`VisController`] sits between the host and a pipeline. It tracks which
//! inputs invalidate the cache, rebuilds on demand and turns every error
//! into the latest error text.

pub mod colorize;
pub mod controller;
pub mod lidar;
pub mod pipeline;
pub mod procedural;
pub mod render_cache;
pub mod settings;

pub use colorize::{ColorMode, Colorizer, SCALE_3_TO_16};
pub use controller::{PipelineState, VisController, NOTHING_TO_DISPLAY};
pub use lidar::{FileBackedSource, HeaderMetadata, LidarInput};
pub use pipeline::{DrawOutcome, InputEffect, PointPipeline};
pub use procedural::{ProceduralSource, SampleBuffer, TextureInput, TextureMetadata};
pub use render_cache::{PointBuffer, RenderCache};
pub use settings::{LidarSettings, TextureSettings};

/// Controller over a point file
pub type LidarController = VisController<FileBackedSource>;

/// Controller over a procedural texture
pub type TextureController = VisController<ProceduralSource>;
