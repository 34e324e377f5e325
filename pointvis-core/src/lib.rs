//! Core data structures and traits for pointvis
//!
//! This crate provides the types shared by every stage of the visualization
//! pipeline: sample primitives, the source-to-renderer coordinate transform,
//! storage-agnostic sample buffers and the draw surface they are submitted to.

pub mod point;
pub mod mesh;
pub mod transform;
pub mod buffer;
pub mod surface;
pub mod headless;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use transform::*;
pub use buffer::*;
pub use surface::*;
pub use headless::{HeadlessDevice, RecordingSurface, Submission, SubmissionKind};
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix4, Point3, Vector3};
