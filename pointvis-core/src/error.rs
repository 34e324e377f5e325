//! Error types for pointvis

use thiserror::Error;

/// Main error type for pointvis operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not open {path} for reading: {reason}")]
    SourceOpenFailure { path: String, reason: String },

    #[error("Unsupported file format: {0}")]
    SourceFormatUnsupported(String),

    #[error(
        "Face count of texture does not match polygon count of connected mesh: \
         {mesh_faces} != {texture_faces} (mesh.tricount != tex.tricount)"
    )]
    GeometryMismatch { mesh_faces: usize, texture_faces: usize },

    #[error("No mesh connected to sample on")]
    MissingMesh,

    #[error("Can only handle up to 4 channels, got {0}")]
    UnsupportedChannelCount(usize),

    #[error("Unsupported mesh topology: {0}")]
    UnsupportedMeshTopology(String),

    #[error("Failed to allocate buffer for {requested} samples")]
    BufferAllocationFailure { requested: usize },

    #[error("Draw submission failed: {0}")]
    DrawSubmissionFailure(String),

    #[error("Invalid buffer access: {0}")]
    InvalidAccess(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for pointvis operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures reported by the draw surface
    pub fn is_draw_failure(&self) -> bool {
        matches!(self, Error::DrawSubmissionFailure(_))
    }
}
