//! The capability set shared by point file and procedural pipelines

use pointvis_core::{BoundingVolume, DrawSurface, Result};

/// What an input change means for the pipeline's derived state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEffect {
    /// A source was opened, replaced, reopened or cleared; metadata and cache are stale
    SourceChanged,
    /// The cache must be rebuilt
    CacheInvalidated,
    /// Only affects how the next frame looks
    Cosmetic,
    /// The value did not change
    Unchanged,
}

/// How a frame was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Submitted the cached samples
    Cached(usize),
    /// Read and submitted the source point by point
    Streamed(usize),
    /// There was nothing to submit
    Nothing,
}

impl DrawOutcome {
    pub fn points(self) -> usize {
        match self {
            DrawOutcome::Cached(n) | DrawOutcome::Streamed(n) => n,
            DrawOutcome::Nothing => 0,
        }
    }
}

/// A lazily loaded source feeding a dirty-tracked cache and a draw path
pub trait PointPipeline {
    /// One host attribute change
    type Input;
    /// Lightweight values derived from the source alone
    type Metadata: Clone + Default;

    /// Apply an input change.
    ///
    /// Source-changing inputs are applied synchronously, including the
    /// transform and bounding volume. On error the pipeline has no source.
    fn apply_input(&mut self, input: Self::Input) -> Result<InputEffect>;

    fn has_source(&self) -> bool;

    /// Rebuild the cache. Returns the number of cached samples.
    fn recompute(&mut self) -> Result<usize>;

    /// Draw whatever is current: the cache if valid, otherwise a direct path if any
    fn draw(&mut self, surface: &mut dyn DrawSurface) -> Result<DrawOutcome>;

    /// Whether a frame is still drawn while an error is pending
    fn draws_through_errors(&self) -> bool;

    fn point_size(&self) -> f32;

    /// Bounds in renderer space; empty without a source
    fn bounding_volume(&self) -> BoundingVolume;

    /// Read the lightweight metadata; never touches the cache
    fn metadata(&self) -> Self::Metadata;

    /// Free the cache memory
    fn release_cache(&mut self);

    /// Disable the storage preference that failed to draw.
    /// Returns a description of the fallback, if one was taken.
    fn on_draw_failure(&mut self) -> Option<String>;
}
