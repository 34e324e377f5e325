//! Dirty tracking between host inputs, the cache rebuild and drawing
//!
//! The controller owns one [`PointPipeline`] and is the host binding layer:
//! inputs go in through [`VisController::set_input`], the host asks for a
//! rebuild with [`VisController::evaluate`] and renders with
//! [`VisController::draw`]. Errors never escape; the latest one is kept as
//! text and cleared by the next success.

use log::{debug, info, warn};

use crate::pipeline::{DrawOutcome, InputEffect, PointPipeline};
use pointvis_core::{BoundingVolume, DrawSurface, Error};

/// Reported when a frame has nothing to draw and nothing went wrong
pub const NOTHING_TO_DISPLAY: &str = "Nothing to display";

/// Lifecycle of a pipeline's derived state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NoSource,
    SourceLoaded,
    CacheStale,
    CacheFresh,
    Error,
}

/// Host-facing wrapper driving a [`PointPipeline`]
pub struct VisController<P: PointPipeline> {
    pipeline: P,
    state: PipelineState,
    last_error: Option<String>,
    cache_dirty: bool,
    recompute_signal: u32,
    metadata: P::Metadata,
    metadata_dirty: bool,
}

impl<P> std::fmt::Debug for VisController<P>
where
    P: PointPipeline + std::fmt::Debug,
    P::Metadata: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisController")
            .field("pipeline", &self.pipeline)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .field("cache_dirty", &self.cache_dirty)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<P: PointPipeline> VisController<P> {
    pub fn new(pipeline: P) -> Self {
        let state = if pipeline.has_source() {
            PipelineState::SourceLoaded
        } else {
            PipelineState::NoSource
        };
        Self {
            pipeline,
            state,
            last_error: None,
            cache_dirty: true,
            recompute_signal: 1,
            metadata: P::Metadata::default(),
            metadata_dirty: true,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Latest error text, if the last operation failed
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// 1 while the cache still has to be rebuilt, 0 after a successful rebuild
    pub fn needs_recompute(&self) -> u32 {
        self.recompute_signal
    }

    /// True if an input changed since the last rebuild
    pub fn is_dirty(&self) -> bool {
        self.cache_dirty
    }

    pub fn bounding_volume(&self) -> BoundingVolume {
        self.pipeline.bounding_volume()
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn into_inner(self) -> P {
        self.pipeline
    }

    fn record_error(&mut self, message: String) {
        warn!("{}", message);
        self.last_error = Some(message);
    }

    fn source_state(&self, loaded: PipelineState) -> PipelineState {
        if self.pipeline.has_source() {
            loaded
        } else {
            PipelineState::NoSource
        }
    }

    /// Apply one host input. Returns `None` if it failed; the error is kept.
    pub fn set_input(&mut self, input: P::Input) -> Option<InputEffect> {
        match self.pipeline.apply_input(input) {
            Ok(effect) => {
                match effect {
                    InputEffect::SourceChanged => {
                        self.last_error = None;
                        self.metadata_dirty = true;
                        self.cache_dirty = true;
                        self.state = self.source_state(PipelineState::SourceLoaded);
                    }
                    InputEffect::CacheInvalidated => {
                        self.cache_dirty = true;
                        self.state = self.source_state(PipelineState::CacheStale);
                    }
                    InputEffect::Cosmetic | InputEffect::Unchanged => {}
                }
                Some(effect)
            }
            Err(e) => {
                self.record_error(e.to_string());
                self.metadata_dirty = true;
                self.cache_dirty = true;
                self.state = self.source_state(PipelineState::Error);
                None
            }
        }
    }

    /// Rebuild the cache if an input changed since the last attempt.
    /// Returns the needs-recompute signal.
    pub fn evaluate(&mut self) -> u32 {
        if self.cache_dirty {
            self.recompute();
        }
        self.recompute_signal
    }

    /// Rebuild the cache unconditionally
    pub fn recompute(&mut self) -> u32 {
        self.cache_dirty = false;
        self.recompute_signal = 1;

        if !self.pipeline.has_source() {
            self.pipeline.release_cache();
            self.state = PipelineState::NoSource;
            return self.recompute_signal;
        }
        match self.pipeline.recompute() {
            Ok(n) => {
                debug!("Cache rebuilt with {} samples", n);
                self.last_error = None;
                self.recompute_signal = 0;
                self.metadata_dirty = true;
                self.state = PipelineState::CacheFresh;
            }
            Err(e) => {
                self.record_error(e.to_string());
                self.state = self.source_state(PipelineState::Error);
                if !self.pipeline.has_source() {
                    self.metadata_dirty = true;
                }
            }
        }
        self.recompute_signal
    }

    /// Lightweight metadata; refreshed without touching the cache
    pub fn metadata(&mut self) -> &P::Metadata {
        if self.metadata_dirty {
            self.metadata = self.pipeline.metadata();
            self.metadata_dirty = false;
        }
        &self.metadata
    }

    /// Render one frame: rebuild if dirty, then draw the cache or the direct path
    pub fn draw(&mut self, surface: &mut dyn DrawSurface) -> DrawOutcome {
        self.evaluate();
        surface.set_point_size(self.pipeline.point_size());
        if let Err(e) = surface.begin_frame() {
            self.record_error(e.to_string());
            return DrawOutcome::Nothing;
        }

        let outcome = if self.last_error.is_some() && !self.pipeline.draws_through_errors() {
            DrawOutcome::Nothing
        } else {
            let drawn = self.pipeline.draw(surface);
            let code = surface.error_code();
            let drawn = match drawn {
                Ok(_) if code != 0 => Err(Error::DrawSubmissionFailure(format!(
                    "error code {code:#x}"
                ))),
                other => other,
            };
            match drawn {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.handle_draw_failure(e);
                    DrawOutcome::Nothing
                }
            }
        };

        if self.pipeline.draws_through_errors() {
            match outcome {
                DrawOutcome::Cached(_) => self.last_error = None,
                DrawOutcome::Nothing if self.last_error.is_none() => {
                    self.last_error = Some(NOTHING_TO_DISPLAY.to_string());
                }
                _ => {}
            }
        }

        if let Err(e) = surface.end_frame() {
            self.record_error(e.to_string());
        }
        outcome
    }

    fn handle_draw_failure(&mut self, e: Error) {
        let mut message = e.to_string();
        if e.is_draw_failure() {
            if let Some(fallback) = self.pipeline.on_draw_failure() {
                info!("Draw fallback: {}", fallback);
                message = format!("{message}; {fallback}");
                self.cache_dirty = true;
            }
        }
        self.record_error(message);
        if self.pipeline.has_source() {
            self.state = PipelineState::CacheStale;
            self.cache_dirty = true;
        } else {
            self.state = PipelineState::NoSource;
            self.metadata_dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointvis_core::{RecordingSurface, Result};

    #[derive(Debug, Default)]
    struct Stub {
        source: bool,
        fail_recompute: bool,
        fail_draw: bool,
        through_errors: bool,
        cached: usize,
        recomputes: usize,
        metadata_reads: std::cell::Cell<usize>,
        fallbacks: usize,
    }

    enum StubInput {
        Open(bool),
        Tweak,
        Size,
    }

    impl PointPipeline for Stub {
        type Input = StubInput;
        type Metadata = usize;

        fn apply_input(&mut self, input: StubInput) -> Result<InputEffect> {
            match input {
                StubInput::Open(ok) => {
                    self.source = ok;
                    self.cached = 0;
                    if ok {
                        Ok(InputEffect::SourceChanged)
                    } else {
                        Err(Error::SourceOpenFailure {
                            path: "missing.las".into(),
                            reason: "not found".into(),
                        })
                    }
                }
                StubInput::Tweak => Ok(InputEffect::CacheInvalidated),
                StubInput::Size => Ok(InputEffect::Cosmetic),
            }
        }

        fn has_source(&self) -> bool {
            self.source
        }

        fn recompute(&mut self) -> Result<usize> {
            self.recomputes += 1;
            if self.fail_recompute {
                return Err(Error::MissingMesh);
            }
            self.cached = 4;
            Ok(4)
        }

        fn draw(&mut self, _surface: &mut dyn DrawSurface) -> Result<DrawOutcome> {
            if self.fail_draw {
                return Err(Error::DrawSubmissionFailure("stub".into()));
            }
            Ok(if self.cached > 0 {
                DrawOutcome::Cached(self.cached)
            } else {
                DrawOutcome::Nothing
            })
        }

        fn draws_through_errors(&self) -> bool {
            self.through_errors
        }

        fn point_size(&self) -> f32 {
            3.0
        }

        fn bounding_volume(&self) -> BoundingVolume {
            BoundingVolume::empty()
        }

        fn metadata(&self) -> usize {
            self.metadata_reads.set(self.metadata_reads.get() + 1);
            usize::from(self.source)
        }

        fn release_cache(&mut self) {
            self.cached = 0;
        }

        fn on_draw_failure(&mut self) -> Option<String> {
            self.fallbacks += 1;
            self.fail_draw = false;
            Some("fallback".into())
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut c = VisController::new(Stub::default());
        assert_eq!(c.state(), PipelineState::NoSource);
        assert_eq!(c.evaluate(), 1);

        c.set_input(StubInput::Open(true));
        assert_eq!(c.state(), PipelineState::SourceLoaded);
        assert_eq!(c.evaluate(), 0);
        assert_eq!(c.state(), PipelineState::CacheFresh);

        c.set_input(StubInput::Tweak);
        assert_eq!(c.state(), PipelineState::CacheStale);
        assert_eq!(c.evaluate(), 0);
        assert_eq!(c.pipeline().recomputes, 2);

        // clean controllers do not rebuild again
        c.evaluate();
        assert_eq!(c.pipeline().recomputes, 2);
    }

    #[test]
    fn test_cosmetic_input_keeps_cache() {
        let mut c = VisController::new(Stub::default());
        c.set_input(StubInput::Open(true));
        c.evaluate();
        assert_eq!(c.set_input(StubInput::Size), Some(InputEffect::Cosmetic));
        assert!(!c.is_dirty());
        assert_eq!(c.state(), PipelineState::CacheFresh);
    }

    #[test]
    fn test_failed_open_records_error() {
        let mut c = VisController::new(Stub::default());
        assert!(c.set_input(StubInput::Open(false)).is_none());
        assert_eq!(c.state(), PipelineState::NoSource);
        assert!(c.last_error().is_some_and(|e| e.contains("missing.las")));

        c.set_input(StubInput::Open(true));
        assert!(c.last_error().is_none());
    }

    #[test]
    fn test_recompute_failure_sets_error_state() {
        let mut c = VisController::new(Stub {
            fail_recompute: true,
            ..Default::default()
        });
        c.set_input(StubInput::Open(true));
        assert_eq!(c.evaluate(), 1);
        assert_eq!(c.state(), PipelineState::Error);
        assert!(c.last_error().is_some());
    }

    #[test]
    fn test_metadata_refreshes_independently() {
        let mut c = VisController::new(Stub::default());
        c.set_input(StubInput::Open(true));
        assert_eq!(*c.metadata(), 1);
        assert_eq!(*c.metadata(), 1);
        assert_eq!(c.pipeline().metadata_reads.get(), 1);
        assert_eq!(c.pipeline().recomputes, 0);

        c.set_input(StubInput::Tweak);
        c.metadata();
        assert_eq!(c.pipeline().metadata_reads.get(), 1);
        assert!(c.is_dirty());
    }

    #[test]
    fn test_draw_failure_takes_fallback() {
        let mut c = VisController::new(Stub {
            fail_draw: true,
            ..Default::default()
        });
        c.set_input(StubInput::Open(true));
        let mut surface = RecordingSurface::new();

        assert_eq!(c.draw(&mut surface), DrawOutcome::Nothing);
        assert_eq!(c.pipeline().fallbacks, 1);
        assert_eq!(c.state(), PipelineState::CacheStale);
        assert!(c.last_error().is_some_and(|e| e.contains("fallback")));
        assert_eq!(surface.point_size(), 3.0);
        assert_eq!(surface.frames(), 1);

        // the next frame rebuilds, clears the error and draws
        assert_eq!(c.draw(&mut surface), DrawOutcome::Cached(4));
        assert!(c.last_error().is_none());
    }

    #[test]
    fn test_nothing_to_display() {
        let mut c = VisController::new(Stub {
            through_errors: true,
            ..Default::default()
        });
        let mut surface = RecordingSurface::new();
        assert_eq!(c.draw(&mut surface), DrawOutcome::Nothing);
        assert_eq!(c.last_error(), Some(NOTHING_TO_DISPLAY));
    }
}
