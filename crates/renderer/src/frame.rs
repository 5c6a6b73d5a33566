//! Per-frame orchestration.
//!
//! [`RenderSession`] owns everything that survives between frames (the scene
//! registry, the FPS history, the shader clock and the loop state) and drives
//! a [`FrameBackend`] through a fixed sequence of steps each frame. The GPU
//! implementation lives in `gpu::state`; tests use an in-memory backend.

use std::time::{Duration, Instant};

use framestats::{fps_from_elapsed, FpsHistory};

use crate::clock::{BoxedClock, TimeSample};
use crate::scenes::{SceneError, SceneId, SceneRegistry};
use crate::timing::{ElapsedNanos, TimerToken, TimingError};

/// Background colour behind the scene quad.
pub const CLEAR_COLOR: [f64; 4] = [0.2, 0.3, 0.3, 1.0];

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Terminating,
}

/// Whether the backend obtained something to draw into this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Ready,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered {
        scene: SceneId,
        elapsed: Option<ElapsedNanos>,
    },
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("surface failure: {0}")]
    Surface(String),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Timing(#[from] TimingError),
}

/// Read-only state handed to the overlay once per frame.
#[derive(Debug, Clone, Copy)]
pub struct OverlayView<'a, P> {
    pub registry: &'a SceneRegistry<P>,
    pub history: &'a FpsHistory,
    pub last_elapsed: Option<ElapsedNanos>,
}

/// GPU-facing half of a frame. Calls arrive in the order they are declared.
pub trait FrameBackend {
    type Program;

    /// Acquires the frame target and clears it to `color`.
    fn clear(&mut self, color: [f64; 4]) -> Result<SurfaceStatus, FrameError>;

    fn begin_timer(&mut self) -> Result<TimerToken, TimingError>;

    /// Binds `program`, uploads the time uniforms and draws the quad.
    fn draw(&mut self, program: &Self::Program, time: TimeSample) -> Result<(), FrameError>;

    /// Blocks, bounded, until the draw's GPU time is known.
    fn end_timer(&mut self, token: TimerToken) -> Result<ElapsedNanos, TimingError>;

    /// Builds and records the debug UI. Returns a scene the user picked.
    fn overlay(&mut self, view: OverlayView<'_, Self::Program>) -> Option<SceneId>;

    fn present(&mut self) -> Result<(), FrameError>;
}

pub struct RenderSession<P> {
    registry: SceneRegistry<P>,
    history: FpsHistory,
    clock: BoxedClock,
    state: LoopState,
    last_elapsed: Option<ElapsedNanos>,
    frames: u64,
    stats_window_start: Instant,
    stats_window_frames: u32,
}

impl<P> RenderSession<P> {
    pub fn new(registry: SceneRegistry<P>, history: FpsHistory, clock: BoxedClock) -> Self {
        Self {
            registry,
            history,
            clock,
            state: LoopState::Running,
            last_elapsed: None,
            frames: 0,
            stats_window_start: Instant::now(),
            stats_window_frames: 0,
        }
    }

    pub fn registry(&self) -> &SceneRegistry<P> {
        &self.registry
    }

    pub fn history(&self) -> &FpsHistory {
        &self.history
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Frames that reached `present`.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn request_close(&mut self) {
        if self.state == LoopState::Running {
            tracing::info!(frames = self.frames, "render loop terminating");
        }
        self.state = LoopState::Terminating;
    }

    /// Runs one frame against `backend`. A terminating session renders
    /// nothing.
    pub fn frame<B>(&mut self, backend: &mut B) -> Result<FrameOutcome, FrameError>
    where
        B: FrameBackend<Program = P>,
    {
        if self.state == LoopState::Terminating {
            return Ok(FrameOutcome::Skipped);
        }

        if backend.clear(CLEAR_COLOR)? == SurfaceStatus::Unavailable {
            tracing::trace!("surface unavailable; frame skipped");
            return Ok(FrameOutcome::Skipped);
        }

        let scene = self.registry.active_id();
        let program = self.registry.active();
        let time = self.clock.tick();

        let token = backend.begin_timer()?;
        backend.draw(program, time)?;
        let elapsed = match backend.end_timer(token) {
            Ok(elapsed) => {
                self.history.push(fps_from_elapsed(elapsed.as_duration()));
                Some(elapsed)
            }
            Err(err @ TimingError::Unavailable { .. }) => {
                tracing::warn!(error = %err, frame = time.frame_index, "no GPU time for frame");
                None
            }
            Err(err) => return Err(err.into()),
        };
        self.last_elapsed = elapsed;

        let picked = backend.overlay(OverlayView {
            registry: &self.registry,
            history: &self.history,
            last_elapsed: self.last_elapsed,
        });
        if let Some(id) = picked {
            if id != scene {
                self.registry.select(id)?;
                tracing::info!(scene = %id, "scene selected");
            }
        }

        backend.present()?;
        self.frames += 1;
        self.log_stats();

        Ok(FrameOutcome::Rendered { scene, elapsed })
    }

    fn log_stats(&mut self) {
        self.stats_window_frames += 1;
        let window = self.stats_window_start.elapsed();
        if window < STATS_LOG_INTERVAL {
            return;
        }
        let stats = self.history.stats();
        tracing::debug!(
            frames = self.stats_window_frames,
            wall_fps = self.stats_window_frames as f32 / window.as_secs_f32(),
            gpu_fps = stats.current,
            gpu_avg = stats.average,
            gpu_ms = self.last_elapsed.map(ElapsedNanos::as_millis_f32),
            "render stats"
        );
        self.stats_window_start = Instant::now();
        self.stats_window_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::timing::tests::FakeDevice;
    use crate::timing::GpuTimer;

    #[derive(Debug, Default)]
    struct Calls {
        log: Vec<&'static str>,
        drawn: Vec<&'static str>,
        times: Vec<TimeSample>,
    }

    struct FakeBackend {
        timer: GpuTimer<FakeDevice>,
        surface_ready: bool,
        pick: Option<SceneId>,
        seen_history: Vec<usize>,
        calls: Calls,
    }

    impl FakeBackend {
        fn new(device: FakeDevice) -> Self {
            Self {
                timer: GpuTimer::new(device, 8),
                surface_ready: true,
                pick: None,
                seen_history: Vec::new(),
                calls: Calls::default(),
            }
        }
    }

    impl FrameBackend for FakeBackend {
        type Program = &'static str;

        fn clear(&mut self, color: [f64; 4]) -> Result<SurfaceStatus, FrameError> {
            assert_eq!(color, CLEAR_COLOR);
            self.calls.log.push("clear");
            Ok(if self.surface_ready {
                SurfaceStatus::Ready
            } else {
                SurfaceStatus::Unavailable
            })
        }

        fn begin_timer(&mut self) -> Result<TimerToken, TimingError> {
            self.calls.log.push("begin");
            self.timer.begin()
        }

        fn draw(&mut self, program: &&'static str, time: TimeSample) -> Result<(), FrameError> {
            self.calls.log.push("draw");
            self.calls.drawn.push(*program);
            self.calls.times.push(time);
            Ok(())
        }

        fn end_timer(&mut self, token: TimerToken) -> Result<ElapsedNanos, TimingError> {
            self.calls.log.push("end");
            self.timer.end(token)
        }

        fn overlay(&mut self, view: OverlayView<'_, &'static str>) -> Option<SceneId> {
            self.calls.log.push("overlay");
            self.seen_history.push(view.history.len());
            self.pick.take()
        }

        fn present(&mut self) -> Result<(), FrameError> {
            self.calls.log.push("present");
            Ok(())
        }
    }

    fn session() -> RenderSession<&'static str> {
        let mut registry = SceneRegistry::new("scene-1");
        registry.register("scene-2");
        registry.register("scene-3");
        RenderSession::new(
            registry,
            FpsHistory::new(500),
            Box::new(FrozenClock::at(1.5)),
        )
    }

    #[test]
    fn frame_steps_run_in_order() {
        let mut session = session();
        let mut backend = FakeBackend::new(FakeDevice::ready(0, 1_000_000));
        let outcome = session.frame(&mut backend).unwrap();
        assert_eq!(
            backend.calls.log,
            vec!["clear", "begin", "draw", "end", "overlay", "present"]
        );
        assert_eq!(
            outcome,
            FrameOutcome::Rendered {
                scene: SceneId::new(0),
                elapsed: Some(ElapsedNanos(1_000_000))
            }
        );
        let fps = session.history().latest().unwrap();
        assert!((fps - 1000.0).abs() < 1e-3);
        assert_eq!(backend.seen_history, vec![1]);
        assert_eq!(backend.calls.times, vec![TimeSample::new(1.5, 0)]);
    }

    #[test]
    fn selected_scene_stays_active_across_frames() {
        let mut session = session();
        session.registry.select(SceneId::new(1)).unwrap();
        let mut backend = FakeBackend::new(FakeDevice::ready(0, 16_000_000));
        for _ in 0..10 {
            session.frame(&mut backend).unwrap();
        }
        assert_eq!(*session.registry().active(), "scene-2");
        assert_eq!(session.history().len(), 10);
        assert_eq!(session.frames(), 10);
        assert!(backend.calls.drawn.iter().all(|name| *name == "scene-2"));
    }

    #[test]
    fn overlay_pick_applies_from_next_frame() {
        let mut session = session();
        let mut backend = FakeBackend::new(FakeDevice::ready(0, 10));
        backend.pick = Some(SceneId::new(2));
        session.frame(&mut backend).unwrap();
        session.frame(&mut backend).unwrap();
        assert_eq!(backend.calls.drawn, vec!["scene-1", "scene-3"]);
        assert_eq!(session.registry().active_id(), SceneId::new(2));
    }

    #[test]
    fn out_of_range_pick_is_an_error() {
        let mut session = session();
        let mut backend = FakeBackend::new(FakeDevice::ready(0, 10));
        backend.pick = Some(SceneId::new(7));
        let err = session.frame(&mut backend).unwrap_err();
        assert!(matches!(err, FrameError::Scene(SceneError::OutOfRange { .. })));
        assert_eq!(*session.registry().active(), "scene-1");
    }

    #[test]
    fn unavailable_timing_skips_sample_but_finishes_frame() {
        let mut session = session();
        let mut device = FakeDevice::ready(0, 10);
        device.ready_after = u64::MAX;
        let mut backend = FakeBackend::new(device);
        let outcome = session.frame(&mut backend).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Rendered {
                scene: SceneId::new(0),
                elapsed: None
            }
        );
        assert!(session.history().is_empty());
        assert_eq!(backend.calls.log.last(), Some(&"present"));
    }

    #[test]
    fn unavailable_surface_skips_frame() {
        let mut session = session();
        let mut backend = FakeBackend::new(FakeDevice::ready(0, 10));
        backend.surface_ready = false;
        assert_eq!(session.frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert_eq!(backend.calls.log, vec!["clear"]);
        assert_eq!(session.frames(), 0);
    }

    #[test]
    fn terminating_session_renders_nothing() {
        let mut session = session();
        let mut backend = FakeBackend::new(FakeDevice::ready(0, 10));
        session.request_close();
        assert_eq!(session.state(), LoopState::Terminating);
        assert_eq!(session.frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert!(backend.calls.log.is_empty());
    }

    #[test]
    fn zero_gpu_interval_is_clamped() {
        let mut session = session();
        let mut backend = FakeBackend::new(FakeDevice::ready(5, 5));
        session.frame(&mut backend).unwrap();
        assert_eq!(
            session.history().latest(),
            Some(framestats::MAX_REPORTED_FPS)
        );
    }
}
