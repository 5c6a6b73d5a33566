//! Renderer crate for the VAS shader preview.
//!
//! Opens one window, compiles a shared vertex shader plus a list of
//! ShaderToy-style fragment scenes, and draws the selected scene over a
//! full-screen quad with an egui overlay for picking scenes and watching the
//! GPU frame rate. The flow is:
//!
//! ```text
//!   CLI / vas
//!       │ RendererConfig
//!       ▼
//!   Renderer::run ──▶ winit event loop ──▶ RenderSession::frame(GpuState)
//!                                              │
//!                       clear ─▶ begin_timer ─▶ draw ─▶ end_timer
//!                                              │
//!                            FpsHistory ◀──────┘──▶ overlay ─▶ present
//! ```
//!
//! Shader failures never stop the renderer: they are reported once through a
//! [`CompileNotifier`] and the scene falls back to a built-in error pattern.
//! [`check_shaders`] runs the same compile and link checks without a window.

pub mod check;
pub mod clock;
pub mod compile;
pub mod frame;
mod gpu;
pub mod notify;
pub mod scenes;
pub mod timing;
mod types;
mod ui;
mod window;

pub use check::{check_shaders, CheckReport, SceneCheck, ShaderFailure};
pub use compile::{CompileError, LinkError, ShaderStage};
pub use framestats::{FpsHistory, FpsStats, DEFAULT_HISTORY_CAPACITY};
pub use frame::{FrameBackend, FrameError, FrameOutcome, LoopState, OverlayView, RenderSession};
pub use notify::{CompileNotifier, LogNotifier};
pub use scenes::{SceneError, SceneId, SceneLabel, SceneRegistry};
pub use timing::{ElapsedNanos, GpuTimer, TimerToken, TimingError, DEFAULT_MAX_POLLS};
pub use types::{
    NotifierKind, RendererConfig, RendererError, SceneSource, DEFAULT_SCENE_COUNT,
    DEFAULT_SURFACE_SIZE, WINDOW_TITLE,
};

/// Entry point used by the binary.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Runs the preview window until it is closed.
    pub fn run(self) -> Result<(), RendererError> {
        if self.config.scenes.is_empty() {
            return Err(RendererError::NoScenes);
        }
        tracing::info!(
            title = %self.config.title,
            width = self.config.surface_size.0,
            height = self.config.surface_size.1,
            scenes = self.config.scenes.len(),
            "starting renderer"
        );
        window::run_window(self.config)
    }
}
