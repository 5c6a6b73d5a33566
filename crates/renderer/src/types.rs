use std::path::PathBuf;

use framestats::DEFAULT_HISTORY_CAPACITY;

use crate::frame::FrameError;
use crate::timing::DEFAULT_MAX_POLLS;

/// Title of the preview window.
pub const WINDOW_TITLE: &str = "VAS : Visible Angle Shading";

/// Initial window size in physical pixels.
pub const DEFAULT_SURFACE_SIZE: (u32, u32) = (1200, 700);

/// Number of scenes shipped in the default shader directory.
pub const DEFAULT_SCENE_COUNT: usize = 3;

/// A named fragment shader on disk that becomes one selectable scene.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneSource {
    pub name: String,
    pub path: PathBuf,
}

impl SceneSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// How shader compile and link failures are surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifierKind {
    /// Blocking native message box (falls back to logging when the `dialogs`
    /// feature is disabled).
    #[default]
    Dialog,
    /// Log the diagnostic through `tracing` and keep going.
    Log,
}

/// Immutable configuration passed to the renderer at start-up.
///
/// `RendererConfig` mirrors CLI flags and the optional scene manifest: it
/// names the shared vertex shader, the ordered scene list, and the knobs of
/// the frame-timing loop.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Window title.
    pub title: String,
    /// Vertex shader shared by every scene program.
    pub vertex_shader: PathBuf,
    /// Fragment scenes in picker order; the first one starts active.
    pub scenes: Vec<SceneSource>,
    /// Number of FPS samples kept for the chart and statistics.
    pub history_capacity: usize,
    /// Upper bound on availability polls before a frame's timing is dropped.
    pub timer_poll_limit: u64,
    /// Compile failure reporting.
    pub notifier: NotifierKind,
}

impl RendererConfig {
    /// Builds the stock layout rooted at `shader_dir`: `vertex.glsl` plus
    /// `scenes/scene1.glsl` .. `scenes/scene3.glsl`.
    pub fn with_shader_dir(shader_dir: impl Into<PathBuf>) -> Self {
        let root = shader_dir.into();
        let scenes = (1..=DEFAULT_SCENE_COUNT)
            .map(|index| {
                SceneSource::new(
                    format!("Scene {index}"),
                    root.join("scenes").join(format!("scene{index}.glsl")),
                )
            })
            .collect();
        Self {
            surface_size: DEFAULT_SURFACE_SIZE,
            title: WINDOW_TITLE.to_string(),
            vertex_shader: root.join("vertex.glsl"),
            scenes,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            timer_poll_limit: DEFAULT_MAX_POLLS,
            notifier: NotifierKind::default(),
        }
    }
}

impl Default for RendererConfig {
    /// The stock layout under `./shader`.
    fn default() -> Self {
        Self::with_shader_dir("shader")
    }
}

/// Failures that stop the renderer. Shader problems are not among them; they
/// degrade the affected scene instead.
#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("failed to initialise window: {0}")]
    WindowInit(String),
    #[error("failed to initialise graphics context: {0}")]
    GraphicsContext(String),
    #[error("no scenes configured")]
    NoScenes,
    #[error("built-in shader failed: {0}")]
    BuiltinShader(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_names_three_scenes() {
        let config = RendererConfig::with_shader_dir("assets");
        assert_eq!(config.surface_size, (1200, 700));
        assert_eq!(config.vertex_shader, PathBuf::from("assets/vertex.glsl"));
        assert_eq!(config.scenes.len(), DEFAULT_SCENE_COUNT);
        assert_eq!(config.scenes[1].name, "Scene 2");
        assert_eq!(
            config.scenes[2].path,
            PathBuf::from("assets/scenes/scene3.glsl")
        );
        assert_eq!(config.history_capacity, 500);
    }
}
