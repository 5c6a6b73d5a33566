//! Headless shader validation: the start-up compile and link steps without a
//! window or device.

use std::fmt;

use crate::compile::{
    check_interface, load_shader_source, CompileError, LinkError, ParsedShader,
    ShaderCache, ShaderStage,
};
use crate::types::{RendererConfig, SceneSource};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShaderFailure {
    #[error(transparent)]
    Compile(CompileError),
    #[error("link failed: {0}")]
    Link(LinkError),
}

#[derive(Debug, Clone)]
pub struct SceneCheck {
    pub scene: SceneSource,
    pub result: Result<(), ShaderFailure>,
}

impl fmt::Display for SceneCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.scene.path.display();
        match &self.result {
            Ok(()) => write!(f, "ok      {} ({path})", self.scene.name),
            Err(ShaderFailure::Compile(_)) => {
                write!(f, "FAILED  {} ({path}): compile error", self.scene.name)
            }
            Err(ShaderFailure::Link(err)) => {
                write!(f, "FAILED  {} ({path}): {err}", self.scene.name)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub vertex: Result<(), CompileError>,
    pub scenes: Vec<SceneCheck>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.vertex.is_ok() && self.scenes.iter().all(|scene| scene.result.is_ok())
    }

    pub fn failures(&self) -> usize {
        usize::from(self.vertex.is_err())
            + self
                .scenes
                .iter()
                .filter(|scene| scene.result.is_err())
                .count()
    }
}

/// Validates the configured vertex shader and every scene against it.
///
/// Scenes are linked against the configured vertex shader; when that fails to
/// compile they are checked on their own so each scene still gets a verdict.
/// Validation uses naga's baseline capabilities, so a scene that relies on an
/// optional GPU feature such as `double` fails here.
pub fn check_shaders(config: &RendererConfig) -> CheckReport {
    let mut cache: ShaderCache<ParsedShader> = ShaderCache::new();

    let vertex_source = load_shader_source(&config.vertex_shader);
    let vertex = cache.compile_with(&vertex_source, ShaderStage::Vertex, Ok);

    let scenes = config
        .scenes
        .iter()
        .map(|scene| {
            let source = load_shader_source(&scene.path);
            let result = cache
                .compile_with(&source, ShaderStage::Fragment, Ok)
                .map_err(ShaderFailure::Compile)
                .and_then(|fragment| match &vertex {
                    Ok(vertex) => check_interface(&vertex.interface, &fragment.interface)
                        .map_err(ShaderFailure::Link),
                    Err(_) => Ok(()),
                });
            if let Err(err) = &result {
                tracing::debug!(scene = %scene.name, error = %err, "scene check failed");
            }
            SceneCheck {
                scene: scene.clone(),
                result,
            }
        })
        .collect();

    CheckReport {
        vertex: vertex.map(|_| ()),
        scenes,
    }
}
