//! Optional `scenes.toml` describing the vertex shader and the scene list.
//!
//! ```toml
//! vertex = "vertex.glsl"
//!
//! [[scene]]
//! name = "Sphere"
//! source = "scenes/scene1.glsl"
//! ```
//!
//! Relative paths are resolved against the manifest's own directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use renderer::SceneSource;
use serde::Deserialize;

pub const MANIFEST_FILE: &str = "scenes.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct SceneManifest {
    #[serde(default = "default_vertex")]
    pub vertex: PathBuf,
    #[serde(default)]
    pub scene: Vec<SceneEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source: PathBuf,
}

fn default_vertex() -> PathBuf {
    PathBuf::from("vertex.glsl")
}

impl SceneManifest {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse scene manifest")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read scene manifest {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Lists every problem with the manifest; empty when it is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.vertex.as_os_str().is_empty() {
            issues.push("vertex shader path is empty".to_string());
        }
        if self.scene.is_empty() {
            issues.push("manifest must list at least one [[scene]]".to_string());
        }

        let mut seen = HashSet::new();
        for (index, entry) in self.scene.iter().enumerate() {
            let position = index + 1;
            let name = entry.name.trim();
            if name.is_empty() {
                issues.push(format!("scene #{position} has no name"));
            } else if !seen.insert(name) {
                issues.push(format!("scene name '{name}' is used more than once"));
            }
            if entry.source.as_os_str().is_empty() {
                issues.push(format!("scene #{position} has no source path"));
            }
        }
        issues
    }

    pub fn vertex_path(&self, base: &Path) -> PathBuf {
        base.join(&self.vertex)
    }

    pub fn scene_sources(&self, base: &Path) -> Vec<SceneSource> {
        self.scene
            .iter()
            .map(|entry| SceneSource::new(entry.name.trim(), base.join(&entry.source)))
            .collect()
    }
}

/// Directory that relative manifest paths are resolved against.
pub fn manifest_base(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
vertex = "shared/vertex.glsl"

[[scene]]
name = "Sphere"
source = "scenes/scene1.glsl"

[[scene]]
name = "Rings"
source = "scenes/scene2.glsl"
"#;

    #[test]
    fn parses_and_resolves_relative_paths() {
        let manifest = SceneManifest::from_toml_str(SAMPLE).unwrap();
        assert!(manifest.validate().is_empty());

        let base = Path::new("/data/shaders");
        assert_eq!(
            manifest.vertex_path(base),
            PathBuf::from("/data/shaders/shared/vertex.glsl")
        );
        let scenes = manifest.scene_sources(base);
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[1].name, "Rings");
        assert_eq!(scenes[1].path, PathBuf::from("/data/shaders/scenes/scene2.glsl"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let manifest = SceneManifest::from_toml_str("").unwrap();
        assert_eq!(manifest.vertex, PathBuf::from("vertex.glsl"));
        assert!(manifest.scene.is_empty());
        assert_eq!(manifest.validate().len(), 1);
    }

    #[test]
    fn reports_every_issue() {
        let manifest = SceneManifest::from_toml_str(
            r#"
[[scene]]
name = "A"
source = "a.glsl"

[[scene]]
name = "A"

[[scene]]
source = "c.glsl"
"#,
        )
        .unwrap();
        let issues = manifest.validate();
        assert_eq!(issues.len(), 3, "{issues:?}");
        assert!(issues.iter().any(|issue| issue.contains("more than once")));
        assert!(issues.iter().any(|issue| issue.contains("#2 has no source")));
        assert!(issues.iter().any(|issue| issue.contains("#3 has no name")));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(SceneManifest::from_toml_str("[[scene]\nname = ").is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, SAMPLE).unwrap();
        let manifest = SceneManifest::load(&path).unwrap();
        assert_eq!(manifest.scene.len(), 2);
        assert_eq!(manifest_base(&path), dir.path());
        assert!(SceneManifest::load(&dir.path().join("absent.toml")).is_err());
    }
}
